use serde::Serialize;

use crate::schema::TrainingObjective;

/// A hub dataset recommended as a starting point for an objective.
#[derive(Clone, Debug, Serialize)]
pub struct PopularDataset {
    pub name: &'static str,
    pub description: &'static str,
    pub objective: TrainingObjective,
    pub samples: u64,
    /// False for datasets too large to import comfortably.
    pub recommended: bool,
}

const POPULAR: &[PopularDataset] = &[
    PopularDataset {
        name: "HuggingFaceH4/ultrafeedback_binarized",
        description: "Binary preference data for DPO",
        objective: TrainingObjective::Preference,
        samples: 61_135,
        recommended: true,
    },
    PopularDataset {
        name: "Anthropic/hh-rlhf",
        description: "Helpful and harmless preferences",
        objective: TrainingObjective::Preference,
        samples: 160_000,
        recommended: true,
    },
    PopularDataset {
        name: "HuggingFaceH4/no_robots",
        description: "High-quality human-written conversations",
        objective: TrainingObjective::Supervised,
        samples: 9_500,
        recommended: true,
    },
    PopularDataset {
        name: "tatsu-lab/alpaca",
        description: "Instruction-following demonstrations",
        objective: TrainingObjective::Supervised,
        samples: 52_000,
        recommended: true,
    },
    PopularDataset {
        name: "bigcode/the-stack",
        description: "Source code in 30+ languages",
        objective: TrainingObjective::Custom,
        samples: 1_000_000,
        recommended: false,
    },
    PopularDataset {
        name: "openai/gsm8k",
        description: "Grade school math word problems",
        objective: TrainingObjective::Qa,
        samples: 8_792,
        recommended: true,
    },
];

pub fn popular_datasets(objective: Option<TrainingObjective>) -> Vec<PopularDataset> {
    POPULAR
        .iter()
        .filter(|d| objective.map_or(true, |o| d.objective == o))
        .cloned()
        .collect()
}
