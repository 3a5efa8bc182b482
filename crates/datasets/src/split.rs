//! Train/validation/test split assembly.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatasetError, Result};
use crate::mapping::check_mapping;
use crate::schema::{ContentDigest, Dataset, DatasetOrigin, FieldMapping, TrainingObjective};
use crate::validate::ValidationResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPercentages {
    pub train: u32,
    pub validation: u32,
    pub test: u32,
}

impl SplitPercentages {
    pub fn new(train: u32, validation: u32, test: u32) -> Result<Self> {
        let pct = Self {
            train,
            validation,
            test,
        };
        pct.check()?;
        Ok(pct)
    }

    pub fn check(&self) -> Result<()> {
        // u64 so user-supplied values near u32::MAX cannot wrap to 100
        let sum = u64::from(self.train) + u64::from(self.validation) + u64::from(self.test);
        if sum != 100 {
            return Err(DatasetError::Configuration(format!(
                "split percentages must sum to 100 (train {} + validation {} + test {} = {sum})",
                self.train, self.validation, self.test
            )));
        }
        Ok(())
    }
}

impl Default for SplitPercentages {
    fn default() -> Self {
        Self {
            train: 80,
            validation: 15,
            test: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: u64,
    pub validation: u64,
    pub test: u64,
}

impl SplitCounts {
    pub fn total(&self) -> u64 {
        self.train + self.validation + self.test
    }
}

/// Largest-remainder allocation: the three counts always sum to `total`.
/// Leftover rows go to the largest fractional parts, train first on ties.
pub fn allocate(total: u64, pct: SplitPercentages) -> Result<SplitCounts> {
    pct.check()?;

    let shares = [pct.train, pct.validation, pct.test];
    let mut counts = [0u64; 3];
    let mut remainders = [0u64; 3];
    for (i, &p) in shares.iter().enumerate() {
        let exact = u128::from(total) * u128::from(p);
        counts[i] = (exact / 100) as u64;
        remainders[i] = (exact % 100) as u64;
    }

    let assigned: u64 = counts.iter().sum();
    let mut leftover = total.checked_sub(assigned).ok_or_else(|| {
        DatasetError::Configuration(format!("split of {total} rows assigned {assigned}"))
    })?;
    let mut order = [0usize, 1, 2];
    // stable sort keeps train < validation < test on equal remainders
    order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));
    for &i in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        counts[i] += 1;
        leftover -= 1;
    }

    Ok(SplitCounts {
        train: counts[0],
        validation: counts[1],
        test: counts[2],
    })
}

/// Everything about a new dataset that does not come from validation.
#[derive(Clone, Debug)]
pub struct DatasetDraft {
    pub id: Uuid,
    pub name: String,
    pub training_objective: TrainingObjective,
    pub origin: DatasetOrigin,
    pub field_mapping: Vec<FieldMapping>,
    pub percentages: SplitPercentages,
    pub content: ContentDigest,
}

/// Builds the canonical record. Only a validation result without errors is accepted.
pub fn assemble(validation: &ValidationResult, draft: DatasetDraft) -> Result<Dataset> {
    if !validation.is_valid || !validation.errors.is_empty() {
        return Err(DatasetError::Invalid(validation.errors.clone()));
    }
    let source_format = validation.format.source().ok_or_else(|| {
        DatasetError::Invalid(vec!["dataset format is unknown".to_string()])
    })?;
    if draft.name.trim().is_empty() {
        return Err(DatasetError::Configuration("dataset name must not be empty".to_string()));
    }
    check_mapping(&draft.field_mapping, draft.training_objective)?;

    let total_examples = validation.stats.total_examples;
    let split = allocate(total_examples, draft.percentages)?;

    Ok(Dataset {
        id: draft.id,
        name: draft.name.trim().to_string(),
        training_objective: draft.training_objective,
        source_format,
        origin: draft.origin,
        total_examples,
        split,
        split_percentages: draft.percentages,
        field_mapping: draft.field_mapping,
        data_key: draft.content.data_key,
        dataset_hash: draft.content.dataset_hash,
        size_bytes: draft.content.size_bytes,
        warnings: validation.warnings.clone(),
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DetectedFormat, TargetField};
    use crate::validate::{validate, ValidationConfig};

    #[test]
    fn percentages_must_sum_to_100() {
        assert!(SplitPercentages::new(80, 15, 5).is_ok());
        assert!(matches!(
            SplitPercentages::new(80, 15, 10),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn oversized_percentages_do_not_wrap() {
        assert!(matches!(
            SplitPercentages::new(u32::MAX, 101, 0),
            Err(DatasetError::Configuration(_))
        ));
        let p = SplitPercentages {
            train: u32::MAX,
            validation: u32::MAX,
            test: 102,
        };
        assert!(matches!(allocate(2, p), Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn largest_remainder_never_drops_rows() {
        let c = allocate(7, SplitPercentages::new(80, 15, 5).unwrap()).unwrap();
        // 5.6 / 1.05 / 0.35 -> 5 / 1 / 0, leftover 1 goes to train (.6)
        assert_eq!(c, SplitCounts { train: 6, validation: 1, test: 0 });

        let c = allocate(10, SplitPercentages::new(33, 33, 34).unwrap()).unwrap();
        assert_eq!(c.total(), 10);
        assert_eq!(c, SplitCounts { train: 3, validation: 3, test: 4 });

        let c = allocate(1, SplitPercentages::new(34, 33, 33).unwrap()).unwrap();
        assert_eq!(c, SplitCounts { train: 1, validation: 0, test: 0 });
    }

    #[test]
    fn split_sum_holds_for_many_inputs() {
        for total in [0u64, 1, 2, 3, 17, 99, 100, 101, 12_345] {
            for train in (0..=100).step_by(7) {
                for val in (0..=(100 - train)).step_by(11) {
                    let pct = SplitPercentages::new(train, val, 100 - train - val).unwrap();
                    assert_eq!(allocate(total, pct).unwrap().total(), total);
                }
            }
        }
    }

    fn draft() -> DatasetDraft {
        DatasetDraft {
            id: Uuid::new_v4(),
            name: "code-review".to_string(),
            training_objective: TrainingObjective::Supervised,
            origin: DatasetOrigin::Upload {
                file_name: "a.jsonl".to_string(),
            },
            field_mapping: vec![
                FieldMapping::new("prompt", TargetField::Prompt),
                FieldMapping::new("completion", TargetField::Completion),
            ],
            percentages: SplitPercentages::default(),
            content: ContentDigest {
                data_key: "data/x.jsonl".to_string(),
                dataset_hash: "00".to_string(),
                size_bytes: 2,
            },
        }
    }

    #[test]
    fn assemble_refuses_invalid_results() {
        let r = validate(DetectedFormat::Jsonl, "{oops", &ValidationConfig::default());
        assert!(matches!(assemble(&r, draft()), Err(DatasetError::Invalid(_))));
    }

    #[test]
    fn assemble_builds_record() {
        let content: String = (0..20)
            .map(|i| format!("{{\"prompt\":\"p{i}\",\"completion\":\"c{i}\"}}\n"))
            .collect();
        let r = validate(DetectedFormat::Jsonl, &content, &ValidationConfig::default());
        let ds = assemble(&r, draft()).unwrap();
        assert_eq!(ds.total_examples, 20);
        assert_eq!(ds.split, SplitCounts { train: 16, validation: 3, test: 1 });
        assert_eq!(ds.source_format, crate::schema::SourceFormat::Jsonl);
    }
}
