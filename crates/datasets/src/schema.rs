use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DatasetError, Result};
use crate::split::{SplitCounts, SplitPercentages};

/// Pre-mapping record: every value flattened to a string.
pub type RawRecord = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingObjective {
    Supervised,
    Preference,
    Reward,
    Qa,
    Custom,
}

/// The two record layouts a training launcher accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordShape {
    Supervised,
    Preference,
}

impl TrainingObjective {
    pub fn shape(self) -> RecordShape {
        match self {
            Self::Preference | Self::Reward => RecordShape::Preference,
            Self::Supervised | Self::Qa | Self::Custom => RecordShape::Supervised,
        }
    }

    pub fn required_targets(self) -> &'static [TargetField] {
        self.shape().required_targets()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Supervised => "supervised",
            Self::Preference => "preference",
            Self::Reward => "reward",
            Self::Qa => "qa",
            Self::Custom => "custom",
        }
    }
}

impl RecordShape {
    pub fn required_targets(self) -> &'static [TargetField] {
        match self {
            Self::Supervised => &[TargetField::Prompt, TargetField::Completion],
            Self::Preference => &[TargetField::Prompt, TargetField::Chosen, TargetField::Rejected],
        }
    }
}

impl FromStr for TrainingObjective {
    type Err = DatasetError;

    // Also accepts the short training-type tags used by the launcher (SL, DPO, RLHF).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supervised" | "sl" | "sft" => Ok(Self::Supervised),
            "preference" | "dpo" | "rlhf" => Ok(Self::Preference),
            "reward" | "rm" => Ok(Self::Reward),
            "qa" => Ok(Self::Qa),
            "custom" => Ok(Self::Custom),
            other => Err(DatasetError::Configuration(format!(
                "unknown training objective '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TrainingObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jsonl,
    Json,
    Csv,
}

/// Result of format detection; `Unknown` never reaches a persisted record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Jsonl,
    Json,
    Csv,
    Unknown,
}

impl DetectedFormat {
    pub fn source(self) -> Option<SourceFormat> {
        match self {
            Self::Jsonl => Some(SourceFormat::Jsonl),
            Self::Json => Some(SourceFormat::Json),
            Self::Csv => Some(SourceFormat::Csv),
            Self::Unknown => None,
        }
    }

    /// Parses a caller-declared format. `None` means "detect it".
    pub fn parse_declared(s: &str) -> Result<Option<Self>> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(None),
            "jsonl" | "ndjson" => Ok(Some(Self::Jsonl)),
            "json" => Ok(Some(Self::Json)),
            "csv" => Ok(Some(Self::Csv)),
            other => Err(DatasetError::Configuration(format!(
                "unsupported dataset format '{other}'"
            ))),
        }
    }
}

impl From<SourceFormat> for DetectedFormat {
    fn from(f: SourceFormat) -> Self {
        match f {
            SourceFormat::Jsonl => Self::Jsonl,
            SourceFormat::Json => Self::Json,
            SourceFormat::Csv => Self::Csv,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetField {
    Prompt,
    Completion,
    Chosen,
    Rejected,
}

impl TargetField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Completion => "completion",
            Self::Chosen => "chosen",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: TargetField,
}

impl FieldMapping {
    pub fn new(source_field: impl Into<String>, target_field: TargetField) -> Self {
        Self {
            source_field: source_field.into(),
            target_field,
        }
    }
}

/// A training example, before (`Raw`) or after field mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Supervised {
        prompt: String,
        completion: String,
    },
    Preference {
        prompt: String,
        chosen: String,
        rejected: String,
    },
    Raw(RawRecord),
}

impl Record {
    /// One line of the canonical JSONL file (without the trailing newline).
    pub fn to_canonical_line(&self) -> Result<String> {
        match self {
            Self::Raw(_) => Err(DatasetError::NotCanonical),
            _ => serde_json::to_string(self).map_err(|e| DatasetError::Serialization(e.to_string())),
        }
    }

    pub fn parse_canonical(line: &str) -> Result<Self> {
        let v: serde_json::Value =
            serde_json::from_str(line).map_err(|e| DatasetError::Serialization(e.to_string()))?;
        let text = |k: &str| v.get(k).and_then(|x| x.as_str()).map(str::to_string);

        match (text("prompt"), text("completion"), text("chosen"), text("rejected")) {
            (Some(prompt), _, Some(chosen), Some(rejected)) => Ok(Self::Preference {
                prompt,
                chosen,
                rejected,
            }),
            (Some(prompt), Some(completion), _, _) => Ok(Self::Supervised { prompt, completion }),
            _ => Err(DatasetError::Serialization(
                "line is neither a supervised nor a preference record".to_string(),
            )),
        }
    }
}

/// Metadata about a hub dataset. Search results only fill the lightweight fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDatasetInfo {
    pub name: String,
    pub description: String,
    pub splits: BTreeSet<String>,
    pub features: BTreeMap<String, String>,
    pub num_rows: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_in_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatasetOrigin {
    Upload { file_name: String },
    Hub { dataset: String, split: String },
}

/// Where the canonical bytes of a dataset live and what they hash to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest {
    pub data_key: String,
    pub dataset_hash: String,
    pub size_bytes: u64,
}

/// Persisted canonical dataset record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub training_objective: TrainingObjective,
    pub source_format: SourceFormat,
    pub origin: DatasetOrigin,
    pub total_examples: u64,
    pub split: SplitCounts,
    pub split_percentages: SplitPercentages,
    pub field_mapping: Vec<FieldMapping>,
    pub data_key: String,
    pub dataset_hash: String,
    pub size_bytes: u64,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objectives_resolve_to_shapes() {
        assert_eq!(TrainingObjective::Qa.shape(), RecordShape::Supervised);
        assert_eq!(TrainingObjective::Reward.shape(), RecordShape::Preference);
        assert_eq!(
            TrainingObjective::Preference.required_targets(),
            &[TargetField::Prompt, TargetField::Chosen, TargetField::Rejected]
        );
        assert_eq!("DPO".parse::<TrainingObjective>().unwrap(), TrainingObjective::Preference);
        assert!("ppo".parse::<TrainingObjective>().is_err());
    }

    #[test]
    fn canonical_lines_keep_field_order() {
        let rec = Record::Preference {
            prompt: "p".into(),
            chosen: "c".into(),
            rejected: "r".into(),
        };
        let line = rec.to_canonical_line().unwrap();
        assert_eq!(line, r#"{"prompt":"p","chosen":"c","rejected":"r"}"#);
        assert_eq!(Record::parse_canonical(&line).unwrap(), rec);

        assert!(Record::Raw(RawRecord::new()).to_canonical_line().is_err());
    }

    #[test]
    fn declared_format_auto_means_detect() {
        assert_eq!(DetectedFormat::parse_declared("auto").unwrap(), None);
        assert_eq!(DetectedFormat::parse_declared("CSV").unwrap(), Some(DetectedFormat::Csv));
        assert!(DetectedFormat::parse_declared("parquet").is_err());
    }
}
