use thiserror::Error;

use crate::schema::TargetField;

#[derive(Debug, Error)]
pub enum DatasetError {
    /// Split percentages or other caller-supplied settings are inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dataset has {} validation error(s)", .0.len())]
    Invalid(Vec<String>),

    #[error("Field mapping is missing required target(s): {}", join_targets(.missing))]
    IncompleteMapping { missing: Vec<TargetField> },

    #[error("Field mapping assigns target '{0}' more than once")]
    DuplicateTarget(TargetField),

    #[error("Record {record}: missing source field '{field}'")]
    MissingSourceField { record: usize, field: String },

    #[error("Raw records cannot be written in canonical form")]
    NotCanonical,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

fn join_targets(targets: &[TargetField]) -> String {
    targets
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
