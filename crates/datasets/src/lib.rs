//! Training dataset ingest core.
//!
//! Format detection, structural validation, field mapping, preview sampling
//! and split assembly. Everything here is synchronous and works on in-memory
//! buffers; persistence lives in the `datastore` crate.

pub mod catalog;
pub mod error;
pub mod format;
pub mod mapping;
pub mod preview;
pub mod schema;
pub mod split;
pub mod validate;

pub use error::{DatasetError, Result};
pub use format::detect_format;
pub use mapping::{apply_mapping, check_mapping, convert_all, suggest_mapping, MappingSuggestion};
pub use preview::sample;
pub use schema::{
    ContentDigest, Dataset, DatasetOrigin, DetectedFormat, FieldMapping, RawRecord, Record,
    RecordShape, RemoteDatasetInfo, SourceFormat, TargetField, TrainingObjective,
};
pub use split::{allocate, assemble, DatasetDraft, SplitCounts, SplitPercentages};
pub use validate::{parse_records, validate, ValidationConfig, ValidationResult, ValidationStats};

/// Output of [`prepare_local`]: a validated source converted to canonical records.
#[derive(Clone, Debug)]
pub struct PreparedUpload {
    pub validation: ValidationResult,
    pub field_mapping: Vec<FieldMapping>,
    pub records: Vec<Record>,
}

/// Why a local upload could not be turned into canonical records.
#[derive(Debug)]
pub enum UploadRejection {
    /// Structural errors; the full result is returned so callers can show everything.
    Invalid(ValidationResult),
    Mapping {
        validation: ValidationResult,
        error: DatasetError,
    },
    /// Some records lack a mapped source field.
    Conversion {
        validation: ValidationResult,
        errors: Vec<String>,
    },
}

/// Validates `content`, resolves the field mapping (explicit or suggested) and
/// converts every record. `declared` overrides detection when set.
pub fn prepare_local(
    file_name: &str,
    content: &str,
    declared: Option<DetectedFormat>,
    objective: TrainingObjective,
    explicit_mapping: Option<Vec<FieldMapping>>,
    cfg: &ValidationConfig,
) -> std::result::Result<PreparedUpload, UploadRejection> {
    let format = declared.unwrap_or_else(|| detect_format(file_name, content));
    let validation = validate(format, content, cfg);
    if !validation.is_valid {
        return Err(UploadRejection::Invalid(validation));
    }

    let field_mapping = match explicit_mapping {
        Some(m) => m,
        None => {
            let fields = validation.stats.detected_fields.iter().map(String::as_str);
            let suggestion = suggest_mapping(fields, objective);
            if !suggestion.is_complete() {
                return Err(UploadRejection::Mapping {
                    validation,
                    error: DatasetError::IncompleteMapping {
                        missing: suggestion.missing,
                    },
                });
            }
            suggestion.mappings
        }
    };
    if let Err(error) = check_mapping(&field_mapping, objective) {
        return Err(UploadRejection::Mapping { validation, error });
    }

    let raw = parse_records(format, content);
    match convert_all(&raw, &field_mapping, objective) {
        Ok(records) => Ok(PreparedUpload {
            validation,
            field_mapping,
            records,
        }),
        Err(errors) => Err(UploadRejection::Conversion { validation, errors }),
    }
}
