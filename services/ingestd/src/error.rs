use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use datasets::{DatasetError, UploadRejection, ValidationResult};
use datastore::StoreError;
use serde_json::{json, Value};

use crate::hub::HubError;
use crate::imports::ImportError;

/// Handler error; rendered as `(status, {"error": ...})`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": msg.into() }),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Structural validation failure; the whole result goes back to the caller.
    pub fn invalid(validation: ValidationResult) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: json!({
                "error": "dataset_validation_failed",
                "errors": validation.errors,
                "validation": validation,
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<DatasetError> for ApiError {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::Invalid(errors) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({ "error": "dataset_validation_failed", "errors": errors }),
            },
            DatasetError::NotCanonical | DatasetError::Serialization(_) => Self::internal(e.to_string()),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateName { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            StoreError::Dataset(inner) => inner.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Unavailable(_) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
            HubError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            HubError::UnknownSplit { .. } => Self::bad_request(e.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Duplicate(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            ImportError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            ImportError::Dataset(inner) => inner.into(),
            ImportError::Store(inner) => inner.into(),
            ImportError::Join(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<UploadRejection> for ApiError {
    fn from(r: UploadRejection) -> Self {
        match r {
            UploadRejection::Invalid(validation) => Self::invalid(validation),
            UploadRejection::Mapping { validation, error } => Self {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": error.to_string(),
                    "detected_fields": validation.stats.detected_fields,
                    "validation": validation,
                }),
            },
            UploadRejection::Conversion { validation, errors } => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({
                    "error": "dataset_conversion_failed",
                    "errors": errors,
                    "validation": validation,
                }),
            },
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("background task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let dup = StoreError::DuplicateName {
            name: "a".into(),
            existing: uuid::Uuid::nil(),
        };
        assert_eq!(ApiError::from(dup).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(HubError::Unavailable("timeout".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(DatasetError::Configuration("bad split".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ImportError::Duplicate("alpaca-subset".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
