use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use datasets::{
    prepare_local, Dataset, DatasetOrigin, DetectedFormat, FieldMapping, SplitPercentages,
    TrainingObjective, ValidationResult,
};
use datastore::NewDataset;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::SharedState;
use crate::store_exec::{read_store, write_store};

/// Fields of a multipart upload. Everything except the file is text.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file_name: String,
    pub file: Option<bytes::Bytes>,
    pub name: Option<String>,
    pub training_objective: Option<String>,
    pub format: Option<String>,
    pub train_split: Option<String>,
    pub val_split: Option<String>,
    pub test_split: Option<String>,
    pub field_mapping: Option<String>,
}

async fn read_form(mut mp: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::bad_request(e.to_string());

    while let Some(field) = mp.next_field().await.map_err(bad)? {
        let Some(key) = field.name().map(str::to_string) else {
            continue;
        };
        if key == "file" {
            form.file_name = field.file_name().unwrap_or_default().to_string();
            form.file = Some(field.bytes().await.map_err(bad)?);
            continue;
        }
        let slot = match key.as_str() {
            "name" => &mut form.name,
            "training_objective" => &mut form.training_objective,
            "format" => &mut form.format,
            "train_split" => &mut form.train_split,
            "val_split" => &mut form.val_split,
            "test_split" => &mut form.test_split,
            "field_mapping" => &mut form.field_mapping,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(bad)?);
    }
    Ok(form)
}

fn file_text(form: &UploadForm) -> Result<String, ApiError> {
    let bytes = form
        .file
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Missing file"))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ApiError::bad_request("File is not valid UTF-8"))
}

fn declared_format(form: &UploadForm) -> Result<Option<DetectedFormat>, ApiError> {
    Ok(DetectedFormat::parse_declared(form.format.as_deref().unwrap_or("auto"))?)
}

fn percentages(form: &UploadForm) -> Result<SplitPercentages, ApiError> {
    let defaults = SplitPercentages::default();
    let parse = |v: &Option<String>, default: u32, key: &str| -> Result<u32, ApiError> {
        match v.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(s) => s
                .parse()
                .map_err(|_| ApiError::bad_request(format!("{key} must be a whole number, got '{s}'"))),
        }
    };
    Ok(SplitPercentages::new(
        parse(&form.train_split, defaults.train, "train_split")?,
        parse(&form.val_split, defaults.validation, "val_split")?,
        parse(&form.test_split, defaults.test, "test_split")?,
    )?)
}

/// Validates, maps and commits an uploaded file. The file is only persisted
/// in canonical form, after every check has passed.
pub async fn ingest_upload(state: &SharedState, form: UploadForm) -> Result<Dataset, ApiError> {
    let content = file_text(&form)?;
    let declared = declared_format(&form)?;
    let percentages = percentages(&form)?;

    let objective: TrainingObjective = form
        .training_objective
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Missing field: training_objective"))?
        .parse()?;

    let mapping: Option<Vec<FieldMapping>> = match form.field_mapping.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            serde_json::from_str(raw)
                .map_err(|e| ApiError::bad_request(format!("field_mapping is not valid JSON: {e}")))?,
        ),
    };

    let name = match form.name.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => std::path::Path::new(&form.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("dataset")
            .to_string(),
    };

    let cfg = state.config.validation();
    let file_name = form.file_name.clone();
    let prepared = tokio::task::spawn_blocking(move || {
        prepare_local(&file_name, &content, declared, objective, mapping, &cfg)
    })
    .await??;

    let new = NewDataset {
        id: Uuid::new_v4(),
        name,
        training_objective: objective,
        origin: DatasetOrigin::Upload {
            file_name: form.file_name,
        },
        field_mapping: prepared.field_mapping,
        percentages,
    };
    let validation = prepared.validation;
    let records = prepared.records;
    let dataset =
        write_store::<_, ApiError, _>(&state.store, move |s| s.commit(&validation, new, &records))
            .await?;

    info!(
        dataset_id = %dataset.id,
        name = %dataset.name,
        format = ?dataset.source_format,
        examples = dataset.total_examples,
        warnings = dataset.warnings.len(),
        "upload stored"
    );
    Ok(dataset)
}

pub async fn post_upload(
    State(state): State<SharedState>,
    mp: Multipart,
) -> Result<(StatusCode, Json<Dataset>), ApiError> {
    let form = read_form(mp).await?;
    let dataset = ingest_upload(&state, form).await?;
    Ok((StatusCode::CREATED, Json(dataset)))
}

/// Validation only; nothing is stored. Invalid files are a normal result here.
pub async fn validate_form(state: &SharedState, form: UploadForm) -> Result<ValidationResult, ApiError> {
    let content = file_text(&form)?;
    let declared = declared_format(&form)?;
    let cfg = state.config.validation();
    let file_name = form.file_name;

    let result = tokio::task::spawn_blocking(move || {
        let format = declared.unwrap_or_else(|| datasets::detect_format(&file_name, &content));
        datasets::validate(format, &content, &cfg)
    })
    .await?;
    Ok(result)
}

pub async fn post_validate(
    State(state): State<SharedState>,
    mp: Multipart,
) -> Result<Json<ValidationResult>, ApiError> {
    let form = read_form(mp).await?;
    Ok(Json(validate_form(&state, form).await?))
}

pub async fn get_datasets(State(state): State<SharedState>) -> Result<Json<Vec<Dataset>>, ApiError> {
    let datasets = read_store::<_, ApiError, _>(&state.store, |s| s.list()).await?;
    Ok(Json(datasets))
}

pub async fn get_dataset(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Dataset>, ApiError> {
    read_store::<_, ApiError, _>(&state.store, move |s| s.get(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Dataset not found: {id}")))
}
