use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use datasets::catalog::{popular_datasets, PopularDataset};
use datasets::{FieldMapping, MappingSuggestion, RemoteDatasetInfo, TrainingObjective};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::imports::{start_import, ImportError, ImportHandle, ImportRequest, ImportStatus};
use crate::resolver::MAX_PREVIEW_ROWS;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub limit: Option<u32>,
}

pub async fn get_search(
    State(state): State<SharedState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<RemoteDatasetInfo>>, ApiError> {
    let hits = state.resolver.search(&q.query, q.limit.unwrap_or(20)).await?;
    Ok(Json(hits))
}

pub async fn get_info(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<RemoteDatasetInfo>, ApiError> {
    Ok(Json(state.resolver.get_info(&name).await?))
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub dataset_name: String,
    pub training_objective: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    #[serde(flatten)]
    pub suggestion: MappingSuggestion,
    pub features: BTreeMap<String, String>,
}

pub async fn post_suggest_mapping(
    State(state): State<SharedState>,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let objective: TrainingObjective = req.training_objective.parse()?;
    let (info, suggestion) = state
        .resolver
        .suggest_mapping(&req.dataset_name, objective)
        .await?;
    Ok(Json(SuggestResponse {
        suggestion,
        features: info.features,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub dataset_name: String,
    #[serde(default = "default_split")]
    pub split: String,
    #[serde(default)]
    pub field_mapping: Vec<FieldMapping>,
    #[serde(default = "default_preview_rows")]
    pub num_samples: usize,
}

fn default_split() -> String {
    "train".to_string()
}

fn default_preview_rows() -> usize {
    MAX_PREVIEW_ROWS
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub dataset_name: String,
    pub split: String,
    pub samples: Vec<Map<String, Value>>,
    pub total_samples: usize,
}

pub async fn post_preview(
    State(state): State<SharedState>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let samples = state
        .resolver
        .preview(&req.dataset_name, &req.split, &req.field_mapping, req.num_samples)
        .await?;
    Ok(Json(PreviewResponse {
        dataset_name: req.dataset_name,
        split: req.split,
        total_samples: samples.len(),
        samples,
    }))
}

pub async fn post_import(
    State(state): State<SharedState>,
    Json(req): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportHandle>), ApiError> {
    let handle = start_import(&state, req).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

pub async fn get_import(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportStatus>, ApiError> {
    state
        .imports
        .status(id)
        .await
        .map(Json)
        .ok_or_else(|| ImportError::NotFound(id).into())
}

pub async fn post_cancel_import(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportStatus>, ApiError> {
    Ok(Json(state.imports.cancel(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub objective: Option<String>,
}

pub async fn get_popular(Query(q): Query<PopularQuery>) -> Result<Json<Vec<PopularDataset>>, ApiError> {
    let objective = q
        .objective
        .as_deref()
        .map(str::parse::<TrainingObjective>)
        .transpose()?;
    Ok(Json(popular_datasets(objective)))
}
