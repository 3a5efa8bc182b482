use std::sync::Arc;

use datasets::{FieldMapping, MappingSuggestion, RemoteDatasetInfo, TrainingObjective};
use serde_json::{Map, Value};
use tracing::info;

use crate::hub::{HubClient, HubError};

/// Largest remote preview a caller may ask for.
pub const MAX_PREVIEW_ROWS: usize = 5;

#[derive(Clone)]
pub struct Resolver {
    client: Arc<dyn HubClient>,
    preview_chars: usize,
}

impl Resolver {
    pub fn new(client: Arc<dyn HubClient>, preview_chars: usize) -> Self {
        Self {
            client,
            preview_chars,
        }
    }

    pub fn client(&self) -> &Arc<dyn HubClient> {
        &self.client
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<RemoteDatasetInfo>, HubError> {
        let hits = self.client.search(query.trim(), limit.clamp(1, 100)).await?;
        info!(query = %query, hits = hits.len(), "hub search");
        Ok(hits)
    }

    pub async fn get_info(&self, name: &str) -> Result<RemoteDatasetInfo, HubError> {
        self.client.info(name.trim()).await
    }

    /// Suggests a mapping over the dataset's feature names.
    pub async fn suggest_mapping(
        &self,
        name: &str,
        objective: TrainingObjective,
    ) -> Result<(RemoteDatasetInfo, MappingSuggestion), HubError> {
        let info = self.get_info(name).await?;
        let suggestion = datasets::suggest_mapping(info.features.keys().map(String::as_str), objective);
        Ok((info, suggestion))
    }

    /// First `n` rows of `split` (at most [`MAX_PREVIEW_ROWS`]) projected onto the mapping.
    pub async fn preview(
        &self,
        name: &str,
        split: &str,
        mapping: &[FieldMapping],
        n: usize,
    ) -> Result<Vec<Map<String, Value>>, HubError> {
        let info = self.get_info(name).await?;
        if !info.splits.contains(split) {
            return Err(HubError::UnknownSplit {
                dataset: info.name,
                split: split.to_string(),
            });
        }

        let n = n.min(MAX_PREVIEW_ROWS);
        if n == 0 {
            return Ok(vec![]);
        }
        let page = self
            .client
            .rows(&info.name, info.config.as_deref(), split, 0, n as u32)
            .await?;
        Ok(datasets::sample(&page.rows, mapping, n, self.preview_chars))
    }
}
