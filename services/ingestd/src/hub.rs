use async_trait::async_trait;
use datasets::{RawRecord, RemoteDatasetInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// Transport, status or decode failure. No partial results are returned.
    #[error("remote dataset unavailable: {0}")]
    Unavailable(String),

    #[error("remote dataset not found: {0}")]
    NotFound(String),

    #[error("dataset {dataset} has no split '{split}'")]
    UnknownSplit { dataset: String, split: String },
}

/// One page of rows from a hub split.
#[derive(Clone, Debug, Default)]
pub struct RowsPage {
    pub rows: Vec<RawRecord>,
    /// Rows in the whole split, as reported by the hub.
    pub total: u64,
}

/// Read-only access to a remote dataset hub. All calls are safe to retry.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<RemoteDatasetInfo>, HubError>;

    async fn info(&self, name: &str) -> Result<RemoteDatasetInfo, HubError>;

    async fn rows(
        &self,
        name: &str,
        config: Option<&str>,
        split: &str,
        offset: u64,
        length: u32,
    ) -> Result<RowsPage, HubError>;
}

#[cfg(test)]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::Arc;

    use tokio::sync::Semaphore;

    use super::*;

    /// In-memory hub. With a gate set, `rows` waits for a permit per page.
    #[derive(Default)]
    pub struct FakeHub {
        datasets: HashMap<String, (RemoteDatasetInfo, Vec<RawRecord>)>,
        gate: Option<Arc<Semaphore>>,
        broken: bool,
    }

    impl FakeHub {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dataset(mut self, name: &str, split: &str, rows: Vec<RawRecord>) -> Self {
            let mut info = RemoteDatasetInfo {
                name: name.to_string(),
                description: format!("{name} test data"),
                config: Some("default".to_string()),
                ..Default::default()
            };
            info.splits.insert(split.to_string());
            info.num_rows.insert(split.to_string(), rows.len() as u64);
            if let Some(first) = rows.first() {
                for key in first.keys() {
                    info.features.insert(key.clone(), "string".to_string());
                }
            }
            self.datasets.insert(name.to_string(), (info, rows));
            self
        }

        pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            self.gate = Some(gate.clone());
            (self, gate)
        }

        pub fn broken(mut self) -> Self {
            self.broken = true;
            self
        }

        fn check(&self) -> Result<(), HubError> {
            if self.broken {
                return Err(HubError::Unavailable("connection refused".to_string()));
            }
            Ok(())
        }
    }

    pub fn row(pairs: &[(&str, &str)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[async_trait]
    impl HubClient for FakeHub {
        async fn search(&self, query: &str, limit: u32) -> Result<Vec<RemoteDatasetInfo>, HubError> {
            self.check()?;
            let q = query.to_lowercase();
            let mut hits: Vec<_> = self
                .datasets
                .values()
                .filter(|(info, _)| info.name.to_lowercase().contains(&q))
                .map(|(info, _)| info.clone())
                .collect();
            hits.sort_by(|a, b| a.name.cmp(&b.name));
            hits.truncate(limit as usize);
            Ok(hits)
        }

        async fn info(&self, name: &str) -> Result<RemoteDatasetInfo, HubError> {
            self.check()?;
            self.datasets
                .get(name)
                .map(|(info, _)| info.clone())
                .ok_or_else(|| HubError::NotFound(name.to_string()))
        }

        async fn rows(
            &self,
            name: &str,
            _config: Option<&str>,
            split: &str,
            offset: u64,
            length: u32,
        ) -> Result<RowsPage, HubError> {
            self.check()?;
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| HubError::Unavailable(e.to_string()))?
                    .forget();
            }
            let (info, rows) = self
                .datasets
                .get(name)
                .ok_or_else(|| HubError::NotFound(name.to_string()))?;
            if !info.splits.contains(split) {
                return Err(HubError::NotFound(format!("{name}/{split}")));
            }
            Ok(RowsPage {
                rows: rows
                    .iter()
                    .skip(offset as usize)
                    .take(length as usize)
                    .cloned()
                    .collect(),
                total: rows.len() as u64,
            })
        }
    }
}
