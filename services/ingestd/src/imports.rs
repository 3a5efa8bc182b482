//! Remote imports run as background jobs and are polled by id.
//!
//! Only one in-flight import may target a given dataset name, and a name that
//! is already persisted cannot be imported again. Cancellation is cooperative:
//! the job stops before its next page and before the commit, and nothing is
//! written once a cancel has been observed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use datasets::{
    check_mapping, convert_all, validate, Dataset, DatasetError, DatasetOrigin, DetectedFormat,
    FieldMapping, RawRecord, Record, SplitPercentages, TrainingObjective, ValidationResult,
};
use datastore::{NewDataset, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{SharedState, SharedStore};
use crate::store_exec::{read_store, write_store};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("An import or dataset named '{0}' already exists")]
    Duplicate(String),

    #[error("Import not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportStatus {
    pub id: Uuid,
    /// Id the dataset will have once committed.
    pub dataset_id: Uuid,
    pub hub_dataset: String,
    pub split: String,
    pub target_name: String,
    pub state: ImportState,
    pub percent: u8,
    pub message: String,
    pub samples_processed: u64,
    pub total_samples: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub enum ImportEvent {
    Started,
    Fetched { processed: u64, total: u64 },
    Saving,
    Done,
    Failed(String),
    Cancelled,
}

impl ImportStatus {
    fn pending(target_name: &str, hub_dataset: &str, split: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dataset_id: Uuid::new_v4(),
            hub_dataset: hub_dataset.to_string(),
            split: split.to_string(),
            target_name: target_name.to_string(),
            state: ImportState::Pending,
            percent: 0,
            message: "Queued".to_string(),
            samples_processed: 0,
            total_samples: 0,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Terminal states are final; later events are ignored.
    pub fn apply_event(&mut self, ev: &ImportEvent, now: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        self.updated_at = now;

        match ev {
            ImportEvent::Started => {
                self.state = ImportState::Running;
                self.percent = 10;
                self.message = format!("Fetching {} ({} split)", self.hub_dataset, self.split);
            }
            ImportEvent::Fetched { processed, total } => {
                self.state = ImportState::Running;
                self.samples_processed = *processed;
                self.total_samples = *total;
                if *total > 0 {
                    self.percent = (10 + (*processed).min(*total) * 80 / *total) as u8;
                }
            }
            ImportEvent::Saving => {
                self.percent = 90;
                self.message = "Saving dataset".to_string();
            }
            ImportEvent::Done => {
                self.state = ImportState::Completed;
                self.percent = 100;
                self.message = "Import complete".to_string();
                self.error = None;
            }
            ImportEvent::Failed(msg) => {
                self.state = ImportState::Failed;
                self.message = "Import failed".to_string();
                self.error = Some(msg.clone());
            }
            ImportEvent::Cancelled => {
                self.state = ImportState::Cancelled;
                self.message = "Import cancelled".to_string();
            }
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImportRequest {
    pub dataset_name: String,
    #[serde(default = "default_split")]
    pub split: String,
    /// Name of the resulting dataset; defaults to `dataset_name`.
    #[serde(default)]
    pub name: Option<String>,
    pub training_objective: String,
    pub field_mapping: Vec<FieldMapping>,
    #[serde(default)]
    pub max_samples: Option<u64>,
    #[serde(default)]
    pub split_percentages: Option<SplitPercentages>,
}

fn default_split() -> String {
    "train".to_string()
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ImportHandle {
    pub dataset_id: Uuid,
    pub import_id: Uuid,
}

struct Entry {
    status: ImportStatus,
    cancel: CancellationToken,
}

/// Finished imports stay pollable for this long after their last update.
const FINISHED_RETENTION_MINUTES: i64 = 60;
const MAX_FINISHED: usize = 256;

#[derive(Clone)]
pub struct ImportRegistry {
    entries: Arc<RwLock<HashMap<Uuid, Entry>>>,
    retention: Duration,
    max_finished: usize,
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new(Duration::minutes(FINISHED_RETENTION_MINUTES), MAX_FINISHED)
    }
}

impl ImportRegistry {
    pub fn new(retention: Duration, max_finished: usize) -> Self {
        Self {
            entries: Arc::default(),
            retention,
            max_finished,
        }
    }

    /// Registers a pending import for `target_name`. The in-flight check, the
    /// persisted-name check and the registration all happen under one write lock.
    pub async fn begin(
        &self,
        store: &SharedStore,
        target_name: &str,
        hub_dataset: &str,
        split: &str,
    ) -> Result<(ImportStatus, CancellationToken), ImportError> {
        let mut entries = self.entries.write().await;
        prune_finished(&mut entries, Utc::now(), self.retention, self.max_finished);

        let in_flight = entries.values().any(|e| {
            !e.status.state.is_terminal() && e.status.target_name.eq_ignore_ascii_case(target_name)
        });
        if in_flight {
            return Err(ImportError::Duplicate(target_name.to_string()));
        }

        let name = target_name.to_string();
        let persisted =
            read_store::<_, ImportError, _>(store, move |s| s.find_by_name(&name)).await?;
        if persisted.is_some() {
            return Err(ImportError::Duplicate(target_name.to_string()));
        }

        let status = ImportStatus::pending(target_name, hub_dataset, split);
        let cancel = CancellationToken::new();
        entries.insert(
            status.id,
            Entry {
                status: status.clone(),
                cancel: cancel.clone(),
            },
        );
        Ok((status, cancel))
    }

    pub async fn status(&self, id: Uuid) -> Option<ImportStatus> {
        self.entries.read().await.get(&id).map(|e| e.status.clone())
    }

    pub async fn apply(&self, id: Uuid, ev: ImportEvent) {
        if let Some(e) = self.entries.write().await.get_mut(&id) {
            e.status.apply_event(&ev, Utc::now());
        }
    }

    /// Requests cancellation. Finished imports are returned unchanged.
    pub async fn cancel(&self, id: Uuid) -> Result<ImportStatus, ImportError> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or(ImportError::NotFound(id))?;
        if !entry.status.state.is_terminal() && !entry.cancel.is_cancelled() {
            entry.cancel.cancel();
            entry.status.message = "Cancellation requested".to_string();
            entry.status.updated_at = Utc::now();
            info!(import_id = %id, "import cancellation requested");
        }
        Ok(entry.status.clone())
    }
}

/// Drops finished imports older than `retention`, then the oldest finished
/// ones beyond `max_finished`. Pending and running imports are never dropped.
fn prune_finished(
    entries: &mut HashMap<Uuid, Entry>,
    now: DateTime<Utc>,
    retention: Duration,
    max_finished: usize,
) {
    let before = entries.len();
    entries.retain(|_, e| !e.status.state.is_terminal() || now - e.status.updated_at <= retention);

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = entries
        .values()
        .filter(|e| e.status.state.is_terminal())
        .map(|e| (e.status.updated_at, e.status.id))
        .collect();
    if finished.len() > max_finished {
        finished.sort_unstable();
        let excess = finished.len() - max_finished;
        for (_, id) in &finished[..excess] {
            entries.remove(id);
        }
    }

    let dropped = before - entries.len();
    if dropped > 0 {
        debug!(dropped, kept = entries.len(), "pruned finished imports");
    }
}

struct ImportJob {
    status: ImportStatus,
    objective: TrainingObjective,
    percentages: SplitPercentages,
    field_mapping: Vec<FieldMapping>,
    max_samples: Option<u64>,
    cancel: CancellationToken,
}

enum Stop {
    Cancelled,
    Failed(String),
}

fn fail(e: impl std::fmt::Display) -> Stop {
    Stop::Failed(e.to_string())
}

/// Checks the request, registers it and spawns the job. Returns immediately.
pub async fn start_import(state: &SharedState, req: ImportRequest) -> Result<ImportHandle, ImportError> {
    let objective: TrainingObjective = req.training_objective.parse()?;
    check_mapping(&req.field_mapping, objective)?;
    let percentages = req.split_percentages.unwrap_or_default();
    percentages.check()?;

    let target_name = req
        .name
        .as_deref()
        .unwrap_or(&req.dataset_name)
        .trim()
        .to_string();
    if target_name.is_empty() || req.dataset_name.trim().is_empty() {
        return Err(DatasetError::Configuration("Dataset name must not be empty".to_string()).into());
    }

    let (status, cancel) = state
        .imports
        .begin(&state.store, &target_name, req.dataset_name.trim(), &req.split)
        .await?;
    let handle = ImportHandle {
        dataset_id: status.dataset_id,
        import_id: status.id,
    };
    info!(
        import_id = %handle.import_id,
        hub_dataset = %status.hub_dataset,
        split = %status.split,
        name = %status.target_name,
        "import started"
    );

    let job = ImportJob {
        status,
        objective,
        percentages,
        field_mapping: req.field_mapping,
        max_samples: req.max_samples,
        cancel,
    };
    tokio::spawn(run_import(state.clone(), job));
    Ok(handle)
}

async fn run_import(state: SharedState, job: ImportJob) {
    let id = job.status.id;
    state.imports.apply(id, ImportEvent::Started).await;

    match execute(&state, &job).await {
        Ok(ds) => {
            info!(import_id = %id, dataset_id = %ds.id, examples = ds.total_examples, "import completed");
            state.imports.apply(id, ImportEvent::Done).await;
        }
        Err(Stop::Cancelled) => {
            info!(import_id = %id, "import cancelled");
            state.imports.apply(id, ImportEvent::Cancelled).await;
        }
        Err(Stop::Failed(msg)) => {
            warn!(import_id = %id, error = %msg, "import failed");
            state.imports.apply(id, ImportEvent::Failed(msg)).await;
        }
    }
}

async fn execute(state: &SharedState, job: &ImportJob) -> Result<Dataset, Stop> {
    let st = &job.status;
    let client = state.resolver.client();

    let info = state.resolver.get_info(&st.hub_dataset).await.map_err(fail)?;
    if !info.splits.contains(&st.split) {
        return Err(Stop::Failed(format!(
            "dataset {} has no split '{}'",
            info.name, st.split
        )));
    }

    let available = info.num_rows.get(&st.split).copied();
    let max = job
        .max_samples
        .unwrap_or(state.config.import.default_max_samples);
    let mut target = available.map_or(max, |n| n.min(max));
    let page_size = u64::from(state.config.import.page_size);

    let mut raw: Vec<RawRecord> = Vec::new();
    while (raw.len() as u64) < target {
        let offset = raw.len() as u64;
        let want = (target - offset).min(page_size) as u32;
        let page = tokio::select! {
            _ = job.cancel.cancelled() => return Err(Stop::Cancelled),
            page = client.rows(&info.name, info.config.as_deref(), &st.split, offset, want) => page.map_err(fail)?,
        };
        if page.rows.is_empty() {
            break;
        }
        if page.total > 0 {
            target = target.min(page.total);
        }
        raw.extend(page.rows.into_iter().take(want as usize));
        state
            .imports
            .apply(
                st.id,
                ImportEvent::Fetched {
                    processed: raw.len() as u64,
                    total: target.max(raw.len() as u64),
                },
            )
            .await;
    }
    if job.cancel.is_cancelled() {
        return Err(Stop::Cancelled);
    }

    // Map, then re-validate the canonical JSONL before anything is persisted.
    let mapping = job.field_mapping.clone();
    let objective = job.objective;
    let cfg = state.config.validation();
    let (validation, records) = tokio::task::spawn_blocking(move || -> Result<(ValidationResult, Vec<Record>), Stop> {
        let records = convert_all(&raw, &mapping, objective).map_err(summarize)?;
        let mut canonical = String::new();
        for rec in &records {
            canonical.push_str(&rec.to_canonical_line().map_err(fail)?);
            canonical.push('\n');
        }
        let validation = validate(DetectedFormat::Jsonl, &canonical, &cfg);
        if !validation.is_valid {
            return Err(Stop::Failed(format!(
                "canonical output failed validation: {}",
                validation.errors.join("; ")
            )));
        }
        Ok((validation, records))
    })
    .await
    .map_err(fail)??;

    state.imports.apply(st.id, ImportEvent::Saving).await;
    if job.cancel.is_cancelled() {
        return Err(Stop::Cancelled);
    }

    let new = NewDataset {
        id: st.dataset_id,
        name: st.target_name.clone(),
        training_objective: job.objective,
        origin: DatasetOrigin::Hub {
            dataset: info.name.clone(),
            split: st.split.clone(),
        },
        field_mapping: job.field_mapping.clone(),
        percentages: job.percentages,
    };
    write_store::<_, ImportError, _>(&state.store, move |s| s.commit(&validation, new, &records))
        .await
        .map_err(fail)
}

fn summarize(errors: Vec<String>) -> Stop {
    const SHOWN: usize = 3;
    let mut msg = errors.iter().take(SHOWN).cloned().collect::<Vec<_>>().join("; ");
    if errors.len() > SHOWN {
        msg.push_str(&format!(" (and {} more)", errors.len() - SHOWN));
    }
    Stop::Failed(msg)
}
