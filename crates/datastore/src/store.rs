use datasets::{
    assemble, ContentDigest, Dataset, DatasetDraft, DatasetOrigin, FieldMapping, Record,
    SplitPercentages, TrainingObjective, ValidationResult,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::Storage;
use crate::{Result, StoreError};

pub const KEY_DATASET_INDEX: &str = "index.json";

pub fn record_key(id: Uuid) -> String {
    format!("records/{id}.json")
}

pub fn data_key(id: Uuid) -> String {
    format!("data/{id}.jsonl")
}

/// Caller-chosen attributes of a dataset about to be committed.
#[derive(Clone, Debug)]
pub struct NewDataset {
    pub id: Uuid,
    pub name: String,
    pub training_objective: TrainingObjective,
    pub origin: DatasetOrigin,
    pub field_mapping: Vec<FieldMapping>,
    pub percentages: SplitPercentages,
}

/// Sole writer of persisted dataset records.
pub struct DatasetStore<S: Storage> {
    storage: S,
}

impl<S: Storage> DatasetStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Assembles and persists a dataset: canonical JSONL first, then the
    /// record, then the index entry. Nothing is written if assembly fails, and a
    /// failed record or index write removes what was already written.
    pub fn commit(
        &mut self,
        validation: &ValidationResult,
        new: NewDataset,
        records: &[Record],
    ) -> Result<Dataset> {
        if let Some(existing) = self.find_by_name(&new.name)? {
            return Err(StoreError::DuplicateName {
                name: new.name,
                existing: existing.id,
            });
        }
        if records.len() as u64 != validation.stats.total_examples {
            return Err(StoreError::Inconsistent(format!(
                "{} canonical records for {} validated examples",
                records.len(),
                validation.stats.total_examples
            )));
        }

        let mut bytes = Vec::new();
        for rec in records {
            bytes.extend_from_slice(rec.to_canonical_line()?.as_bytes());
            bytes.push(b'\n');
        }

        let key = data_key(new.id);
        let draft = DatasetDraft {
            id: new.id,
            name: new.name,
            training_objective: new.training_objective,
            origin: new.origin,
            field_mapping: new.field_mapping,
            percentages: new.percentages,
            content: ContentDigest {
                data_key: key.clone(),
                dataset_hash: hex::encode(blake3::hash(&bytes).as_bytes()),
                size_bytes: bytes.len() as u64,
            },
        };
        let dataset = assemble(validation, draft)?;

        let rec_bytes =
            serde_json::to_vec(&dataset).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let rec_key = record_key(dataset.id);
        self.storage.put(&key, &bytes)?;
        let written = self
            .storage
            .put(&rec_key, &rec_bytes)
            .and_then(|()| self.add_to_index(dataset.id));
        if let Err(e) = written {
            // data, record and index entry land together or not at all
            for k in [&rec_key, &key] {
                if let Err(del) = self.storage.delete(k) {
                    warn!(key = %k, error = %del, "rollback delete failed");
                }
            }
            return Err(e);
        }

        info!(
            dataset_id = %dataset.id,
            name = %dataset.name,
            examples = dataset.total_examples,
            hash = %dataset.dataset_hash,
            "dataset committed"
        );
        Ok(dataset)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Dataset>> {
        match self.storage.get(&record_key(id))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<Dataset>> {
        let mut out = Vec::new();
        for id in self.index()? {
            match self.get(id)? {
                Some(ds) => out.push(ds),
                None => debug!(dataset_id = %id, "index entry without record"),
            }
        }
        Ok(out)
    }

    /// Names compare trimmed and case-insensitively.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Dataset>> {
        let wanted = name.trim();
        Ok(self
            .list()?
            .into_iter()
            .find(|ds| ds.name.eq_ignore_ascii_case(wanted)))
    }

    /// Reads the canonical records back and checks them against the stored hash.
    pub fn read_canonical(&self, id: Uuid) -> Result<Vec<Record>> {
        let ds = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        let bytes = self
            .storage
            .get(&ds.data_key)?
            .ok_or_else(|| StoreError::Inconsistent(format!("missing data for dataset {id}")))?;

        let actual = hex::encode(blake3::hash(&bytes).as_bytes());
        if actual != ds.dataset_hash {
            return Err(StoreError::HashMismatch {
                id,
                expected: ds.dataset_hash,
                actual,
            });
        }

        let text = String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        text.lines()
            .filter(|l| !l.is_empty())
            .map(|l| Record::parse_canonical(l).map_err(StoreError::from))
            .collect()
    }

    fn index(&self) -> Result<Vec<Uuid>> {
        match self.storage.get(KEY_DATASET_INDEX)? {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            None => Ok(vec![]),
        }
    }

    fn add_to_index(&mut self, id: Uuid) -> Result<()> {
        let mut ids = self.index()?;
        if !ids.contains(&id) {
            ids.push(id);
            let bytes =
                serde_json::to_vec(&ids).map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.storage.put(KEY_DATASET_INDEX, &bytes)?;
        }
        Ok(())
    }
}
