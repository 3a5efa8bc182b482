//! Persistence of canonical training datasets.
//!
//! Each dataset is stored as a canonical JSONL file plus a JSON record whose
//! BLAKE3 hash pins the file contents.

mod storage;
mod store;

pub use storage::{FileBackedStorage, InMemoryStorage, Storage};
pub use store::{data_key, record_key, DatasetStore, NewDataset, KEY_DATASET_INDEX};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("A dataset named '{name}' already exists ({existing})")]
    DuplicateName { name: String, existing: Uuid },

    #[error("Dataset not found: {0}")]
    NotFound(Uuid),

    #[error("Inconsistent dataset: {0}")]
    Inconsistent(String),

    #[error("Dataset {id} content hash mismatch (expected {expected}, found {actual})")]
    HashMismatch {
        id: Uuid,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Dataset(#[from] datasets::DatasetError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
