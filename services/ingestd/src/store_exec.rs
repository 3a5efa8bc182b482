//! Dataset store access from async handlers. File-backed storage does blocking
//! IO, so every call runs on the blocking pool.

use datastore::{DatasetStore, FileBackedStorage, StoreError};
use tokio::task::JoinError;

use crate::state::SharedStore;

type Store = DatasetStore<FileBackedStorage>;

/// Runs `f` under the store's read lock.
pub async fn read_store<R, E, F>(store: &SharedStore, f: F) -> Result<R, E>
where
    R: Send + 'static,
    E: From<StoreError> + From<JoinError>,
    F: FnOnce(&Store) -> Result<R, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store.blocking_read()))
        .await?
        .map_err(E::from)
}

/// Runs `f` under the store's write lock; commits go through here.
pub async fn write_store<R, E, F>(store: &SharedStore, f: F) -> Result<R, E>
where
    R: Send + 'static,
    E: From<StoreError> + From<JoinError>,
    F: FnOnce(&mut Store) -> Result<R, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&mut store.blocking_write()))
        .await?
        .map_err(E::from)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    use super::*;
    use crate::error::ApiError;
    use crate::imports::ImportError;

    fn store(dir: &tempfile::TempDir) -> SharedStore {
        let storage = FileBackedStorage::new(dir.path()).unwrap();
        Arc::new(RwLock::new(DatasetStore::new(storage)))
    }

    #[tokio::test]
    async fn store_errors_keep_their_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let listed: Vec<_> = read_store::<_, ApiError, _>(&store, |s| s.list()).await.unwrap();
        assert!(listed.is_empty());

        let id = Uuid::new_v4();
        let err = read_store::<(), ApiError, _>(&store, move |_| Err(StoreError::NotFound(id)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = write_store::<(), ImportError, _>(&store, |_| {
            Err(StoreError::Storage("disk full".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ImportError::Store(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn panicking_task_becomes_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let err = write_store::<(), ApiError, _>(&store, |_| panic!("boom"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = read_store::<(), ImportError, _>(&store, |_| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Join(_)));

        // the lock is not poisoned by the panic
        assert!(read_store::<_, ApiError, _>(&store, |s| s.list()).await.is_ok());
    }
}
