use std::sync::Arc;

use datastore::{DatasetStore, FileBackedStorage};
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::hub::HubClient;
use crate::imports::ImportRegistry;
use crate::resolver::Resolver;

pub type SharedState = Arc<AppState>;
pub type SharedStore = Arc<RwLock<DatasetStore<FileBackedStorage>>>;

pub struct AppState {
    pub config: AppConfig,
    pub store: SharedStore,
    pub resolver: Resolver,
    pub imports: ImportRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, hub: Arc<dyn HubClient>) -> anyhow::Result<Self> {
        let storage = FileBackedStorage::new(&config.data_dir)?;
        Ok(Self {
            resolver: Resolver::new(hub, config.preview_chars),
            store: Arc::new(RwLock::new(DatasetStore::new(storage))),
            imports: ImportRegistry::default(),
            config,
        })
    }
}
