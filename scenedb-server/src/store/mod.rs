//! Catalog storage selection
//!
//! Uses PostgreSQL when `DATABASE_URL` is set, otherwise falls back to the
//! in-memory catalog (useful for development, but data is lost on restart).

mod postgres;

pub use postgres::PostgresCatalog;

use std::sync::Arc;

use scenedb_core::{FingerprintStore, MemoryCatalog, SceneStore, StoreError};

use crate::config::Config;

/// Both storage roles, backed by the same catalog.
#[derive(Clone)]
pub struct Catalog {
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub scenes: Arc<dyn SceneStore>,
    persistent: bool,
}

impl Catalog {
    /// Wrap a store that implements both roles.
    pub fn new<C>(store: Arc<C>, persistent: bool) -> Self
    where
        C: FingerprintStore + SceneStore + 'static,
    {
        Self {
            fingerprints: store.clone(),
            scenes: store,
            persistent,
        }
    }

    /// Create a catalog with PostgreSQL backend
    pub async fn with_postgres(config: &Config, database_url: &str) -> Result<Self, StoreError> {
        let store = PostgresCatalog::connect(
            database_url,
            config.database_max_connections,
            config.database_min_connections,
        )
        .await?;
        Ok(Self::new(Arc::new(store), true))
    }

    /// Create a catalog with in-memory backend (development only)
    pub fn in_memory(catalog: Arc<MemoryCatalog>) -> Self {
        tracing::warn!("Using in-memory catalog - fingerprints will be lost on restart!");
        Self::new(catalog, false)
    }

    /// Create the catalog from configuration
    ///
    /// Uses PostgreSQL if `DATABASE_URL` is set, otherwise falls back to in-memory.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("Using PostgreSQL catalog storage");
                Self::with_postgres(config, url).await
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                Ok(Self::in_memory(Arc::new(MemoryCatalog::new())))
            }
        }
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("persistent", &self.persistent)
            .finish()
    }
}
