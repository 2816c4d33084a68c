//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use scenedb_core::{ConsensusEngine, SceneQueryService};

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::store::Catalog;

/// Application state containing shared resources.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Consensus engine; the only writer of fingerprint records
    pub engine: Arc<ConsensusEngine>,
    /// Scene filter and pagination service
    pub queries: SceneQueryService,
    /// Underlying storage, kept for health reporting
    pub catalog: Catalog,
    /// Bearer token keys (every authenticated request fails when unset)
    pub jwt_keys: Option<JwtKeys>,
}

impl AppState {
    pub fn new(catalog: Catalog, config: &Config) -> Self {
        let engine = Arc::new(ConsensusEngine::new(catalog.fingerprints.clone()));
        let queries =
            SceneQueryService::new(catalog.scenes.clone()).with_max_per_page(config.max_per_page);

        let jwt_keys = config.jwt_secret.as_deref().map(JwtKeys::from_secret);
        if jwt_keys.is_none() {
            tracing::warn!("JWT_SECRET not set - authenticated endpoints will reject all requests");
        }

        Self {
            engine,
            queries,
            catalog,
            jwt_keys,
        }
    }
}
