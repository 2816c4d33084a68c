//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod fingerprints;
pub mod health;
pub mod scenes;

pub use crate::state::AppState;
pub use fingerprints::{
    lookup_handler, submit_handler, FingerprintView, LookupMatch, LookupRequest, LookupResponse,
    SubmitRequest, SubmitResponse,
};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use scenes::{
    get_scene_fingerprints_handler, query_scenes_handler, reconcile_handler, QueryScenesRequest,
    ReconcileRequest, ReconcileResponse, SceneFingerprintsResponse,
};
