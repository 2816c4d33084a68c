//! Scene handlers
//!
//! Per-scene fingerprint views and edits, plus the filtered scene query.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use scenedb_core::{
    Fingerprint, FingerprintEdit, FingerprintInput, QueryResult, QuerySpec, Scene, SceneFilter,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fingerprints::FingerprintView;
use crate::auth::{Actor, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Response for GET /scenes/{id}/fingerprints
#[derive(Debug, Serialize)]
pub struct SceneFingerprintsResponse {
    pub scene_id: Uuid,
    pub fingerprints: Vec<FingerprintView>,
}

/// GET /scenes/{id}/fingerprints
///
/// The scene's consensus view, records in creation order.
pub async fn get_scene_fingerprints_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(scene_id): Path<Uuid>,
) -> Result<Json<SceneFingerprintsResponse>, ApiError> {
    actor.require(Role::Read)?;

    let records = state.engine.scene_fingerprints(scene_id).await?;

    Ok(Json(SceneFingerprintsResponse {
        scene_id,
        fingerprints: records
            .iter()
            .map(|record| FingerprintView::new(record, actor.user_id))
            .collect(),
    }))
}

/// One entry of the desired fingerprint set.
#[derive(Debug, Deserialize)]
pub struct FingerprintEditRequest {
    pub algorithm: String,
    pub hash: String,
    pub duration: u32,
    /// Credit these users instead of the caller (ADMIN only)
    #[serde(default)]
    pub user_ids: Option<Vec<Uuid>>,
}

/// Request body for PUT /scenes/{id}/fingerprints
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub fingerprints: Vec<FingerprintEditRequest>,
}

/// Response for PUT /scenes/{id}/fingerprints
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub scene_id: Uuid,
    pub added: usize,
    pub kept: usize,
    pub removed: usize,
    /// Kept fingerprints that gained explicit submitters
    pub corroborated: usize,
    pub fingerprints: Vec<FingerprintView>,
}

/// PUT /scenes/{id}/fingerprints
///
/// Replaces the scene's fingerprint set. Records that stay keep their
/// submitters; new ones are credited to the caller or to `user_ids`.
pub async fn reconcile_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(scene_id): Path<Uuid>,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let Json(request) = payload?;

    actor.require(Role::Modify)?;
    if request.fingerprints.iter().any(|fp| fp.user_ids.is_some()) {
        actor.require(Role::Admin)?;
    }

    let desired = request
        .fingerprints
        .into_iter()
        .map(|fp| {
            Ok(FingerprintEdit {
                input: FingerprintInput::new(
                    Fingerprint::parse(&fp.algorithm, &fp.hash)?,
                    fp.duration,
                ),
                user_ids: fp.user_ids,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let result = state
        .engine
        .reconcile(scene_id, desired, actor.user_id)
        .await?;

    Ok(Json(ReconcileResponse {
        scene_id,
        added: result.summary.added,
        kept: result.summary.kept,
        removed: result.summary.removed,
        corroborated: result.summary.corroborated,
        fingerprints: result
            .records
            .iter()
            .map(|record| FingerprintView::new(record, actor.user_id))
            .collect(),
    }))
}

/// Request body for POST /scenes/query
///
/// `page` and `per_page` sit next to `filter` at the top level.
#[derive(Debug, Default, Deserialize)]
pub struct QueryScenesRequest {
    #[serde(default)]
    pub filter: SceneFilter,
    #[serde(flatten)]
    pub spec: QuerySpec,
}

/// POST /scenes/query
pub async fn query_scenes_handler(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<QueryScenesRequest>, JsonRejection>,
) -> Result<Json<QueryResult<Scene>>, ApiError> {
    let Json(request) = payload?;
    actor.require(Role::Read)?;

    let result = state
        .queries
        .query_scenes(&request.filter, &request.spec)
        .await?;

    Ok(Json(result))
}
