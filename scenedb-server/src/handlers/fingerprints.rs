//! Fingerprint submission and lookup handlers
//!
//! Handles POST /fingerprints/submit (submit or unmatch) and
//! POST /fingerprints/lookup (find scenes by fingerprint or bare hash).

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::{DateTime, Utc};
use scenedb_core::{
    Fingerprint, FingerprintInput, FingerprintMatch, FingerprintRecord, Retraction, Submission,
    SubmitOutcome, UnmatchOutcome,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Actor, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Most fingerprints or hashes accepted by one lookup.
const MAX_LOOKUP_ITEMS: usize = 100;

/// A fingerprint record as seen by the requesting user.
#[derive(Debug, Serialize)]
pub struct FingerprintView {
    pub algorithm: &'static str,
    pub hash: String,
    /// First-seen duration in seconds
    pub duration: u32,
    /// Number of distinct users who corroborated this fingerprint
    pub submissions: usize,
    /// Whether the requesting user is one of them
    pub user_submitted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl FingerprintView {
    pub fn new(record: &FingerprintRecord, viewer: Uuid) -> Self {
        Self {
            algorithm: record.algorithm().as_str(),
            hash: record.hash().to_string(),
            duration: record.duration,
            submissions: record.submissions(),
            user_submitted: record.is_submitted_by(viewer),
            created: record.created,
            updated: record.updated,
        }
    }
}

/// Request body for POST /fingerprints/submit
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub scene_id: Uuid,
    /// `MD5`, `OSHASH` or `PHASH`
    pub algorithm: String,
    pub hash: String,
    /// Media duration in seconds; required unless unmatching
    #[serde(default)]
    pub duration: Option<u32>,
    /// Submit on behalf of these users (ADMIN only)
    #[serde(default)]
    pub user_ids: Option<Vec<Uuid>>,
    /// Withdraw instead of corroborate
    #[serde(default)]
    pub unmatch: bool,
}

/// Response for POST /fingerprints/submit
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// `created`, `corroborated`, `unchanged`, `retracted`, `removed` or `absent`
    pub outcome: &'static str,
    /// Whether the scene's fingerprints were modified
    pub changed: bool,
    /// The record after the operation, absent once deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintView>,
}

fn submit_outcome_name(outcome: SubmitOutcome) -> &'static str {
    match outcome {
        SubmitOutcome::Created => "created",
        SubmitOutcome::Corroborated { .. } => "corroborated",
        SubmitOutcome::Unchanged => "unchanged",
    }
}

fn unmatch_outcome_name(outcome: UnmatchOutcome) -> &'static str {
    match outcome {
        UnmatchOutcome::Retracted { .. } => "retracted",
        UnmatchOutcome::Removed => "removed",
        UnmatchOutcome::Unchanged => "unchanged",
        UnmatchOutcome::Absent => "absent",
    }
}

/// POST /fingerprints/submit
///
/// Corroborates a fingerprint on a scene, or withdraws the corroboration when
/// `unmatch` is set. Requires MODIFY; naming `user_ids` requires ADMIN.
pub async fn submit_handler(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;

    actor.require(Role::Modify)?;
    if request.user_ids.is_some() {
        actor.require(Role::Admin)?;
    }

    let fingerprint = Fingerprint::parse(&request.algorithm, &request.hash)?;

    if request.unmatch {
        let result = state
            .engine
            .unmatch(Retraction {
                scene_id: request.scene_id,
                fingerprint,
                acting_user: actor.user_id,
                user_ids: request.user_ids,
            })
            .await?;

        return Ok(Json(SubmitResponse {
            outcome: unmatch_outcome_name(result.outcome),
            changed: result.outcome.is_change(),
            fingerprint: result
                .record
                .as_ref()
                .map(|record| FingerprintView::new(record, actor.user_id)),
        }));
    }

    let duration = request
        .duration
        .ok_or_else(|| ApiError::bad_request("duration is required when submitting"))?;

    let result = state
        .engine
        .submit(Submission {
            scene_id: request.scene_id,
            fingerprint: FingerprintInput::new(fingerprint, duration),
            acting_user: actor.user_id,
            user_ids: request.user_ids,
        })
        .await?;

    Ok(Json(SubmitResponse {
        outcome: submit_outcome_name(result.outcome),
        changed: result.outcome.is_change(),
        fingerprint: Some(FingerprintView::new(&result.record, actor.user_id)),
    }))
}

/// One fingerprint in a lookup request.
#[derive(Debug, Deserialize)]
pub struct FingerprintQuery {
    pub algorithm: String,
    pub hash: String,
}

/// Request body for POST /fingerprints/lookup
///
/// Exactly one of `fingerprints` or `hashes` must be non-empty.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub fingerprints: Vec<FingerprintQuery>,
    /// Bare hashes matched across every algorithm
    #[serde(default)]
    pub hashes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LookupMatch {
    pub scene_id: Uuid,
    pub fingerprint: FingerprintView,
}

/// Response for POST /fingerprints/lookup
#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub found: bool,
    pub count: usize,
    pub matches: Vec<LookupMatch>,
}

/// POST /fingerprints/lookup
///
/// Returns every live record matching the request, one entry per scene and
/// fingerprint, each carrying that scene's own corroboration count.
pub async fn lookup_handler(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<LookupResponse>, ApiError> {
    let Json(request) = payload?;
    actor.require(Role::Read)?;

    let matches: Vec<FingerprintMatch> =
        match (request.fingerprints.is_empty(), request.hashes.is_empty()) {
            (false, true) => {
                if request.fingerprints.len() > MAX_LOOKUP_ITEMS {
                    return Err(ApiError::bad_request(format!(
                        "At most {} fingerprints per lookup",
                        MAX_LOOKUP_ITEMS
                    )));
                }
                let fingerprints = request
                    .fingerprints
                    .iter()
                    .map(|fp| Fingerprint::parse(&fp.algorithm, &fp.hash))
                    .collect::<Result<Vec<_>, _>>()?;
                state.engine.find_by_fingerprints(&fingerprints).await?
            }
            (true, false) => {
                if request.hashes.len() > MAX_LOOKUP_ITEMS {
                    return Err(ApiError::bad_request(format!(
                        "At most {} hashes per lookup",
                        MAX_LOOKUP_ITEMS
                    )));
                }
                state.engine.find_by_hashes(&request.hashes).await?
            }
            (true, true) => {
                return Err(ApiError::bad_request(
                    "Either 'fingerprints' or 'hashes' must be provided",
                ))
            }
            (false, false) => {
                return Err(ApiError::bad_request(
                    "Provide 'fingerprints' or 'hashes', not both",
                ))
            }
        };

    tracing::debug!(
        user_id = %actor.user_id,
        matches = matches.len(),
        "Fingerprint lookup"
    );

    let matches: Vec<LookupMatch> = matches
        .iter()
        .map(|m| LookupMatch {
            scene_id: m.scene_id,
            fingerprint: FingerprintView::new(&m.record, actor.user_id),
        })
        .collect();

    Ok(Json(LookupResponse {
        found: !matches.is_empty(),
        count: matches.len(),
        matches,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_view_marks_viewer_submission() {
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();
        let record = FingerprintRecord::from_parts(
            Fingerprint::parse("OSHASH", "00FF00FF00FF00FF").unwrap(),
            1200,
            BTreeSet::from([viewer, other]),
            now,
            now,
        )
        .unwrap();

        let view = FingerprintView::new(&record, viewer);
        assert_eq!(view.algorithm, "OSHASH");
        assert_eq!(view.submissions, 2);
        assert!(view.user_submitted);
        assert!(!FingerprintView::new(&record, Uuid::new_v4()).user_submitted);
    }

    #[test]
    fn test_submit_request_defaults() {
        let request: SubmitRequest = serde_json::from_value(serde_json::json!({
            "scene_id": Uuid::nil(),
            "algorithm": "MD5",
            "hash": "d41d8cd98f00b204e9800998ecf8427e",
        }))
        .unwrap();
        assert!(!request.unmatch);
        assert!(request.duration.is_none());
        assert!(request.user_ids.is_none());
    }
}
