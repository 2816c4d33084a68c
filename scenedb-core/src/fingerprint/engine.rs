//! Consensus engine: the only entry point that mutates fingerprint records.
//!
//! Every read-modify-write of a scene's collection runs while holding that
//! scene's async mutex, so concurrent submits and unmatches on one scene are
//! linearized while different scenes proceed in parallel. Lock entries live in
//! a `DashMap` and are dropped again once no task holds or awaits them.
//! The load and the save of one cycle share a store transaction, which is how
//! writers in other processes are kept out.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    Fingerprint, FingerprintAlgorithm, FingerprintEdit, FingerprintInput, FingerprintRecord,
    ReconcileSummary, SceneFingerprints, SubmitOutcome, UnmatchOutcome,
};
use crate::error::{CatalogError, Result};
use crate::store::{FingerprintStore, SceneTransaction};

/// A request to corroborate a fingerprint on a scene.
#[derive(Debug, Clone)]
pub struct Submission {
    pub scene_id: Uuid,
    pub fingerprint: FingerprintInput,
    pub acting_user: Uuid,
    /// Submit on behalf of exactly these users instead of `acting_user`
    pub user_ids: Option<Vec<Uuid>>,
}

/// A request to withdraw corroboration of a fingerprint on a scene.
#[derive(Debug, Clone)]
pub struct Retraction {
    pub scene_id: Uuid,
    pub fingerprint: Fingerprint,
    pub acting_user: Uuid,
    /// Retract these users instead of `acting_user`
    pub user_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub outcome: SubmitOutcome,
    pub record: FingerprintRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchResult {
    pub outcome: UnmatchOutcome,
    /// The surviving record, `None` once deleted or if it never existed
    pub record: Option<FingerprintRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    pub summary: ReconcileSummary,
    /// The scene's records after the reconcile, in creation order
    pub records: Vec<FingerprintRecord>,
}

/// One scene's live record for a looked-up fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub scene_id: Uuid,
    pub record: FingerprintRecord,
}

impl FingerprintMatch {
    /// Corroboration count on this scene only.
    pub fn submissions(&self) -> usize {
        self.record.submissions()
    }
}

type LockTable = DashMap<Uuid, Arc<Mutex<()>>>;

/// Exclusive hold on one scene. Releasing it reclaims the table entry when
/// nobody else is waiting on the same mutex.
struct SceneLease<'a> {
    locks: &'a LockTable,
    scene_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for SceneLease<'_> {
    fn drop(&mut self) {
        // One reference in the table, one in our guard.
        self.locks
            .remove_if(&self.scene_id, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// A locked scene with its collection loaded inside a store transaction.
struct OpenScene<'a> {
    _lease: SceneLease<'a>,
    tx: Box<dyn SceneTransaction + 'a>,
    fingerprints: SceneFingerprints,
}

impl OpenScene<'_> {
    async fn save(self) -> Result<SceneFingerprints> {
        let OpenScene {
            _lease,
            mut tx,
            fingerprints,
        } = self;
        tx.save(fingerprints.records()).await?;
        tx.commit().await?;
        Ok(fingerprints)
    }
}

pub struct ConsensusEngine {
    store: Arc<dyn FingerprintStore>,
    locks: LockTable,
}

impl ConsensusEngine {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    /// Number of scenes currently locked or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    async fn lease(&self, scene_id: Uuid) -> SceneLease<'_> {
        let lock = self.locks.entry(scene_id).or_default().value().clone();
        let guard = lock.lock_owned().await;
        SceneLease {
            locks: &self.locks,
            scene_id,
            _guard: guard,
        }
    }

    /// Lock the scene and load its collection, failing if the scene is unknown.
    async fn open(&self, scene_id: Uuid) -> Result<OpenScene<'_>> {
        let lease = self.lease(scene_id).await;
        if !self.store.scene_exists(scene_id).await? {
            return Err(CatalogError::SceneNotFound(scene_id));
        }
        let mut tx = self.store.scene_transaction(scene_id);
        let records = tx.load().await?;
        Ok(OpenScene {
            _lease: lease,
            tx,
            fingerprints: SceneFingerprints::from_records(records),
        })
    }

    /// Add the submitting users to the fingerprint's record, creating it if needed.
    ///
    /// Resubmission by users already present is a no-op and performs no write.
    pub async fn submit(&self, submission: Submission) -> Result<SubmitResult> {
        let Submission {
            scene_id,
            fingerprint,
            acting_user,
            user_ids,
        } = submission;
        let users = resolve_users(acting_user, user_ids.as_deref())?;

        let mut scene = self.open(scene_id).await?;
        let now = Utc::now();
        let (outcome, record) = scene.fingerprints.submit(&fingerprint, &users, now)?;
        let record = record.clone();

        if outcome.is_change() {
            scene.save().await?;
        }

        match outcome {
            SubmitOutcome::Created => tracing::info!(
                %scene_id,
                fingerprint = %record.fingerprint,
                submissions = record.submissions(),
                "Fingerprint created"
            ),
            _ => tracing::debug!(
                %scene_id,
                fingerprint = %record.fingerprint,
                ?outcome,
                submissions = record.submissions(),
                "Fingerprint submitted"
            ),
        }

        Ok(SubmitResult { outcome, record })
    }

    /// Remove the users' corroboration, deleting the record once nobody is left.
    ///
    /// Unmatching a pair the scene has no record for is a no-op.
    pub async fn unmatch(&self, retraction: Retraction) -> Result<UnmatchResult> {
        let Retraction {
            scene_id,
            fingerprint,
            acting_user,
            user_ids,
        } = retraction;
        let users = resolve_users(acting_user, user_ids.as_deref())?;

        let mut scene = self.open(scene_id).await?;
        let outcome = scene.fingerprints.retract(&fingerprint, &users, Utc::now());

        let fingerprints = if outcome.is_change() {
            scene.save().await?
        } else {
            scene.fingerprints
        };

        match outcome {
            UnmatchOutcome::Removed => {
                tracing::info!(%scene_id, %fingerprint, "Fingerprint removed")
            }
            _ => tracing::debug!(%scene_id, %fingerprint, ?outcome, "Fingerprint unmatched"),
        }

        Ok(UnmatchResult {
            outcome,
            record: fingerprints.get(&fingerprint).cloned(),
        })
    }

    /// Replace the scene's fingerprint set with `desired`, keeping the
    /// submitters of records that stay.
    pub async fn reconcile(
        &self,
        scene_id: Uuid,
        desired: Vec<FingerprintEdit>,
        acting_user: Uuid,
    ) -> Result<ReconcileResult> {
        if desired
            .iter()
            .any(|edit| edit.user_ids.as_ref().is_some_and(Vec::is_empty))
        {
            return Err(CatalogError::EmptySubmitters);
        }

        let mut scene = self.open(scene_id).await?;
        let summary = scene
            .fingerprints
            .reconcile(&desired, acting_user, Utc::now())?;

        let fingerprints = if summary.is_change() {
            let fingerprints = scene.save().await?;
            tracing::info!(
                %scene_id,
                added = summary.added,
                kept = summary.kept,
                removed = summary.removed,
                corroborated = summary.corroborated,
                "Scene fingerprints reconciled"
            );
            fingerprints
        } else {
            scene.fingerprints
        };

        Ok(ReconcileResult {
            summary,
            records: fingerprints.into_records(),
        })
    }

    /// A scene's live records in creation order.
    pub async fn scene_fingerprints(&self, scene_id: Uuid) -> Result<Vec<FingerprintRecord>> {
        if !self.store.scene_exists(scene_id).await? {
            return Err(CatalogError::SceneNotFound(scene_id));
        }
        let records = self.store.load_fingerprints(scene_id).await?;
        Ok(SceneFingerprints::from_records(records).into_records())
    }

    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<FingerprintMatch>> {
        self.find_by_fingerprints(std::slice::from_ref(fingerprint))
            .await
    }

    /// Every scene holding any of `fingerprints`, each match with its own count.
    ///
    /// Scenes come back in creation order; within a scene, records keep their
    /// creation order.
    pub async fn find_by_fingerprints(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<FingerprintMatch>> {
        if fingerprints.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: BTreeSet<&Fingerprint> = fingerprints.iter().collect();
        let scenes = self.store.find_scenes_by_fingerprints(fingerprints).await?;
        self.collect_matches(scenes, |record| wanted.contains(&record.fingerprint))
            .await
    }

    /// Like [`find_by_fingerprints`](Self::find_by_fingerprints) but matching
    /// on hash alone, across all algorithms.
    pub async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<FingerprintMatch>> {
        let normalized = hashes
            .iter()
            .map(String::as_str)
            .map(normalize_any_hash)
            .collect::<Result<BTreeSet<String>>>()?;
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let lookup: Vec<String> = normalized.iter().cloned().collect();
        let scenes = self.store.find_scenes_by_hashes(&lookup).await?;
        self.collect_matches(scenes, |record| normalized.contains(record.hash()))
            .await
    }

    async fn collect_matches(
        &self,
        scenes: Vec<Uuid>,
        keep: impl Fn(&FingerprintRecord) -> bool,
    ) -> Result<Vec<FingerprintMatch>> {
        let mut matches = Vec::new();
        for scene_id in scenes {
            let records = self.store.load_fingerprints(scene_id).await?;
            matches.extend(
                SceneFingerprints::from_records(records)
                    .into_records()
                    .into_iter()
                    .filter(|record| keep(record))
                    .map(|record| FingerprintMatch { scene_id, record }),
            );
        }
        tracing::debug!(matches = matches.len(), "Fingerprint lookup");
        Ok(matches)
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("active_locks", &self.locks.len())
            .finish()
    }
}

fn resolve_users(acting_user: Uuid, explicit: Option<&[Uuid]>) -> Result<BTreeSet<Uuid>> {
    match explicit {
        Some([]) => Err(CatalogError::EmptySubmitters),
        Some(ids) => Ok(ids.iter().copied().collect()),
        None => Ok(BTreeSet::from([acting_user])),
    }
}

/// Canonicalize a hash whose algorithm is unknown: lower-case hex of a
/// length some algorithm produces.
fn normalize_any_hash(raw: &str) -> Result<String> {
    let hash = raw.trim().to_ascii_lowercase();
    let invalid = |reason: String| CatalogError::InvalidHash {
        algorithm: "ANY",
        hash: raw.to_string(),
        reason,
    };

    if !FingerprintAlgorithm::ALL
        .iter()
        .any(|algorithm| algorithm.hash_len() == hash.len())
    {
        return Err(invalid(format!(
            "length {} matches no known algorithm",
            hash.len()
        )));
    }
    hex::decode(&hash).map_err(|e| invalid(e.to_string()))?;
    Ok(hash)
}
