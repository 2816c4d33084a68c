//! Content fingerprints and their per-scene consensus records.
//!
//! A fingerprint is an `(algorithm, hash)` pair identifying media content
//! independently of editorial metadata. Each scene holds at most one
//! [`FingerprintRecord`] per pair; the record's submitter set is the only
//! source of corroboration strength.
//!
//! - [`SceneFingerprints`] owns one scene's records and enforces the
//!   uniqueness and non-empty invariants without any I/O.
//! - [`ConsensusEngine`] runs submit/unmatch/reconcile against a
//!   [`FingerprintStore`](crate::store::FingerprintStore) under a per-scene
//!   exclusive section.

mod collection;
mod engine;

pub use collection::{
    FingerprintEdit, ReconcileSummary, SceneFingerprints, SubmitOutcome, UnmatchOutcome,
};
pub use engine::{
    ConsensusEngine, FingerprintMatch, ReconcileResult, Retraction, Submission, SubmitResult,
    UnmatchResult,
};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CatalogError, Result};

/// Supported fingerprint hash families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerprintAlgorithm {
    /// MD5 of the whole file (32 hex chars)
    Md5,
    /// OpenSubtitles hash (16 hex chars)
    Oshash,
    /// 64-bit perceptual hash of sampled frames (16 hex chars)
    Phash,
}

impl FingerprintAlgorithm {
    pub const ALL: [Self; 3] = [Self::Md5, Self::Oshash, Self::Phash];

    /// Wire identifier, e.g. `"PHASH"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Oshash => "OSHASH",
            Self::Phash => "PHASH",
        }
    }

    /// Number of hex characters a digest of this family has.
    pub fn hash_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Oshash | Self::Phash => 16,
        }
    }

    /// Validate a raw digest and return it in canonical (lower-case) form.
    pub fn normalize_hash(self, raw: &str) -> Result<String> {
        let hash = raw.trim().to_ascii_lowercase();
        let invalid = |reason: String| CatalogError::InvalidHash {
            algorithm: self.as_str(),
            hash: raw.to_string(),
            reason,
        };

        if hash.len() != self.hash_len() {
            return Err(invalid(format!(
                "expected {} hex characters, got {}",
                self.hash_len(),
                hash.len()
            )));
        }

        hex::decode(&hash).map_err(|e| invalid(e.to_string()))?;

        Ok(hash)
    }
}

impl fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintAlgorithm {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == s)
            .ok_or_else(|| CatalogError::UnknownAlgorithm(s.to_string()))
    }
}

/// A validated `(algorithm, hash)` pair: the identity of a record within a scene.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fingerprint {
    algorithm: FingerprintAlgorithm,
    hash: String,
}

impl Fingerprint {
    /// Build a fingerprint, validating the digest format for `algorithm`.
    pub fn new(algorithm: FingerprintAlgorithm, hash: &str) -> Result<Self> {
        let hash = algorithm.normalize_hash(hash)?;
        Ok(Self { algorithm, hash })
    }

    /// Parse both parts from their wire form.
    pub fn parse(algorithm: &str, hash: &str) -> Result<Self> {
        Self::new(algorithm.parse()?, hash)
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hash)
    }
}

/// A fingerprint as submitted by a client, with its informational duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintInput {
    pub fingerprint: Fingerprint,
    /// Media duration in seconds
    pub duration: u32,
}

impl FingerprintInput {
    pub fn new(fingerprint: Fingerprint, duration: u32) -> Self {
        Self {
            fingerprint,
            duration,
        }
    }
}

/// A live fingerprint record on one scene.
///
/// The submitter set is never empty; a record whose last submitter is
/// retracted is deleted by [`SceneFingerprints`] instead of being kept empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub fingerprint: Fingerprint,
    /// First-seen duration in seconds; later submissions never overwrite it
    pub duration: u32,
    submitters: BTreeSet<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl FingerprintRecord {
    /// Rebuild a record from persisted parts.
    ///
    /// Fails with [`CatalogError::EmptySubmitters`] for an empty submitter set.
    pub fn from_parts(
        fingerprint: Fingerprint,
        duration: u32,
        submitters: BTreeSet<Uuid>,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) -> Result<Self> {
        if submitters.is_empty() {
            return Err(CatalogError::EmptySubmitters);
        }
        Ok(Self {
            fingerprint,
            duration,
            submitters,
            created,
            updated,
        })
    }

    pub(crate) fn create(
        input: &FingerprintInput,
        submitters: BTreeSet<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        debug_assert!(!submitters.is_empty());
        Self {
            fingerprint: input.fingerprint.clone(),
            duration: input.duration,
            submitters,
            created: now,
            updated: now,
        }
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.fingerprint.algorithm()
    }

    pub fn hash(&self) -> &str {
        self.fingerprint.hash()
    }

    pub fn submitters(&self) -> &BTreeSet<Uuid> {
        &self.submitters
    }

    /// Corroboration count, always derived from the submitter set.
    pub fn submissions(&self) -> usize {
        self.submitters.len()
    }

    /// Whether `user_id` has corroborated this record.
    pub fn is_submitted_by(&self, user_id: Uuid) -> bool {
        self.submitters.contains(&user_id)
    }

    /// Union `users` into the submitter set, returning how many were new.
    pub(crate) fn add_submitters(&mut self, users: &BTreeSet<Uuid>, now: DateTime<Utc>) -> usize {
        let before = self.submitters.len();
        self.submitters.extend(users.iter().copied());
        let added = self.submitters.len() - before;
        if added > 0 {
            self.updated = now;
        }
        added
    }

    /// Remove `users` from the submitter set, returning how many were present.
    ///
    /// May leave the set empty; the owning collection must then drop the record.
    pub(crate) fn remove_submitters(
        &mut self,
        users: &BTreeSet<Uuid>,
        now: DateTime<Utc>,
    ) -> usize {
        let before = self.submitters.len();
        self.submitters.retain(|id| !users.contains(id));
        let removed = before - self.submitters.len();
        if removed > 0 {
            self.updated = now;
        }
        removed
    }

    pub(crate) fn has_submitters(&self) -> bool {
        !self.submitters.is_empty()
    }
}
