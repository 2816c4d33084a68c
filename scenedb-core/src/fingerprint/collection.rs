//! Per-scene fingerprint collection.
//!
//! Pure data and invariant enforcement: `(algorithm, hash)` is unique within
//! the collection, every record has at least one submitter, and records keep
//! their creation order.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Fingerprint, FingerprintInput, FingerprintRecord};
use crate::error::{CatalogError, Result};

/// What a submit did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new record was created for the pair
    Created,
    /// The existing record gained `added` submitters
    Corroborated { added: usize },
    /// Every submitter was already present
    Unchanged,
}

impl SubmitOutcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// What an unmatch did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchOutcome {
    /// `removed` submitters were retracted and the record survives
    Retracted { removed: usize },
    /// The last submitters were retracted and the record was deleted
    Removed,
    /// None of the given users had submitted the record
    Unchanged,
    /// No record exists for the pair
    Absent,
}

impl UnmatchOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Retracted { .. } | Self::Removed)
    }
}

/// One entry of a desired fingerprint set for [`SceneFingerprints::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintEdit {
    pub input: FingerprintInput,
    /// Explicit submitters; `None` credits the acting user on creation
    pub user_ids: Option<Vec<Uuid>>,
}

/// Counts of what a reconcile changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub kept: usize,
    pub removed: usize,
    /// Kept records that gained explicit submitters
    pub corroborated: usize,
}

impl ReconcileSummary {
    pub fn is_change(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.corroborated > 0
    }
}

/// All live fingerprint records of one scene, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneFingerprints {
    records: Vec<FingerprintRecord>,
}

impl SceneFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from stored records.
    ///
    /// Records repeating an earlier pair are merged into it (submitters
    /// unioned, first duration kept), so a collection never holds duplicates
    /// even if its source did.
    pub fn from_records(records: impl IntoIterator<Item = FingerprintRecord>) -> Self {
        let mut merged: Vec<FingerprintRecord> = Vec::new();
        for record in records {
            match merged
                .iter_mut()
                .find(|existing| existing.fingerprint == record.fingerprint)
            {
                Some(existing) => {
                    existing.add_submitters(record.submitters(), record.updated);
                }
                None if record.has_submitters() => merged.push(record),
                None => {}
            }
        }
        Self { records: merged }
    }

    pub fn records(&self) -> &[FingerprintRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FingerprintRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&FingerprintRecord> {
        self.records.iter().find(|r| &r.fingerprint == fingerprint)
    }

    fn position(&self, fingerprint: &Fingerprint) -> Option<usize> {
        self.records
            .iter()
            .position(|r| &r.fingerprint == fingerprint)
    }

    /// Union `submitters` into the record for `input`, creating it if needed.
    ///
    /// An existing record keeps its original duration. Returns the outcome
    /// and the record as it now stands.
    pub fn submit(
        &mut self,
        input: &FingerprintInput,
        submitters: &BTreeSet<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(SubmitOutcome, &FingerprintRecord)> {
        if submitters.is_empty() {
            return Err(CatalogError::EmptySubmitters);
        }

        match self.position(&input.fingerprint) {
            Some(index) => {
                let added = self.records[index].add_submitters(submitters, now);
                let outcome = if added == 0 {
                    SubmitOutcome::Unchanged
                } else {
                    SubmitOutcome::Corroborated { added }
                };
                Ok((outcome, &self.records[index]))
            }
            None => {
                self.records
                    .push(FingerprintRecord::create(input, submitters.clone(), now));
                let index = self.records.len() - 1;
                Ok((SubmitOutcome::Created, &self.records[index]))
            }
        }
    }

    /// Remove `users` from the record for `fingerprint`, deleting it once empty.
    pub fn retract(
        &mut self,
        fingerprint: &Fingerprint,
        users: &BTreeSet<Uuid>,
        now: DateTime<Utc>,
    ) -> UnmatchOutcome {
        let Some(index) = self.position(fingerprint) else {
            return UnmatchOutcome::Absent;
        };

        let removed = self.records[index].remove_submitters(users, now);
        if removed == 0 {
            UnmatchOutcome::Unchanged
        } else if self.records[index].has_submitters() {
            UnmatchOutcome::Retracted { removed }
        } else {
            self.records.remove(index);
            UnmatchOutcome::Removed
        }
    }

    /// Replace the collection with `desired`, preserving corroboration.
    ///
    /// Records absent from `desired` are dropped. Records present in both keep
    /// their submitters, unioned with the entry's explicit `user_ids`. New
    /// entries are created with their explicit `user_ids`, or with
    /// `acting_user` when none are given. Validation happens before any change.
    pub fn reconcile(
        &mut self,
        desired: &[FingerprintEdit],
        acting_user: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary> {
        if desired
            .iter()
            .any(|edit| edit.user_ids.as_ref().is_some_and(|ids| ids.is_empty()))
        {
            return Err(CatalogError::EmptySubmitters);
        }

        let wanted: BTreeSet<&Fingerprint> =
            desired.iter().map(|edit| &edit.input.fingerprint).collect();

        let before = self.records.len();
        self.records.retain(|r| wanted.contains(&r.fingerprint));
        let mut summary = ReconcileSummary {
            removed: before - self.records.len(),
            ..Default::default()
        };

        let mut seen: BTreeSet<&Fingerprint> = BTreeSet::new();
        for edit in desired {
            let is_first = seen.insert(&edit.input.fingerprint);
            let explicit: Option<BTreeSet<Uuid>> =
                edit.user_ids.as_ref().map(|ids| ids.iter().copied().collect());

            match self.position(&edit.input.fingerprint) {
                Some(index) => {
                    let gained = explicit
                        .as_ref()
                        .map_or(0, |ids| self.records[index].add_submitters(ids, now));
                    if gained > 0 {
                        summary.corroborated += 1;
                    }
                    if is_first {
                        summary.kept += 1;
                    }
                }
                None => {
                    let submitters = explicit.unwrap_or_else(|| BTreeSet::from([acting_user]));
                    self.records
                        .push(FingerprintRecord::create(&edit.input, submitters, now));
                    summary.added += 1;
                }
            }
        }

        Ok(summary)
    }
}
