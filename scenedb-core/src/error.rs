use thiserror::Error;
use uuid::Uuid;

use crate::criterion::{CriterionModifier, RelationShape};

/// Errors raised by a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown fingerprint algorithm: '{0}'")]
    UnknownAlgorithm(String),

    #[error("Invalid {algorithm} hash '{hash}': {reason}")]
    InvalidHash {
        algorithm: &'static str,
        hash: String,
        reason: String,
    },

    #[error("Modifier {modifier} is not valid for {relation} ({shape} relation)")]
    InvalidModifier {
        relation: &'static str,
        shape: RelationShape,
        modifier: CriterionModifier,
    },

    #[error("Modifier {modifier} on {relation} requires at least one value")]
    MissingCriterionValue {
        relation: &'static str,
        modifier: CriterionModifier,
    },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Explicit submitter list must not be empty")]
    EmptySubmitters,

    #[error("Scene not found: {0}")]
    SceneNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CatalogError {
    /// Whether this error was raised by input validation, before any store access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownAlgorithm(_)
                | Self::InvalidHash { .. }
                | Self::InvalidModifier { .. }
                | Self::MissingCriterionValue { .. }
                | Self::InvalidPagination(_)
                | Self::EmptySubmitters
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
