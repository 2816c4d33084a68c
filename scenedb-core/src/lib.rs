//! SceneDB Core - fingerprint consensus and criterion filtering
//!
//! This crate holds the domain logic of the SceneDB catalog without any
//! transport or database code. Persistence is reached through the
//! [`store::FingerprintStore`] and [`store::SceneStore`] traits.
//!
//! # Features
//!
//! - Crowd-sourced fingerprint consensus: one record per `(algorithm, hash)`
//!   per scene, corroborated by a set of distinct users
//! - Per-scene serialization of submit, unmatch and reconcile
//! - Shape-aware criterion validation (to-one vs. to-many relations)
//! - Paginated scene queries over any `SceneStore`
//! - Lenient resolution of stored performer attribute enums
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scenedb_core::{
//!     ConsensusEngine, Fingerprint, FingerprintInput, MemoryCatalog, Scene, Submission,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> scenedb_core::Result<()> {
//! let catalog = Arc::new(MemoryCatalog::new());
//! let scene_id = catalog.insert_scene(Scene::new("Example scene"));
//! let engine = ConsensusEngine::new(catalog);
//!
//! let result = engine
//!     .submit(Submission {
//!         scene_id,
//!         fingerprint: FingerprintInput::new(Fingerprint::parse("PHASH", "a1b2c3d4e5f60718")?, 1320),
//!         acting_user: Uuid::new_v4(),
//!         user_ids: None,
//!     })
//!     .await?;
//!
//! assert_eq!(result.record.submissions(), 1);
//! # Ok(())
//! # }
//! ```

pub mod criterion;
pub mod enums;
pub mod error;
pub mod fingerprint;
pub mod query;
pub mod scene;
pub mod store;

// Re-export main types for convenience
pub use criterion::{CriterionModifier, MultiIdCriterion, RelationShape, SceneRelation};
pub use error::{CatalogError, Result, StoreError};
pub use fingerprint::{
    ConsensusEngine, Fingerprint, FingerprintAlgorithm, FingerprintEdit, FingerprintInput,
    FingerprintMatch, FingerprintRecord, ReconcileResult, ReconcileSummary, Retraction,
    Submission, SubmitOutcome, SubmitResult, UnmatchOutcome, UnmatchResult,
};
pub use query::{
    CompiledFilter, Page, QueryResult, QuerySpec, SceneFilter, SceneQueryService,
    DEFAULT_MAX_PER_PAGE, DEFAULT_PER_PAGE,
};
pub use scene::Scene;
pub use store::{FingerprintStore, MemoryCatalog, SceneStore, SceneTransaction};
