//! Persistence collaborator interfaces.
//!
//! The core never talks to a database directly. It consumes two traits:
//!
//! - [`FingerprintStore`]: load/save a scene's fingerprint collection and
//!   find scenes by fingerprint.
//! - [`SceneStore`]: execute a compiled scene filter with pagination.
//!
//! Every call is assumed atomic at single-scene granularity: a save replaces
//! a scene's whole collection so concurrent readers see either the old or the
//! new collection, never a mix.
//!
//! Read-modify-write cycles go through [`SceneTransaction`]. The default one
//! calls the plain load and save methods and relies on the engine's
//! in-process lock. Stores shared by several processes override
//! [`FingerprintStore::scene_transaction`] to lock the scene themselves.
//!
//! [`MemoryCatalog`] implements both for tests and development.

mod memory;

pub use memory::MemoryCatalog;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::fingerprint::{Fingerprint, FingerprintRecord};
use crate::query::{CompiledFilter, Page};
use crate::scene::Scene;

/// Exclusive load-then-save access to one scene's collection.
///
/// Dropping it without [`commit`](Self::commit) discards any save.
#[async_trait]
pub trait SceneTransaction: Send {
    /// Load the scene's records in creation order.
    async fn load(&mut self) -> Result<Vec<FingerprintRecord>, StoreError>;

    /// Replace the scene's records with `records`.
    async fn save(&mut self, records: &[FingerprintRecord]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transaction that forwards to the store's plain load and save.
struct Passthrough<'a, S: ?Sized> {
    store: &'a S,
    scene_id: Uuid,
}

#[async_trait]
impl<S: FingerprintStore + ?Sized> SceneTransaction for Passthrough<'_, S> {
    async fn load(&mut self) -> Result<Vec<FingerprintRecord>, StoreError> {
        self.store.load_fingerprints(self.scene_id).await
    }

    async fn save(&mut self, records: &[FingerprintRecord]) -> Result<(), StoreError> {
        self.store.save_fingerprints(self.scene_id, records).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Storage for per-scene fingerprint collections.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Whether the scene is known to the catalog.
    async fn scene_exists(&self, scene_id: Uuid) -> Result<bool, StoreError>;

    /// Load a scene's records in creation order (empty if it has none).
    async fn load_fingerprints(&self, scene_id: Uuid)
        -> Result<Vec<FingerprintRecord>, StoreError>;

    /// Atomically replace a scene's records with `records`.
    async fn save_fingerprints(
        &self,
        scene_id: Uuid,
        records: &[FingerprintRecord],
    ) -> Result<(), StoreError>;

    /// IDs of scenes holding a live record for any of `fingerprints`,
    /// in scene creation order, without duplicates.
    async fn find_scenes_by_fingerprints(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<Uuid>, StoreError>;

    /// IDs of scenes holding a live record whose hash is in `hashes`,
    /// regardless of algorithm.
    async fn find_scenes_by_hashes(&self, hashes: &[String]) -> Result<Vec<Uuid>, StoreError>;

    /// Open a read-modify-write cycle on one scene.
    fn scene_transaction(&self, scene_id: Uuid) -> Box<dyn SceneTransaction + '_> {
        Box::new(Passthrough {
            store: self,
            scene_id,
        })
    }
}

/// Query execution over scenes.
#[async_trait]
pub trait SceneStore: Send + Sync {
    /// Return one page of scenes matching `filter` plus the total match count.
    async fn find_scenes(
        &self,
        filter: &CompiledFilter,
        page: &Page,
    ) -> Result<(Vec<Scene>, u64), StoreError>;

    /// Cheap connectivity check (always `Ok` for in-process stores).
    async fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
