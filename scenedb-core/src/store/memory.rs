//! In-memory catalog for tests and development.
//!
//! Scenes and fingerprint collections live in `DashMap`s. A save swaps a
//! scene's whole collection under the map's shard lock, so readers never see
//! a partially written collection. Data is lost on restart.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{FingerprintStore, SceneStore};
use crate::error::StoreError;
use crate::fingerprint::{Fingerprint, FingerprintRecord};
use crate::query::{CompiledFilter, Page};
use crate::scene::Scene;

#[derive(Default)]
pub struct MemoryCatalog {
    /// scene_id -> scene
    scenes: DashMap<Uuid, Scene>,
    /// scene_id -> records in creation order (absent when empty)
    fingerprints: DashMap<Uuid, Vec<FingerprintRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scene so fingerprints can be attached and queried.
    pub fn insert_scene(&self, scene: Scene) -> Uuid {
        let id = scene.id;
        self.scenes.insert(id, scene);
        id
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Number of live fingerprint records across all scenes.
    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.iter().map(|entry| entry.value().len()).sum()
    }

    /// Scene IDs from `ids` sorted by scene creation, unknown IDs dropped.
    fn in_creation_order(&self, ids: HashSet<Uuid>) -> Vec<Uuid> {
        let mut scenes: Vec<(chrono::DateTime<chrono::Utc>, Uuid)> = ids
            .into_iter()
            .filter_map(|id| self.scenes.get(&id).map(|s| (s.created_at, id)))
            .collect();
        scenes.sort();
        scenes.into_iter().map(|(_, id)| id).collect()
    }

    fn scenes_with_record(&self, keep: impl Fn(&FingerprintRecord) -> bool) -> HashSet<Uuid> {
        self.fingerprints
            .iter()
            .filter(|entry| entry.value().iter().any(&keep))
            .map(|entry| *entry.key())
            .collect()
    }
}

#[async_trait]
impl FingerprintStore for MemoryCatalog {
    async fn scene_exists(&self, scene_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.scenes.contains_key(&scene_id))
    }

    async fn load_fingerprints(
        &self,
        scene_id: Uuid,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        Ok(self
            .fingerprints
            .get(&scene_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save_fingerprints(
        &self,
        scene_id: Uuid,
        records: &[FingerprintRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            self.fingerprints.remove(&scene_id);
        } else {
            self.fingerprints.insert(scene_id, records.to_vec());
        }
        tracing::debug!(%scene_id, records = records.len(), "Saved scene fingerprints");
        Ok(())
    }

    async fn find_scenes_by_fingerprints(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<Uuid>, StoreError> {
        let wanted: HashSet<&Fingerprint> = fingerprints.iter().collect();
        let ids = self.scenes_with_record(|r| wanted.contains(&r.fingerprint));
        Ok(self.in_creation_order(ids))
    }

    async fn find_scenes_by_hashes(&self, hashes: &[String]) -> Result<Vec<Uuid>, StoreError> {
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let ids = self.scenes_with_record(|r| wanted.contains(r.hash()));
        Ok(self.in_creation_order(ids))
    }
}

#[async_trait]
impl SceneStore for MemoryCatalog {
    async fn find_scenes(
        &self,
        filter: &CompiledFilter,
        page: &Page,
    ) -> Result<(Vec<Scene>, u64), StoreError> {
        let mut matched: Vec<Scene> = self
            .scenes
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page() as usize)
            .collect();

        Ok((items, total))
    }
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCatalog")
            .field("scenes", &self.scenes.len())
            .field("fingerprinted_scenes", &self.fingerprints.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{CriterionModifier, MultiIdCriterion};
    use crate::query::SceneFilter;
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn record(hash: &str) -> FingerprintRecord {
        let now = Utc::now();
        FingerprintRecord::from_parts(
            Fingerprint::parse("PHASH", hash).unwrap(),
            60,
            BTreeSet::from([Uuid::new_v4()]),
            now,
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let catalog = MemoryCatalog::new();
        let scene_id = catalog.insert_scene(Scene::new("a"));
        let records = vec![record("0000000000000001"), record("0000000000000002")];

        catalog.save_fingerprints(scene_id, &records).await.unwrap();
        assert_eq!(catalog.load_fingerprints(scene_id).await.unwrap(), records);
        assert_eq!(catalog.fingerprint_count(), 2);

        catalog.save_fingerprints(scene_id, &[]).await.unwrap();
        assert!(catalog.load_fingerprints(scene_id).await.unwrap().is_empty());
        assert_eq!(catalog.fingerprint_count(), 0);
    }

    #[tokio::test]
    async fn test_find_by_fingerprint_orders_by_creation() {
        let catalog = MemoryCatalog::new();
        let base = Utc::now();
        let mut older = Scene::new("older");
        older.created_at = base - Duration::seconds(10);
        let mut newer = Scene::new("newer");
        newer.created_at = base;
        let older_id = catalog.insert_scene(older);
        let newer_id = catalog.insert_scene(newer);

        let shared = record("00000000000000ff");
        catalog
            .save_fingerprints(newer_id, &[shared.clone()])
            .await
            .unwrap();
        catalog.save_fingerprints(older_id, &[shared.clone()]).await.unwrap();

        let found = catalog
            .find_scenes_by_fingerprints(&[shared.fingerprint.clone()])
            .await
            .unwrap();
        assert_eq!(found, vec![older_id, newer_id]);

        let by_hash = catalog
            .find_scenes_by_hashes(&["00000000000000ff".to_string()])
            .await
            .unwrap();
        assert_eq!(by_hash, vec![older_id, newer_id]);
    }

    #[tokio::test]
    async fn test_find_scenes_paginates_and_counts() {
        let catalog = MemoryCatalog::new();
        let tag = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            let mut scene = Scene::new(format!("tagged {i}")).with_tags([tag]);
            scene.created_at = base + Duration::seconds(i);
            catalog.insert_scene(scene);
        }
        catalog.insert_scene(Scene::new("untagged"));

        let filter = SceneFilter {
            tags: Some(MultiIdCriterion::new(CriterionModifier::Includes, [tag])),
            ..Default::default()
        }
        .compile()
        .unwrap();

        let (items, total) = catalog
            .find_scenes(&filter, &Page::new(2, 2, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(total, 5);
        let titles: Vec<_> = items.iter().filter_map(|s| s.title.clone()).collect();
        assert_eq!(titles, vec!["tagged 2", "tagged 3"]);
    }
}
