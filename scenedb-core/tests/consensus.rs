//! End-to-end behaviour of the consensus engine and scene queries over the
//! in-memory catalog.

use std::sync::Arc;

use chrono::{Duration, Utc};
use scenedb_core::{
    CatalogError, ConsensusEngine, CriterionModifier, Fingerprint, FingerprintInput,
    MemoryCatalog, MultiIdCriterion, QuerySpec, Retraction, Scene, SceneFilter,
    SceneQueryService, Submission, SubmitOutcome, UnmatchOutcome,
};
use uuid::Uuid;

const HASH: &str = "a1b2c3d4e5f60718";

struct Fixture {
    catalog: Arc<MemoryCatalog>,
    engine: ConsensusEngine,
    queries: SceneQueryService,
}

fn fixture() -> Fixture {
    let catalog = Arc::new(MemoryCatalog::new());
    Fixture {
        engine: ConsensusEngine::new(catalog.clone()),
        queries: SceneQueryService::new(catalog.clone()),
        catalog,
    }
}

fn phash() -> Fingerprint {
    Fingerprint::parse("PHASH", HASH).unwrap()
}

fn submit(scene_id: Uuid, user: Uuid) -> Submission {
    Submission {
        scene_id,
        fingerprint: FingerprintInput::new(phash(), 1320),
        acting_user: user,
        user_ids: None,
    }
}

fn unmatch(scene_id: Uuid, user: Uuid) -> Retraction {
    Retraction {
        scene_id,
        fingerprint: phash(),
        acting_user: user,
        user_ids: None,
    }
}

/// Insert scenes with strictly increasing creation times.
fn ordered_scenes(catalog: &MemoryCatalog, scenes: Vec<Scene>) -> Vec<Uuid> {
    let base = Utc::now() - Duration::hours(1);
    scenes
        .into_iter()
        .enumerate()
        .map(|(i, mut scene)| {
            scene.created_at = base + Duration::seconds(i as i64);
            catalog.insert_scene(scene)
        })
        .collect()
}

// ============================================================================
// Consensus
// ============================================================================

#[tokio::test]
async fn test_idempotent_submit() {
    let f = fixture();
    let scene = f.catalog.insert_scene(Scene::new("scene"));
    let user = Uuid::new_v4();

    f.engine.submit(submit(scene, user)).await.unwrap();
    for _ in 0..3 {
        let again = f.engine.submit(submit(scene, user)).await.unwrap();
        assert_eq!(again.outcome, SubmitOutcome::Unchanged);
        assert_eq!(again.record.submissions(), 1);
    }
    assert_eq!(f.catalog.fingerprint_count(), 1);
}

#[tokio::test]
async fn test_additive_corroboration_and_duration_kept() {
    let f = fixture();
    let scene = f.catalog.insert_scene(Scene::new("scene"));
    let batch: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

    let created = f
        .engine
        .submit(Submission {
            user_ids: Some(batch[..3].to_vec()),
            ..submit(scene, Uuid::new_v4())
        })
        .await
        .unwrap();
    assert_eq!(created.record.submissions(), 3);

    let grown = f
        .engine
        .submit(Submission {
            fingerprint: FingerprintInput::new(phash(), 9999),
            user_ids: Some(batch.clone()),
            ..submit(scene, Uuid::new_v4())
        })
        .await
        .unwrap();
    assert_eq!(grown.outcome, SubmitOutcome::Corroborated { added: 1 });
    assert_eq!(grown.record.submissions(), 4);
    assert_eq!(grown.record.duration, 1320);
}

#[tokio::test]
async fn test_unmatch_absent_user_is_noop() {
    let f = fixture();
    let scene = f.catalog.insert_scene(Scene::new("scene"));
    let user = Uuid::new_v4();
    f.engine.submit(submit(scene, user)).await.unwrap();

    let result = f
        .engine
        .unmatch(unmatch(scene, Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(result.outcome, UnmatchOutcome::Unchanged);
    assert_eq!(result.record.unwrap().submissions(), 1);

    let other_scene = f.catalog.insert_scene(Scene::new("empty"));
    let result = f.engine.unmatch(unmatch(other_scene, user)).await.unwrap();
    assert_eq!(result.outcome, UnmatchOutcome::Absent);
}

#[tokio::test]
async fn test_cross_scene_lookup_counts_independently() {
    let f = fixture();
    let scenes = ordered_scenes(&f.catalog, vec![Scene::new("a"), Scene::new("b")]);
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    f.engine.submit(submit(scenes[1], u1)).await.unwrap();
    f.engine.submit(submit(scenes[0], u1)).await.unwrap();
    f.engine.submit(submit(scenes[0], u2)).await.unwrap();

    let matches = f.engine.find_by_fingerprint(&phash()).await.unwrap();
    let found: Vec<(Uuid, usize)> = matches
        .iter()
        .map(|m| (m.scene_id, m.submissions()))
        .collect();
    assert_eq!(found, vec![(scenes[0], 2), (scenes[1], 1)]);
}

#[tokio::test]
async fn test_lookup_after_full_unmatch_finds_nothing() {
    let f = fixture();
    let scene = f.catalog.insert_scene(Scene::new("scene"));
    let user = Uuid::new_v4();

    f.engine.submit(submit(scene, user)).await.unwrap();
    f.engine.unmatch(unmatch(scene, user)).await.unwrap();

    assert!(f.engine.find_by_fingerprint(&phash()).await.unwrap().is_empty());
    assert!(f
        .engine
        .find_by_hashes(&[HASH.to_uppercase()])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_concurrent_submits_across_scenes() {
    let f = fixture();
    let scenes: Vec<Uuid> = (0..4)
        .map(|i| f.catalog.insert_scene(Scene::new(format!("scene {i}"))))
        .collect();
    let engine = Arc::new(f.engine);

    let mut handles = Vec::new();
    for scene in &scenes {
        for _ in 0..8 {
            let engine = engine.clone();
            let scene = *scene;
            handles.push(tokio::spawn(async move {
                engine.submit(submit(scene, Uuid::new_v4())).await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let matches = engine.find_by_fingerprint(&phash()).await.unwrap();
    assert_eq!(matches.len(), 4);
    assert!(matches.iter().all(|m| m.submissions() == 8));
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_query_partitions_by_to_many_relation() {
    let f = fixture();
    let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
    let ids = ordered_scenes(
        &f.catalog,
        vec![
            Scene::new("only t1").with_tags([t1]),
            Scene::new("only t2").with_tags([t2]),
            Scene::new("both").with_tags([t1, t2]),
            Scene::new("none"),
        ],
    );

    let run = |modifier| {
        let filter = SceneFilter {
            tags: Some(MultiIdCriterion::new(modifier, [t1])),
            ..Default::default()
        };
        let queries = f.queries.clone();
        async move {
            queries
                .query_scenes(&filter, &QuerySpec::default())
                .await
                .unwrap()
                .items
                .into_iter()
                .map(|s| s.id)
                .collect::<Vec<_>>()
        }
    };

    let includes = run(CriterionModifier::Includes).await;
    let excludes = run(CriterionModifier::Excludes).await;
    assert_eq!(includes, vec![ids[0], ids[2]]);
    assert_eq!(excludes, vec![ids[1], ids[3]]);
}

#[tokio::test]
async fn test_query_to_one_null_checks() {
    let f = fixture();
    let studio = Uuid::new_v4();
    let ids = ordered_scenes(
        &f.catalog,
        vec![Scene::new("studio").with_studio(studio), Scene::new("none")],
    );

    let filter = SceneFilter {
        studios: Some(MultiIdCriterion::new(CriterionModifier::IsNull, Vec::<Uuid>::new())),
        ..Default::default()
    };
    let result = f
        .queries
        .query_scenes(&filter, &QuerySpec::default())
        .await
        .unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.items[0].id, ids[1]);

    let filter = SceneFilter {
        studios: Some(MultiIdCriterion::new(CriterionModifier::NotNull, Vec::<Uuid>::new())),
        ..Default::default()
    };
    let not_null = f
        .queries
        .query_scenes(&filter, &QuerySpec::default())
        .await
        .unwrap();
    assert_eq!(not_null.count, 1);
    assert_eq!(not_null.items[0].id, ids[0]);

    // Together the two checks cover every scene exactly once
    let mut covered: Vec<Uuid> = result
        .items
        .iter()
        .chain(not_null.items.iter())
        .map(|scene| scene.id)
        .collect();
    covered.sort();
    let mut all = ids.clone();
    all.sort();
    assert_eq!(covered, all);
}

#[tokio::test]
async fn test_invalid_modifier_rejected_before_storage() {
    let f = fixture();
    f.catalog.insert_scene(Scene::new("scene"));

    let filter = SceneFilter {
        performers: Some(MultiIdCriterion::new(
            CriterionModifier::Equals,
            [Uuid::new_v4()],
        )),
        ..Default::default()
    };
    let err = f
        .queries
        .query_scenes(&filter, &QuerySpec::default())
        .await
        .unwrap_err();

    match err {
        CatalogError::InvalidModifier {
            relation, modifier, ..
        } => {
            assert_eq!(relation, "performers");
            assert_eq!(modifier, CriterionModifier::Equals);
        }
        other => panic!("Expected InvalidModifier, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_query_pagination_reports_total() {
    let f = fixture();
    let scenes = (0..7).map(|i| Scene::new(format!("Scene {i}"))).collect();
    let ids = ordered_scenes(&f.catalog, scenes);

    let result = f
        .queries
        .query_scenes(
            &SceneFilter {
                title: Some("scene".to_string()),
                ..Default::default()
            },
            &QuerySpec {
                page: Some(3),
                per_page: Some(3),
            },
        )
        .await
        .unwrap();

    assert_eq!(result.count, 7);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, ids[6]);

    let err = f
        .queries
        .query_scenes(
            &SceneFilter::default(),
            &QuerySpec {
                page: Some(0),
                per_page: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidPagination(_)));
}
