//! PostgreSQL catalog tests.
//!
//! These need a disposable database: set `TEST_DATABASE_URL` and run with
//! `--ignored`. Every test works on freshly inserted scenes so runs do not
//! interfere with each other.

use std::sync::Arc;

use scenedb_core::{
    ConsensusEngine, CriterionModifier, Fingerprint, FingerprintInput, MultiIdCriterion,
    QuerySpec, SceneFilter, SceneQueryService, Submission,
};
use scenedb_server::PostgresCatalog;
use uuid::Uuid;

async fn connect() -> (PostgresCatalog, sqlx::PgPool) {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let catalog = PostgresCatalog::connect(&url, 8, 1).await.unwrap();
    let pool = sqlx::PgPool::connect(&url).await.unwrap();
    (catalog, pool)
}

async fn insert_scene(pool: &sqlx::PgPool, studio_id: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO scenes (id, title, studio_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind("pg test scene")
        .bind(studio_id)
        .execute(pool)
        .await
        .unwrap();
    id
}

// ============================================================================
// Consensus Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a PostgreSQL database in TEST_DATABASE_URL"]
async fn test_submits_from_two_replicas_all_count() {
    let (first, pool) = connect().await;
    let (second, _) = connect().await;
    let scene_id = insert_scene(&pool, None).await;

    // Separate engines have separate in-process lock tables
    let replicas = [
        Arc::new(ConsensusEngine::new(Arc::new(first))),
        Arc::new(ConsensusEngine::new(Arc::new(second))),
    ];
    let fingerprint = Fingerprint::parse("PHASH", "00000000000000d7").unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = replicas[i % 2].clone();
            let fingerprint = fingerprint.clone();
            tokio::spawn(async move {
                engine
                    .submit(Submission {
                        scene_id,
                        fingerprint: FingerprintInput::new(fingerprint, 600),
                        acting_user: Uuid::new_v4(),
                        user_ids: None,
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = replicas[0].scene_fingerprints(scene_id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].submissions(), 16);
}

// ============================================================================
// Query Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires a PostgreSQL database in TEST_DATABASE_URL"]
async fn test_query_count_matches_items() {
    let (catalog, pool) = connect().await;
    let studio = Uuid::new_v4();
    for _ in 0..3 {
        insert_scene(&pool, Some(studio)).await;
    }
    insert_scene(&pool, None).await;

    let queries = SceneQueryService::new(Arc::new(catalog));
    let filter = SceneFilter {
        studios: Some(MultiIdCriterion::new(CriterionModifier::Equals, [studio])),
        ..Default::default()
    };
    let result = queries
        .query_scenes(&filter, &QuerySpec::default())
        .await
        .unwrap();

    assert_eq!(result.count, 3);
    assert_eq!(result.items.len(), 3);
    assert!(result.items.iter().all(|s| s.studio_id == Some(studio)));
}
