//! PostgreSQL implementation of the catalog stores.
//!
//! A scene's fingerprint collection is rewritten inside one transaction, so
//! concurrent readers see either the previous or the new collection. Record
//! creation order is kept through the `scene_fingerprints.id` sequence.
//!
//! Read-modify-write cycles lock the scene row with `FOR UPDATE` before
//! loading and keep the lock until the save commits, so several server
//! replicas can share one database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scenedb_core::criterion::{CompiledCriterion, Predicate};
use scenedb_core::{
    CompiledFilter, Fingerprint, FingerprintRecord, FingerprintStore, Page, Scene,
    SceneRelation, SceneStore, SceneTransaction, StoreError,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed catalog.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

/// Row type for a fingerprint with its aggregated submitters.
#[derive(FromRow)]
struct FingerprintRow {
    algorithm: String,
    hash: String,
    duration: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitters: Vec<Uuid>,
}

impl TryFrom<FingerprintRow> for FingerprintRecord {
    type Error = StoreError;

    fn try_from(row: FingerprintRow) -> Result<Self, Self::Error> {
        let fingerprint = Fingerprint::parse(&row.algorithm, &row.hash)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let duration = u32::try_from(row.duration).map_err(|_| {
            StoreError::Serialization(format!("negative duration {}", row.duration))
        })?;

        FingerprintRecord::from_parts(
            fingerprint,
            duration,
            row.submitters.into_iter().collect(),
            row.created_at,
            row.updated_at,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Row type for scene queries.
#[derive(FromRow)]
struct SceneRow {
    id: Uuid,
    title: Option<String>,
    studio_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    performer_ids: Vec<Uuid>,
    tag_ids: Vec<Uuid>,
}

impl From<SceneRow> for Scene {
    fn from(row: SceneRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            studio_id: row.studio_id,
            performer_ids: row.performer_ids.into_iter().collect(),
            tag_ids: row.tag_ids.into_iter().collect(),
            created_at: row.created_at,
        }
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

impl PostgresCatalog {
    /// Connect to the database and run migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("Catalog store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a catalog from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintStore for PostgresCatalog {
    async fn scene_exists(&self, scene_id: Uuid) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM scenes WHERE id = $1)")
            .bind(scene_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)
    }

    async fn load_fingerprints(
        &self,
        scene_id: Uuid,
    ) -> Result<Vec<FingerprintRecord>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(query_err)?;
        load_records(&mut conn, scene_id).await
    }

    async fn save_fingerprints(
        &self,
        scene_id: Uuid,
        records: &[FingerprintRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;
        replace_records(&mut tx, scene_id, records).await?;
        tx.commit().await.map_err(query_err)
    }

    async fn find_scenes_by_fingerprints(
        &self,
        fingerprints: &[Fingerprint],
    ) -> Result<Vec<Uuid>, StoreError> {
        let algorithms: Vec<String> = fingerprints
            .iter()
            .map(|f| f.algorithm().as_str().to_string())
            .collect();
        let hashes: Vec<String> = fingerprints.iter().map(|f| f.hash().to_string()).collect();

        sqlx::query_scalar(
            r#"
            SELECT s.id FROM scenes s
            WHERE EXISTS (
                SELECT 1 FROM scene_fingerprints f
                JOIN unnest($1::text[], $2::text[]) AS q(algorithm, hash)
                  ON f.algorithm = q.algorithm AND f.hash = q.hash
                WHERE f.scene_id = s.id
            )
            ORDER BY s.created_at, s.id
            "#,
        )
        .bind(algorithms)
        .bind(hashes)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)
    }

    async fn find_scenes_by_hashes(&self, hashes: &[String]) -> Result<Vec<Uuid>, StoreError> {
        sqlx::query_scalar(
            r#"
            SELECT s.id FROM scenes s
            WHERE EXISTS (
                SELECT 1 FROM scene_fingerprints f
                WHERE f.scene_id = s.id AND f.hash = ANY($1)
            )
            ORDER BY s.created_at, s.id
            "#,
        )
        .bind(hashes.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)
    }

    fn scene_transaction(&self, scene_id: Uuid) -> Box<dyn SceneTransaction + '_> {
        Box::new(PgSceneTransaction {
            pool: &self.pool,
            scene_id,
            tx: None,
        })
    }
}

/// One scene's read-modify-write inside a single database transaction.
///
/// The transaction starts on `load`, which also takes the scene row lock.
/// Dropping it uncommitted rolls back and releases the lock.
struct PgSceneTransaction<'a> {
    pool: &'a PgPool,
    scene_id: Uuid,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSceneTransaction<'_> {
    async fn begin(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        if self.tx.is_none() {
            let mut tx = self.pool.begin().await.map_err(query_err)?;
            sqlx::query("SELECT 1 FROM scenes WHERE id = $1 FOR UPDATE")
                .bind(self.scene_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| StoreError::Query("scene transaction not started".to_string()))
    }
}

#[async_trait]
impl SceneTransaction for PgSceneTransaction<'_> {
    async fn load(&mut self) -> Result<Vec<FingerprintRecord>, StoreError> {
        let scene_id = self.scene_id;
        let tx = self.begin().await?;
        load_records(tx, scene_id).await
    }

    async fn save(&mut self, records: &[FingerprintRecord]) -> Result<(), StoreError> {
        let scene_id = self.scene_id;
        let tx = self.begin().await?;
        replace_records(tx, scene_id, records).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        match self.tx {
            Some(tx) => tx.commit().await.map_err(query_err),
            None => Ok(()),
        }
    }
}

/// A scene's records in creation order.
async fn load_records(
    conn: &mut PgConnection,
    scene_id: Uuid,
) -> Result<Vec<FingerprintRecord>, StoreError> {
    let rows: Vec<FingerprintRow> = sqlx::query_as(
        r#"
        SELECT f.algorithm, f.hash, f.duration, f.created_at, f.updated_at,
               ARRAY(
                   SELECT s.user_id FROM scene_fingerprint_submitters s
                   WHERE s.fingerprint_id = f.id
                   ORDER BY s.user_id
               ) AS submitters
        FROM scene_fingerprints f
        WHERE f.scene_id = $1
        ORDER BY f.id
        "#,
    )
    .bind(scene_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_err)?;

    rows.into_iter().map(FingerprintRecord::try_from).collect()
}

/// Delete the scene's records and insert `records` in order. The caller owns
/// the transaction.
async fn replace_records(
    conn: &mut PgConnection,
    scene_id: Uuid,
    records: &[FingerprintRecord],
) -> Result<(), StoreError> {
    // Submitter rows cascade
    sqlx::query("DELETE FROM scene_fingerprints WHERE scene_id = $1")
        .bind(scene_id)
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;

    for record in records {
        let duration = i32::try_from(record.duration).map_err(|_| {
            StoreError::Serialization(format!("duration {} too large", record.duration))
        })?;

        let fingerprint_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scene_fingerprints
                (scene_id, algorithm, hash, duration, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(scene_id)
        .bind(record.algorithm().as_str())
        .bind(record.hash())
        .bind(duration)
        .bind(record.created)
        .bind(record.updated)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_err)?;

        let submitters: Vec<Uuid> = record.submitters().iter().copied().collect();
        sqlx::query(
            r#"
            INSERT INTO scene_fingerprint_submitters (fingerprint_id, user_id)
            SELECT $1, unnest($2::uuid[])
            "#,
        )
        .bind(fingerprint_id)
        .bind(submitters)
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;
    }

    tracing::debug!(%scene_id, records = records.len(), "Saved scene fingerprints");

    Ok(())
}

#[async_trait]
impl SceneStore for PostgresCatalog {
    async fn find_scenes(
        &self,
        filter: &CompiledFilter,
        page: &Page,
    ) -> Result<(Vec<Scene>, u64), StoreError> {
        // Count and page read the same snapshot
        let mut tx = self.pool.begin().await.map_err(query_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM scenes s");
        push_where(&mut count_query, filter)?;
        let count: i64 = count_query
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut items_query = QueryBuilder::<Postgres>::new(
            r#"SELECT s.id, s.title, s.studio_id, s.created_at,
                ARRAY(SELECT p.performer_id FROM scene_performers p WHERE p.scene_id = s.id) AS performer_ids,
                ARRAY(SELECT t.tag_id FROM scene_tags t WHERE t.scene_id = s.id) AS tag_ids
            FROM scenes s"#,
        );
        push_where(&mut items_query, filter)?;
        items_query.push(" ORDER BY s.created_at, s.id LIMIT ");
        items_query.push_bind(i64::from(page.per_page()));
        items_query.push(" OFFSET ");
        items_query.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows: Vec<SceneRow> = items_query
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;
        tx.commit().await.map_err(query_err)?;

        Ok((
            rows.into_iter().map(Scene::from).collect(),
            u64::try_from(count).unwrap_or(0),
        ))
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}

/// Where a relation lives in the schema.
enum RelationColumn {
    /// Nullable column on `scenes`
    Scalar(&'static str),
    /// Join table keyed by `scene_id`
    Join {
        table: &'static str,
        column: &'static str,
    },
}

fn relation_column(relation: SceneRelation) -> RelationColumn {
    match relation {
        SceneRelation::Studio => RelationColumn::Scalar("s.studio_id"),
        SceneRelation::Performers => RelationColumn::Join {
            table: "scene_performers",
            column: "performer_id",
        },
        SceneRelation::Tags => RelationColumn::Join {
            table: "scene_tags",
            column: "tag_id",
        },
    }
}

/// Append the filter's WHERE clause (nothing when the filter is empty).
fn push_where(
    query: &mut QueryBuilder<'_, Postgres>,
    filter: &CompiledFilter,
) -> Result<(), StoreError> {
    let mut first = true;
    let mut next = |query: &mut QueryBuilder<'_, Postgres>| {
        query.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if let Some(title) = filter.title() {
        next(query);
        query.push("s.title ILIKE ");
        query.push_bind(format!("%{}%", escape_like(title)));
    }

    for criterion in filter.criteria() {
        next(query);
        push_criterion(query, criterion)?;
    }

    Ok(())
}

fn push_criterion(
    query: &mut QueryBuilder<'_, Postgres>,
    criterion: &CompiledCriterion,
) -> Result<(), StoreError> {
    let ids = |set: &std::collections::BTreeSet<Uuid>| set.iter().copied().collect::<Vec<Uuid>>();

    match (relation_column(criterion.relation), &criterion.predicate) {
        (RelationColumn::Scalar(column), Predicate::In(set)) => {
            query.push(format!("{column} = ANY("));
            query.push_bind(ids(set));
            query.push(")");
        }
        (RelationColumn::Scalar(column), Predicate::NotIn(set)) => {
            query.push(format!("({column} IS NULL OR NOT ({column} = ANY("));
            query.push_bind(ids(set));
            query.push(")))");
        }
        (RelationColumn::Scalar(column), Predicate::IsNull) => {
            query.push(format!("{column} IS NULL"));
        }
        (RelationColumn::Scalar(column), Predicate::NotNull) => {
            query.push(format!("{column} IS NOT NULL"));
        }
        (RelationColumn::Join { table, column }, Predicate::IncludesAny(set)) => {
            query.push(format!(
                "EXISTS (SELECT 1 FROM {table} j WHERE j.scene_id = s.id AND j.{column} = ANY("
            ));
            query.push_bind(ids(set));
            query.push("))");
        }
        (RelationColumn::Join { table, column }, Predicate::ExcludesAll(set)) => {
            query.push(format!(
                "NOT EXISTS (SELECT 1 FROM {table} j WHERE j.scene_id = s.id AND j.{column} = ANY("
            ));
            query.push_bind(ids(set));
            query.push("))");
        }
        (RelationColumn::Join { table, column }, Predicate::IncludesAll(set)) => {
            query.push(format!(
                "(SELECT COUNT(DISTINCT j.{column}) FROM {table} j WHERE j.scene_id = s.id AND j.{column} = ANY("
            ));
            query.push_bind(ids(set));
            query.push(")) = ");
            query.push_bind(set.len() as i64);
        }
        (_, predicate) => {
            return Err(StoreError::Query(format!(
                "predicate {predicate:?} does not apply to {}",
                criterion.relation.name()
            )));
        }
    }

    Ok(())
}

/// Escape LIKE wildcards so the fragment matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
