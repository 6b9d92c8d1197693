//! PostgreSQL graph store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Constraints
//!
//! The schema enforces what the engine relies on: a unique index on tag
//! name, and composite foreign keys that pin both edge endpoints to nodes of
//! the edge's own version. Constraint violations are mapped back to
//! [`StoreError::DuplicateTagName`] and [`StoreError::ReferentialViolation`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, Postgres, Row};
use uuid::Uuid;

use super::{GraphStore, StoreError, StoreTransaction};
use crate::types::{
    Edge, EdgeId, Node, NodeId, Payload, SnapshotManifest, Tag, TagId, Version, VersionId,
};

/// DDL for the versioning tables. Idempotent.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS versions (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    lineage_tag_id  UUID NULL,
    created_at      TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS nodes (
    id          UUID PRIMARY KEY,
    version_id  UUID NOT NULL REFERENCES versions (id),
    payload     JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    UNIQUE (id, version_id)
);

CREATE INDEX IF NOT EXISTS nodes_version_idx ON nodes (version_id);

CREATE TABLE IF NOT EXISTS edges (
    id              UUID PRIMARY KEY,
    version_id      UUID NOT NULL REFERENCES versions (id),
    source_node_id  UUID NOT NULL,
    target_node_id  UUID NOT NULL,
    payload         JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    FOREIGN KEY (source_node_id, version_id) REFERENCES nodes (id, version_id),
    FOREIGN KEY (target_node_id, version_id) REFERENCES nodes (id, version_id)
);

CREATE INDEX IF NOT EXISTS edges_version_idx ON edges (version_id);
CREATE INDEX IF NOT EXISTS edges_source_idx ON edges (source_node_id);
CREATE INDEX IF NOT EXISTS edges_target_idx ON edges (target_node_id);

CREATE TABLE IF NOT EXISTS tags (
    id                  UUID PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT NOT NULL,
    source_version_id   UUID NOT NULL REFERENCES versions (id),
    snapshot_node_ids   UUID[] NOT NULL,
    snapshot_edge_ids   UUID[] NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL
);
"#;

/// Configuration for PostgreSQL connection pool.
///
/// Production defaults:
/// - Pool size balances concurrency with connection limits
/// - Timeouts are aggressive to fail fast
/// - Idle timeout releases unused connections
/// - Max lifetime forces periodic reconnection for health
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/versioning".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL graph store.
///
/// Every scope holds one pooled connection inside a database transaction.
pub struct PostgresGraphStore {
    pool: PgPool,
    closed: AtomicBool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    /// Create the versioning tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        // Plain &str executes over the simple protocol, which accepts
        // multiple statements.
        self.pool.execute(SCHEMA_SQL).await?;
        tracing::info!("Versioning schema ensured");
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    /// Waits for open scopes to release their connections.
    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.pool.is_closed()
    }
}

/// A database transaction. Dropping it without commit rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Map constraint violations to their store-level kinds.
fn classify(err: sqlx::Error, tag_name: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if let Some(name) = tag_name {
                return StoreError::DuplicateTagName(name.to_string());
            }
        }
        if db.is_foreign_key_violation() {
            return StoreError::ReferentialViolation(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn parse_version_row(row: &PgRow) -> Result<Version, sqlx::Error> {
    let lineage: Option<Uuid> = row.try_get("lineage_tag_id")?;
    Ok(Version {
        id: VersionId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        lineage: lineage.map(TagId::new),
        created_at: row.try_get("created_at")?,
    })
}

fn parse_node_row(row: &PgRow) -> Result<Node, sqlx::Error> {
    let payload: Json<Payload> = row.try_get("payload")?;
    Ok(Node {
        id: NodeId::new(row.try_get("id")?),
        version_id: VersionId::new(row.try_get("version_id")?),
        payload: payload.0,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_edge_row(row: &PgRow) -> Result<Edge, sqlx::Error> {
    let payload: Json<Payload> = row.try_get("payload")?;
    Ok(Edge {
        id: EdgeId::new(row.try_get("id")?),
        version_id: VersionId::new(row.try_get("version_id")?),
        source: NodeId::new(row.try_get("source_node_id")?),
        target: NodeId::new(row.try_get("target_node_id")?),
        payload: payload.0,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_tag_row(row: &PgRow) -> Result<Tag, sqlx::Error> {
    let node_ids: Vec<Uuid> = row.try_get("snapshot_node_ids")?;
    let edge_ids: Vec<Uuid> = row.try_get("snapshot_edge_ids")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Tag {
        id: TagId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        version_id: VersionId::new(row.try_get("source_version_id")?),
        manifest: SnapshotManifest::new(
            node_ids.into_iter().map(NodeId::new),
            edge_ids.into_iter().map(EdgeId::new),
        ),
        created_at,
    })
}

const NODE_COLUMNS: &str = "id, version_id, payload, created_at";
const EDGE_COLUMNS: &str = "id, version_id, source_node_id, target_node_id, payload, created_at";
const TAG_COLUMNS: &str =
    "id, name, description, source_version_id, snapshot_node_ids, snapshot_edge_ids, created_at";

/// Filters bound as `$1`: a scalar `Uuid` or a `Vec<Uuid>` for `ANY`.
trait FilterParam: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static {}

impl FilterParam for Uuid {}
impl FilterParam for Vec<Uuid> {}

fn node_query(filter: &str) -> String {
    format!("SELECT {NODE_COLUMNS} FROM nodes WHERE {filter} ORDER BY id")
}

fn edge_query(filter: &str) -> String {
    format!("SELECT {EDGE_COLUMNS} FROM edges WHERE {filter} ORDER BY id")
}

impl PostgresTransaction {
    async fn fetch_nodes<P: FilterParam>(&mut self, filter: &str, param: P) -> Result<Vec<Node>, StoreError> {
        let sql = node_query(filter);
        let rows = sqlx::query(&sql).bind(param).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(parse_node_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn fetch_edges<P: FilterParam>(&mut self, filter: &str, param: P) -> Result<Vec<Edge>, StoreError> {
        let sql = edge_query(filter);
        let rows = sqlx::query(&sql).bind(param).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(parse_edge_row).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_version(&mut self, version: &Version) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO versions (id, name, lineage_tag_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(version.id.as_uuid())
        .bind(&version.name)
        .bind(version.lineage.map(|t| t.as_uuid()))
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, None))?;
        Ok(())
    }

    async fn insert_node(&mut self, node: &Node) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nodes (id, version_id, payload, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(node.id.as_uuid())
        .bind(node.version_id.as_uuid())
        .bind(Json(&node.payload))
        .bind(node.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, None))?;
        Ok(())
    }

    async fn insert_edge(&mut self, edge: &Edge) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO edges (id, version_id, source_node_id, target_node_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(edge.id.as_uuid())
        .bind(edge.version_id.as_uuid())
        .bind(edge.source.as_uuid())
        .bind(edge.target.as_uuid())
        .bind(Json(&edge.payload))
        .bind(edge.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, None))?;
        Ok(())
    }

    async fn insert_tag(&mut self, tag: &Tag) -> Result<(), StoreError> {
        let node_ids: Vec<Uuid> = tag.manifest.node_ids.iter().map(|id| id.as_uuid()).collect();
        let edge_ids: Vec<Uuid> = tag.manifest.edge_ids.iter().map(|id| id.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO tags (id, name, description, source_version_id,
                              snapshot_node_ids, snapshot_edge_ids, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tag.id.as_uuid())
        .bind(&tag.name)
        .bind(&tag.description)
        .bind(tag.version_id.as_uuid())
        .bind(node_ids)
        .bind(edge_ids)
        .bind(tag.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, Some(&tag.name)))?;
        Ok(())
    }

    async fn get_version(&mut self, id: &VersionId) -> Result<Option<Version>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, lineage_tag_id, created_at FROM versions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(ref r) => Ok(Some(parse_version_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_versions(&mut self) -> Result<Vec<Version>, StoreError> {
        let rows = sqlx::query("SELECT id, name, lineage_tag_id, created_at FROM versions ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(parse_version_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_node(&mut self, id: &NodeId) -> Result<Option<Node>, StoreError> {
        Ok(self.fetch_nodes("id = $1", id.as_uuid()).await?.pop())
    }

    async fn get_nodes(&mut self, ids: &[NodeId]) -> Result<Vec<Node>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(NodeId::as_uuid).collect();
        self.fetch_nodes("id = ANY($1)", ids).await
    }

    async fn get_edge(&mut self, id: &EdgeId) -> Result<Option<Edge>, StoreError> {
        Ok(self.fetch_edges("id = $1", id.as_uuid()).await?.pop())
    }

    async fn get_edges(&mut self, ids: &[EdgeId]) -> Result<Vec<Edge>, StoreError> {
        let ids: Vec<Uuid> = ids.iter().map(EdgeId::as_uuid).collect();
        self.fetch_edges("id = ANY($1)", ids).await
    }

    async fn nodes_in_version(&mut self, version: &VersionId) -> Result<Vec<Node>, StoreError> {
        self.fetch_nodes("version_id = $1", version.as_uuid()).await
    }

    async fn edges_in_version(&mut self, version: &VersionId) -> Result<Vec<Edge>, StoreError> {
        self.fetch_edges("version_id = $1", version.as_uuid()).await
    }

    async fn outgoing_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError> {
        self.fetch_edges("source_node_id = $1", node.as_uuid()).await
    }

    async fn incoming_edges(&mut self, node: &NodeId) -> Result<Vec<Edge>, StoreError> {
        self.fetch_edges("target_node_id = $1", node.as_uuid()).await
    }

    async fn get_tag_by_name(&mut self, name: &str) -> Result<Option<Tag>, StoreError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(ref r) => Ok(Some(parse_tag_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_tags(&mut self) -> Result<Vec<Tag>, StoreError> {
        let sql = format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY created_at, id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(parse_tag_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn commit(self) -> Result<(), StoreError> {
        // Deferred constraints surface here; keep their kinds.
        self.tx.commit().await.map_err(|e| classify(e, None))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
