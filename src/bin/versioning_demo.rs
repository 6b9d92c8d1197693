//! Versioning demo binary
//!
//! Walks through the full lifecycle on a real store: bootstrap a version,
//! tag it, branch from the tag, grow the branch, tag again, roll back, and
//! inspect current and historical state.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DEMO_BACKEND`: "memory" (default) or "postgres" (needs the `postgres` feature)
//! - `DATABASE_URL` and `DB_*`: PostgreSQL settings, see `PostgresConfig`
//! - `VERSIONING_VALIDATE_TAG_NAMES`: enable tag name validation (default: false)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! LOG_FORMAT=pretty cargo run --bin versioning_demo --features demo
//! ```

use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use tree_versioning::{
    EngineConfig, GraphStore, InMemoryGraphStore, VersioningEngine, VersioningError,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "versioning_demo=info,tree_versioning=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init();
    }
}

/// Tag names are global; suffix them so reruns against a durable store
/// do not collide.
fn tag_name(base: &str, run: &str) -> String {
    format!("{}-{}", base, run)
}

async fn run_scenario<S: GraphStore>(
    engine: &VersioningEngine<S>,
    run: &str,
) -> Result<(), VersioningError> {
    let (v1_0, v1_1, stable) = (
        tag_name("v1.0", run),
        tag_name("v1.1", run),
        tag_name("stable", run),
    );

    // Bootstrap
    let initial = engine
        .create_initial_version("config", json!({"type": "database"}).into(), Some(v1_0.as_str()))
        .await?;
    let state = engine.get_state_at_tag(&v1_0).await?;
    info!(
        tag = %v1_0,
        nodes = state.node_count(),
        edges = state.edge_count(),
        "Initial snapshot"
    );

    // Branch and grow
    let branch = engine.branch_from_tag(&v1_0, "config_with_cache").await?;
    let db = branch
        .cloned_node(&initial.root.id)
        .ok_or(VersioningError::NodeNotFound(initial.root.id))?;
    let cache = engine
        .add_node(branch.version.id, json!({"type": "cache"}).into())
        .await?;
    engine
        .add_edge(branch.version.id, db, cache.id, json!({"relation": "uses"}).into())
        .await?;
    engine.create_tag(branch.version.id, &v1_1, "added cache").await?;

    for name in [&v1_0, &v1_1] {
        let state = engine.get_state_at_tag(name).await?;
        info!(
            tag = %name,
            nodes = state.node_count(),
            edges = state.edge_count(),
            fingerprint = %state.tag.fingerprint(),
            "Snapshot"
        );
    }

    // Traverse
    let path = engine.find_path(db, cache.id).await?;
    let depth1 = engine.get_nodes_at_depth(branch.version.id, 1).await?;
    info!(hops = path.len() - 1, depth1 = depth1.len(), "Traversal");

    // Experimental change, then roll back
    engine.create_tag(branch.version.id, &stable, "known good").await?;
    let experiment = engine
        .add_node(branch.version.id, json!({"experimental": true}).into())
        .await?;
    engine
        .add_edge(branch.version.id, cache.id, experiment.id, json!({}).into())
        .await?;
    let restored = engine.restore_from_tag(&stable).await?;
    let roots = engine.get_root_nodes(restored.id).await?;
    info!(
        version = %restored.name,
        roots = roots.len(),
        total_versions = engine.list_versions().await?.len(),
        "Rolled back"
    );

    // Tag names are never reused
    match engine.create_tag(restored.id, &stable, "again").await {
        Err(VersioningError::DuplicateTagName(name)) => {
            info!(tag = %name, "Duplicate tag rejected as expected")
        }
        other => warn!(result = ?other.map(|t| t.name), "Duplicate tag was not rejected"),
    }

    Ok(())
}

#[cfg(feature = "postgres")]
async fn postgres_engine(
    config: EngineConfig,
) -> Result<VersioningEngine<tree_versioning::PostgresGraphStore>, Box<dyn std::error::Error>> {
    use tree_versioning::PostgresGraphStore;

    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();
    let store = match tokio::time::timeout(
        std::time::Duration::from_secs(30),
        PostgresGraphStore::from_env(),
    )
    .await
    {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            tracing::error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    store.ensure_schema().await?;
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );
    Ok(VersioningEngine::open(store, config)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let backend = std::env::var("DEMO_BACKEND").unwrap_or_else(|_| "memory".to_string());
    let config = EngineConfig::from_env();
    let run = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

    info!(version, backend = %backend, run = %run, "Starting versioning demo");
    let start = Instant::now();

    match backend.as_str() {
        #[cfg(feature = "postgres")]
        "postgres" => {
            let engine = postgres_engine(config).await?;
            run_scenario(&engine, &run).await?;
            engine.close().await;
        }
        "memory" => {
            let engine = VersioningEngine::open(InMemoryGraphStore::new(), config)?;
            run_scenario(&engine, &run).await?;
            engine.close().await;
        }
        other => return Err(format!("unsupported DEMO_BACKEND: {}", other).into()),
    }

    info!(
        latency_ms = start.elapsed().as_millis() as u64,
        "Versioning demo complete"
    );
    Ok(())
}
