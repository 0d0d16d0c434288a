//! Rebalancer server: the deterministic portfolio decisioning service.
//!
//! Serves the DPM and advisory simulation pipelines plus the
//! supportability surface over HTTP. Persistence adapters are selected
//! from the environment; PRODUCTION profiles refuse non-Postgres
//! backends before the listener starts.
//!
//! # Usage
//! ```sh
//! DPM_SUPPORTABILITY_STORE_BACKEND=SQLITE cargo run --bin server
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

use rebalancer::application::advisory::AdvisoryEngine;
use rebalancer::application::async_ops::{AsyncOperationManager, ExecutionMode};
use rebalancer::application::engine::RebalanceEngine;
use rebalancer::application::idempotency::IdempotencyService;
use rebalancer::application::policy::PolicyResolver;
use rebalancer::application::proposal_lifecycle::ProposalLifecycleService;
use rebalancer::application::simulation_service::{ArtifactMode, SimulationService};
use rebalancer::application::workflow::WorkflowService;
use rebalancer::config::{Config, ProposalBackend, StoreBackend};
use rebalancer::domain::ports::{ProposalStore, SupportabilityStore};
use rebalancer::infrastructure::observability::Metrics;
use rebalancer::infrastructure::persistence::database::Database;
use rebalancer::infrastructure::persistence::memory_proposal_store::MemoryProposalStore;
use rebalancer::infrastructure::persistence::memory_store::MemoryStore;
use rebalancer::infrastructure::persistence::policy_catalog::load_policy_catalog;
use rebalancer::infrastructure::persistence::sql_proposal_store::SqlProposalStore;
use rebalancer::infrastructure::persistence::sql_store::SqlStore;
use rebalancer::infrastructure::solver::default_solvers;
use rebalancer::interfaces::http::{AppState, build_router};

/// Rebalancer API server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server port (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                args.log_level
                    .parse()
                    .unwrap_or_else(|_| Level::INFO.into()),
            ),
        )
        .with(stdout_layer)
        .init();

    info!("Rebalancer server {} starting...", env!("CARGO_PKG_VERSION"));

    // Guardrails run inside from_env; a PRODUCTION misconfiguration exits
    // here with its reason code.
    let config = Arc::new(Config::from_env()?);
    info!(
        "Configuration loaded: profile {:?}, store backend {:?}",
        config.profile, config.supportability.backend
    );

    let state = build_state(config.clone()).await?;

    if config.async_ops.enabled {
        let manager = state.async_ops.clone();
        let interval = config.async_ops.sweep_interval_seconds;
        tokio::spawn(async move {
            manager.run_sweeper(interval).await;
        });
        info!("Async operation sweeper started (interval: {interval}s)");
    }

    // Daily retention sweep over runs and their derived records.
    {
        let store = state.store.clone();
        let retention_days = config.supportability.retention_days;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
            loop {
                ticker.tick().await;
                match store.purge_expired_runs(retention_days).await {
                    Ok(purged) if purged > 0 => {
                        info!("Retention sweep purged {purged} run(s)");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!("Retention sweep failed: {err}"),
                }
            }
        });
    }

    let app = build_router(state);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{port}", config.server.bind)
        .parse()
        .context("Invalid bind address")?;
    info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_state(config: Arc<Config>) -> Result<AppState> {
    let store = build_supportability_store(&config).await?;
    let proposal_store = build_proposal_store(&config).await?;
    let policy = build_policy_resolver(&config).await?;

    let engine = RebalanceEngine::new(default_solvers());
    let idempotency = IdempotencyService::new(
        config.supportability.idempotency_cache_max_size,
        config.supportability.idempotency_replay_enabled,
    );
    let simulation = Arc::new(SimulationService::new(
        engine,
        AdvisoryEngine::new(),
        store.clone(),
        idempotency,
        policy,
        ArtifactMode::parse_or_persisted(&config.supportability.artifact_mode),
    ));

    let async_ops = Arc::new(AsyncOperationManager::new(
        store.clone(),
        ExecutionMode::parse_or_inline(&config.async_ops.execution_mode),
        config.async_ops.ttl_seconds,
        config.async_ops.manual_execution_enabled,
    ));

    let workflow = Arc::new(WorkflowService::new(
        store.clone(),
        config.workflow.requires_review_statuses.clone(),
    ));

    let proposals = Arc::new(ProposalLifecycleService::new(
        proposal_store,
        config.proposal.require_expected_state,
        config.proposal.allow_portfolio_change_on_new_version,
        config.proposal.require_simulation,
        config.proposal.store_evidence_bundle,
    ));

    let metrics = Metrics::new()?;

    Ok(AppState {
        config,
        simulation,
        store,
        async_ops,
        workflow,
        proposals,
        metrics,
    })
}

async fn build_supportability_store(config: &Config) -> Result<Arc<dyn SupportabilityStore>> {
    match config.supportability.backend {
        StoreBackend::InMemory => {
            info!("Supportability store: in-memory");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let database = Database::connect_sqlite(&config.supportability.sqlite_path).await?;
            let store = SqlStore::new(database);
            store.migrate().await.context("DPM migrations failed")?;
            info!("Supportability store: SQLite");
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let dsn = config
                .supportability
                .postgres_dsn
                .as_deref()
                .context("DPM_SUPPORTABILITY_POSTGRES_DSN is required")?;
            let database = Database::connect_postgres(dsn).await?;
            let store = SqlStore::new(database);
            store.migrate().await.context("DPM migrations failed")?;
            info!("Supportability store: Postgres");
            Ok(Arc::new(store))
        }
    }
}

async fn build_proposal_store(config: &Config) -> Result<Arc<dyn ProposalStore>> {
    match config.proposal.backend {
        ProposalBackend::InMemory => {
            info!("Proposal store: in-memory");
            Ok(Arc::new(MemoryProposalStore::new()))
        }
        ProposalBackend::Postgres => {
            let dsn = config
                .proposal
                .postgres_dsn
                .as_deref()
                .context("PROPOSAL_POSTGRES_DSN is required")?;
            let database = Database::connect_postgres(dsn).await?;
            let store = SqlProposalStore::new(database);
            store.migrate().await.context("Proposal migrations failed")?;
            info!("Proposal store: Postgres");
            Ok(Arc::new(store))
        }
    }
}

async fn build_policy_resolver(config: &Config) -> Result<PolicyResolver> {
    if !config.policy.enabled {
        return Ok(PolicyResolver::disabled());
    }

    let catalog = match config.policy.catalog_backend.as_str() {
        "POSTGRES" => {
            let dsn = config
                .policy
                .postgres_dsn
                .as_deref()
                .context("DPM_POLICY_PACK_POSTGRES_DSN is required")?;
            let database = Database::connect_postgres(dsn).await?;
            load_policy_catalog(&database)
                .await
                .context("Failed to load policy catalog")?
        }
        _ => match &config.policy.catalog_json {
            Some(json) => PolicyResolver::parse_catalog(json)
                .map_err(|e| anyhow::anyhow!(e.to_string()))
                .context("Failed to parse DPM_POLICY_PACK_CATALOG_JSON")?,
            None => BTreeMap::new(),
        },
    };

    let tenant_map: BTreeMap<String, String> = match &config.policy.tenant_map_json {
        Some(json) => serde_json::from_str(json)
            .context("Failed to parse DPM_TENANT_POLICY_PACK_MAP_JSON")?,
        None => BTreeMap::new(),
    };

    info!("Policy packs enabled ({} pack(s) loaded)", catalog.len());
    Ok(PolicyResolver::new(
        true,
        catalog,
        config.policy.default_pack_id.clone(),
        config.policy.tenant_resolution_enabled,
        tenant_map,
    ))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install ctrl-c handler");
    info!("Shutdown signal received");
}
