//! Prometheus metrics definitions.
//!
//! All metrics use the `rebalancer_` prefix and are exposed read-only at
//! `GET /metrics`.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Runs by pipeline (dpm/advisory) and resulting status
    pub runs_total: CounterVec,
    /// Idempotent replays served from cache or store
    pub idempotent_replays_total: CounterVec,
    /// Idempotency conflicts returned as 409
    pub idempotency_conflicts_total: CounterVec,
    /// Async operations by type and terminal status
    pub async_operations_total: CounterVec,
    /// Workflow decisions by action
    pub workflow_decisions_total: CounterVec,
    /// Pipeline latency in seconds, by pipeline
    pub pipeline_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with all counters registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let runs_total = CounterVec::new(
            Opts::new("rebalancer_runs_total", "Simulation runs by pipeline and status"),
            &["pipeline", "status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let idempotent_replays_total = CounterVec::new(
            Opts::new(
                "rebalancer_idempotent_replays_total",
                "Responses served via idempotent replay",
            ),
            &["pipeline"],
        )?;
        registry.register(Box::new(idempotent_replays_total.clone()))?;

        let idempotency_conflicts_total = CounterVec::new(
            Opts::new(
                "rebalancer_idempotency_conflicts_total",
                "Requests rejected with an idempotency conflict",
            ),
            &["pipeline"],
        )?;
        registry.register(Box::new(idempotency_conflicts_total.clone()))?;

        let async_operations_total = CounterVec::new(
            Opts::new(
                "rebalancer_async_operations_total",
                "Async operations by type and terminal status",
            ),
            &["operation_type", "status"],
        )?;
        registry.register(Box::new(async_operations_total.clone()))?;

        let workflow_decisions_total = CounterVec::new(
            Opts::new(
                "rebalancer_workflow_decisions_total",
                "Workflow decisions by action",
            ),
            &["action"],
        )?;
        registry.register(Box::new(workflow_decisions_total.clone()))?;

        let pipeline_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "rebalancer_pipeline_latency_seconds",
                "Pipeline latency in seconds",
            ),
            &["pipeline"],
        )?;
        registry.register(Box::new(pipeline_latency_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            runs_total,
            idempotent_replays_total,
            idempotency_conflicts_total,
            async_operations_total,
            workflow_decisions_total,
            pipeline_latency_seconds,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}
