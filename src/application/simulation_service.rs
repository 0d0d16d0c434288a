//! Simulation service: wraps the pure engines with canonical hashing,
//! policy resolution, idempotent replay, and atomic persistence.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::domain::canonical::hash_canonical;
use crate::domain::errors::{CanonicalError, PolicyError, StoreError};
use crate::domain::model::policy::EffectivePolicy;
use crate::domain::model::records::{
    IdempotencyRecord, LineageEdge, LineageEdgeType, RunRecord,
};
use crate::domain::model::request::{AnalyzeRequest, ProposalRequest, RebalanceRequest};
use crate::domain::model::result::{ProposalResult, RebalanceResult};
use crate::domain::ports::SupportabilityStore;

use crate::application::advisory::{AdvisoryEngine, artifact};
use crate::application::batch::{self, AnalyzeResponse};
use crate::application::engine::{RebalanceEngine, new_run_id};
use crate::application::idempotency::{IdempotencyCheck, IdempotencyService};
use crate::application::policy::{PolicyResolver, apply_policy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMode {
    /// Canonical artifact bytes stored at simulation time.
    Persisted,
    /// Artifact rebuilt from the run record at read time.
    Derived,
}

impl ArtifactMode {
    pub fn parse_or_persisted(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DERIVED" => ArtifactMode::Derived,
            _ => ArtifactMode::Persisted,
        }
    }
}

/// Header-derived request context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub correlation_id: String,
    pub idempotency_key: Option<String>,
    pub policy_pack_id: Option<String>,
    pub tenant_policy_pack_id: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

#[derive(Debug)]
pub enum SimulateOutcome {
    Fresh(Box<RebalanceResult>),
    Replay(serde_json::Value),
}

pub enum ProposalOutcome {
    Fresh(Box<ProposalResult>),
    Replay(serde_json::Value),
}

pub struct SimulationService {
    engine: RebalanceEngine,
    advisory: AdvisoryEngine,
    store: Arc<dyn SupportabilityStore>,
    idempotency: IdempotencyService,
    policy: PolicyResolver,
    artifact_mode: ArtifactMode,
}

impl SimulationService {
    pub fn new(
        engine: RebalanceEngine,
        advisory: AdvisoryEngine,
        store: Arc<dyn SupportabilityStore>,
        idempotency: IdempotencyService,
        policy: PolicyResolver,
        artifact_mode: ArtifactMode,
    ) -> Self {
        Self {
            engine,
            advisory,
            store,
            idempotency,
            policy,
            artifact_mode,
        }
    }

    pub fn store(&self) -> &Arc<dyn SupportabilityStore> {
        &self.store
    }

    pub fn policy_resolver(&self) -> &PolicyResolver {
        &self.policy
    }

    pub fn resolve_policy(&self, ctx: &RequestContext) -> Result<EffectivePolicy, PolicyError> {
        self.policy.resolve(
            ctx.policy_pack_id.as_deref(),
            ctx.tenant_policy_pack_id.as_deref(),
            ctx.tenant_id.as_deref(),
        )
    }

    /// Idempotent DPM simulation: hash, replay check, pipeline, atomic
    /// persistence (run + idempotency + lineage), artifact.
    pub async fn simulate_rebalance(
        &self,
        mut request: RebalanceRequest,
        ctx: &RequestContext,
    ) -> Result<SimulateOutcome, ServiceError> {
        let request_hash = hash_canonical(&request)?;
        let policy = self.resolve_policy(ctx)?;

        if let Some(key) = &ctx.idempotency_key {
            let check = self
                .idempotency
                .check(
                    &self.store,
                    key,
                    &request_hash,
                    policy.replay_enabled_override(),
                )
                .await?;
            match check {
                IdempotencyCheck::Replay(response) => {
                    info!("Replaying idempotent response for key {key}");
                    return Ok(SimulateOutcome::Replay(response));
                }
                IdempotencyCheck::Conflict => {
                    return Err(StoreError::IdempotencyConflict { key: key.clone() }.into());
                }
                IdempotencyCheck::Miss => {}
            }
        }

        request.options = apply_policy(&request.options, &policy);

        let run_id = new_run_id();
        let result = self
            .engine
            .simulate(&request, &run_id, &ctx.correlation_id, &request_hash);
        let result_json = serde_json::to_value(&result).map_err(StoreError::Serialization)?;

        self.persist_run(
            &run_id,
            &result.status.to_string(),
            &request.portfolio.portfolio_id,
            &request_hash,
            ctx,
            &result_json,
        )
        .await?;

        if let Some(key) = &ctx.idempotency_key {
            self.idempotency.record(key, &request_hash, &result_json).await;
        }

        Ok(SimulateOutcome::Fresh(Box::new(result)))
    }

    /// Advisory proposal simulation with the same persistence shape.
    pub async fn simulate_proposal(
        &self,
        mut request: ProposalRequest,
        ctx: &RequestContext,
    ) -> Result<ProposalOutcome, ServiceError> {
        let request_hash = hash_canonical(&request)?;
        let policy = self.resolve_policy(ctx)?;

        if let Some(key) = &ctx.idempotency_key {
            let check = self
                .idempotency
                .check(
                    &self.store,
                    key,
                    &request_hash,
                    policy.replay_enabled_override(),
                )
                .await?;
            match check {
                IdempotencyCheck::Replay(response) => {
                    return Ok(ProposalOutcome::Replay(response));
                }
                IdempotencyCheck::Conflict => {
                    return Err(StoreError::IdempotencyConflict { key: key.clone() }.into());
                }
                IdempotencyCheck::Miss => {}
            }
        }

        request.options = apply_policy(&request.options, &policy);

        let run_id = new_run_id();
        let result = self
            .advisory
            .simulate(&request, &run_id, &ctx.correlation_id, &request_hash);
        let result_json = serde_json::to_value(&result).map_err(StoreError::Serialization)?;

        self.persist_run(
            &run_id,
            &result.status.to_string(),
            &request.portfolio.portfolio_id,
            &request_hash,
            ctx,
            &result_json,
        )
        .await?;

        if let Some(key) = &ctx.idempotency_key {
            self.idempotency.record(key, &request_hash, &result_json).await;
        }

        Ok(ProposalOutcome::Fresh(Box::new(result)))
    }

    /// Batch analysis. Scenario runs are what-if evaluations and are not
    /// persisted as runs.
    pub fn analyze(
        &self,
        request: &AnalyzeRequest,
        ctx: &RequestContext,
    ) -> Result<AnalyzeResponse, ServiceError> {
        let request_hash = hash_canonical(request)?;
        Ok(batch::analyze(
            &self.engine,
            request,
            &ctx.correlation_id,
            &request_hash,
        ))
    }

    /// Fetch (or derive) the artifact for a persisted run.
    pub async fn run_artifact(
        &self,
        run_id: &str,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        if let Some(stored) = self.store.get_run_artifact(run_id).await? {
            return Ok(Some(stored));
        }
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(None);
        };
        let derived = artifact::build_artifact(&run.result_json, &run.request_hash, run.created_at)?;
        Ok(Some(derived))
    }

    async fn persist_run(
        &self,
        run_id: &str,
        status: &str,
        portfolio_id: &str,
        request_hash: &str,
        ctx: &RequestContext,
        result_json: &serde_json::Value,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let run = RunRecord {
            rebalance_run_id: run_id.to_string(),
            correlation_id: ctx.correlation_id.clone(),
            request_hash: request_hash.to_string(),
            idempotency_key: ctx.idempotency_key.clone(),
            portfolio_id: portfolio_id.to_string(),
            status: status.to_string(),
            created_at: now,
            result_json: result_json.clone(),
        };

        let idempotency = ctx.idempotency_key.as_ref().map(|key| IdempotencyRecord {
            idempotency_key: key.clone(),
            request_hash: request_hash.to_string(),
            run_id: run_id.to_string(),
            created_at: now,
        });

        let mut lineage = vec![LineageEdge {
            source_entity_id: ctx.correlation_id.clone(),
            edge_type: LineageEdgeType::CorrelationToRun,
            target_entity_id: run_id.to_string(),
            created_at: now,
            metadata: None,
        }];
        if let Some(key) = &ctx.idempotency_key {
            lineage.push(LineageEdge {
                source_entity_id: key.clone(),
                edge_type: LineageEdgeType::IdempotencyToRun,
                target_entity_id: run_id.to_string(),
                created_at: now,
                metadata: None,
            });
        }

        self.store
            .save_run(&run, idempotency.as_ref(), &lineage)
            .await?;

        if self.artifact_mode == ArtifactMode::Persisted {
            let built = artifact::build_artifact(result_json, request_hash, now)?;
            self.store.save_run_artifact(run_id, &built).await?;
        }

        info!("Run {run_id} persisted (status {status})");
        Ok(())
    }
}
