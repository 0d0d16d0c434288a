//! The DPM rebalance pipeline orchestrator.
//!
//! `RebalanceEngine` is pure and synchronous: valuation, universe,
//! targets, intents, execution simulation, rules, gate, lineage. All
//! persistence and replay concerns live in the simulation service.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::model::diagnostics::{Diagnostics, warning_code};
use crate::domain::model::request::RebalanceRequest;
use crate::domain::model::result::{
    ENGINE_VERSION, LEGACY_MARKET_DATA_ID, Lineage, RebalanceResult,
};
use crate::domain::model::rules::RunStatus;
use crate::domain::model::shelf::Shelf;
use crate::domain::ports::QuadraticSolver;

use crate::application::execution::simulate_execution;
use crate::application::gate::evaluate_gate;
use crate::application::intents::generate_intents;
use crate::application::rules::evaluate_rules;
use crate::application::target::generate_targets;
use crate::application::universe::build_universe;
use crate::application::valuation::value_snapshot;

pub fn new_run_id() -> String {
    format!("run_{}", Uuid::new_v4().simple())
}

pub fn new_correlation_id() -> String {
    format!("c_{}", Uuid::new_v4().simple())
}

pub struct RebalanceEngine {
    solvers: Vec<Arc<dyn QuadraticSolver>>,
}

impl RebalanceEngine {
    pub fn new(solvers: Vec<Arc<dyn QuadraticSolver>>) -> Self {
        Self { solvers }
    }

    /// Run the full deterministic pipeline for one validated request.
    pub fn simulate(
        &self,
        request: &RebalanceRequest,
        run_id: &str,
        correlation_id: &str,
        request_hash: &str,
    ) -> RebalanceResult {
        let options = &request.options;
        let shelf = Shelf::from_entries(request.shelf.clone());

        // Valuation.
        let valuation = value_snapshot(
            &request.portfolio,
            &request.market_data,
            &shelf,
            options.valuation_mode,
            false,
        );
        let before = valuation.state;
        let mut diagnostics = Diagnostics {
            data_quality: valuation.data_quality,
            ..Diagnostics::default()
        };
        for warning in valuation.warnings {
            diagnostics.warn(&warning);
        }

        // Universe and targets.
        let universe = build_universe(&request.model, &request.portfolio, &before, &shelf, options);
        let target_stage = generate_targets(&universe, &shelf, options, &self.solvers);
        for warning in &target_stage.warnings {
            diagnostics.warn(warning);
        }

        // Intents.
        let intent_stage = generate_intents(
            &universe,
            &target_stage.target,
            &before,
            &request.portfolio,
            &request.market_data,
            &shelf,
            options,
        );
        for warning in &intent_stage.warnings {
            diagnostics.warn(warning);
        }
        diagnostics.suppressed_intents = intent_stage.suppressed;
        diagnostics.dropped_intents = intent_stage.dropped;
        diagnostics.tax_budget_constraint_events = intent_stage.tax_events;
        merge_bucket(
            &mut diagnostics.data_quality.price_missing,
            &intent_stage.price_missing,
        );
        merge_bucket(
            &mut diagnostics.data_quality.fx_missing,
            &intent_stage.fx_missing,
        );
        merge_bucket(&mut diagnostics.missing_fx_pairs, &intent_stage.missing_fx_pairs);

        // Execution simulation with FX netting.
        let execution = simulate_execution(
            &before,
            &request.market_data,
            &shelf,
            options,
            intent_stage.intents,
            true,
            false,
        );
        merge_bucket(&mut diagnostics.missing_fx_pairs, &execution.missing_fx_pairs);
        merge_bucket(
            &mut diagnostics.data_quality.price_missing,
            &execution.after_data_quality.price_missing,
        );
        merge_bucket(
            &mut diagnostics.data_quality.fx_missing,
            &execution.after_data_quality.fx_missing,
        );
        diagnostics.cash_ladder = execution.ladder_rungs.clone();
        diagnostics.cash_ladder_breaches = execution.ladder_breaches.clone();
        diagnostics.insufficient_cash = execution.uncovered_cash.clone();
        if (execution.ladder_overdraft_utilized || execution.overdraft_used)
            && execution.ladder_breaches.is_empty()
            && has_configured_overdraft(options)
        {
            diagnostics.warn(warning_code::SETTLEMENT_OVERDRAFT_UTILIZED);
        }

        // Rules and status.
        let rule_results = evaluate_rules(
            &execution.after,
            &execution,
            &diagnostics,
            options,
            target_stage.feasibility.into_iter().collect(),
        );
        let status = RunStatus::derive(&rule_results);

        // Gate.
        let gate_decision = evaluate_gate(status, &rule_results, None, &diagnostics, options);

        debug!(
            "Rebalance pipeline finished: {} intents, status {status}",
            execution.intents.len()
        );

        RebalanceResult {
            run_id: run_id.to_string(),
            correlation_id: correlation_id.to_string(),
            status,
            lineage: Lineage {
                request_hash: request_hash.to_string(),
                portfolio_snapshot_id: request
                    .portfolio
                    .snapshot_id
                    .clone()
                    .unwrap_or_else(|| request.portfolio.portfolio_id.clone()),
                market_data_snapshot_id: request
                    .market_data
                    .snapshot_id
                    .clone()
                    .unwrap_or_else(|| LEGACY_MARKET_DATA_ID.to_string()),
                engine_version: ENGINE_VERSION.to_string(),
            },
            before,
            after_simulated: execution.after,
            universe,
            target: target_stage.target,
            intents: execution.intents,
            rule_results,
            diagnostics,
            reconciliation: execution.reconciliation,
            tax_impact: intent_stage.tax_impact,
            gate_decision,
        }
    }
}

fn has_configured_overdraft(options: &crate::domain::model::options::EngineOptions) -> bool {
    options
        .max_overdraft_by_ccy
        .values()
        .any(|limit| *limit > Decimal::ZERO)
}

fn merge_bucket(into: &mut Vec<String>, from: &[String]) {
    for item in from {
        if !into.iter().any(|existing| existing == item) {
            into.push(item.clone());
        }
    }
}
