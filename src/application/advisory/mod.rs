//! Advisory proposal pipeline: manual intents, auto-funding, drift,
//! suitability, and artifact packaging.

pub mod artifact;
pub mod drift;
pub mod funding;
pub mod suitability;

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::model::diagnostics::Diagnostics;
use crate::domain::model::intent::{Intent, Rationale, TradeSide, rationale_code};
use crate::domain::model::request::ProposalRequest;
use crate::domain::model::result::{
    ENGINE_VERSION, LEGACY_MARKET_DATA_ID, Lineage, ProposalResult, Reconciliation,
};
use crate::domain::model::rules::{RuleResult, RuleSeverity, RunStatus};
use crate::domain::model::shelf::Shelf;
use crate::domain::money::Money;

use crate::application::execution::simulate_execution;
use crate::application::gate::evaluate_gate;
use crate::application::rules::evaluate_rules;
use crate::application::valuation::value_snapshot;

use self::suitability::AttemptedBuy;

pub const PROPOSAL_FUNDING_RULE: &str = "PROPOSAL_FUNDING";
pub const PROPOSAL_MISSING_FX_FOR_FUNDING: &str = "PROPOSAL_MISSING_FX_FOR_FUNDING";
pub const SELL_NOT_PERMITTED: &str = "SELL_NOT_PERMITTED";

pub struct AdvisoryEngine;

impl AdvisoryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn simulate(
        &self,
        request: &ProposalRequest,
        run_id: &str,
        correlation_id: &str,
        request_hash: &str,
    ) -> ProposalResult {
        let options = &request.options;
        let shelf = Shelf::from_entries(request.shelf.clone());
        let base = request.portfolio.base_currency.clone();

        let valuation = value_snapshot(
            &request.portfolio,
            &request.market_data,
            &shelf,
            options.valuation_mode,
            true,
        );
        let before = valuation.state;
        let mut diagnostics = Diagnostics {
            data_quality: valuation.data_quality,
            ..Diagnostics::default()
        };
        for warning in valuation.warnings {
            diagnostics.warn(&warning);
        }

        let lineage = Lineage {
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
        };

        // Cash-flow intents, in input order.
        let cash_flow_intents: Vec<Intent> = request
            .cash_flows
            .iter()
            .enumerate()
            .map(|(index, flow)| Intent::CashFlow {
                intent_id: Intent::cash_flow_id(index),
                currency: flow.currency.clone(),
                amount: flow.amount,
                description: flow.description.clone(),
            })
            .collect();

        // Duplicate (instrument, side) instructions collapse into one
        // intent; intent ids are derived from that pair.
        let mut aggregated_trades: Vec<crate::domain::model::request::ManualTrade> = Vec::new();
        for trade in &request.trades {
            match aggregated_trades
                .iter_mut()
                .find(|t| t.instrument_id == trade.instrument_id && t.side == trade.side)
            {
                Some(existing) => existing.quantity += trade.quantity,
                None => aggregated_trades.push(trade.clone()),
            }
        }

        // Manual trades, with governance screening for disallowed buys.
        let mut trade_intents: Vec<Intent> = Vec::new();
        let mut attempted_buys: Vec<AttemptedBuy> = Vec::new();
        for trade in &aggregated_trades {
            let shelf_entry = shelf.get(&trade.instrument_id);
            match trade.side {
                TradeSide::Buy => {
                    let allowed = shelf_entry
                        .map(|e| e.buy_allowed(options.allow_restricted))
                        .unwrap_or(false);
                    if !allowed {
                        attempted_buys.push(AttemptedBuy {
                            instrument_id: trade.instrument_id.clone(),
                            status: shelf_entry.map(|e| e.status),
                        });
                        continue;
                    }
                }
                TradeSide::Sell => {
                    let allowed = shelf_entry
                        .map(|e| e.sell_allowed(options.allow_restricted))
                        .unwrap_or(true);
                    if !allowed {
                        diagnostics.warn(SELL_NOT_PERMITTED);
                        continue;
                    }
                }
            }

            let Some(price) = request.market_data.price(&trade.instrument_id) else {
                if !diagnostics
                    .data_quality
                    .price_missing
                    .contains(&trade.instrument_id)
                {
                    diagnostics
                        .data_quality
                        .price_missing
                        .push(trade.instrument_id.clone());
                }
                continue;
            };
            let Some(rate_to_base) = request.market_data.rate(&price.currency, &base) else {
                let pair = format!("{}/{base}", price.currency);
                if !diagnostics.missing_fx_pairs.contains(&pair) {
                    diagnostics.missing_fx_pairs.push(pair);
                }
                if !diagnostics
                    .data_quality
                    .fx_missing
                    .contains(&trade.instrument_id)
                {
                    diagnostics
                        .data_quality
                        .fx_missing
                        .push(trade.instrument_id.clone());
                }
                continue;
            };

            let quantity = match trade.side {
                TradeSide::Sell => {
                    let held = request
                        .portfolio
                        .position(&trade.instrument_id)
                        .map(|p| p.quantity)
                        .unwrap_or(Decimal::ZERO);
                    trade.quantity.min(held.max(Decimal::ZERO))
                }
                TradeSide::Buy => trade.quantity,
            };
            if quantity <= Decimal::ZERO {
                continue;
            }

            let notional = quantity * price.amount;
            trade_intents.push(Intent::SecurityTrade {
                intent_id: Intent::security_trade_id(trade.side, &trade.instrument_id),
                instrument_id: trade.instrument_id.clone(),
                side: trade.side,
                quantity,
                notional: Money::new(notional, price.currency.clone()),
                notional_base: notional * rate_to_base,
                dependencies: vec![],
                rationale: Rationale::new(
                    rationale_code::ADVISOR_INSTRUCTION,
                    trade.note.clone().unwrap_or_else(|| {
                        format!("Advisor instruction: {} {}", trade.side, trade.instrument_id)
                    }),
                ),
                constraints_applied: vec![],
            });
        }

        if !options.enable_proposal_simulation {
            // Packaging-only mode: no simulation, no rules.
            let mut intents = cash_flow_intents;
            intents.extend(trade_intents);
            return ProposalResult {
                run_id: run_id.to_string(),
                correlation_id: correlation_id.to_string(),
                status: RunStatus::Ready,
                after_simulated: before.clone(),
                before,
                intents,
                rule_results: vec![],
                diagnostics,
                reconciliation: Reconciliation::evaluate(Decimal::ZERO, Decimal::ZERO),
                drift_analysis: None,
                suitability: None,
                gate_decision: None,
                lineage,
            };
        }

        // Auto-funding over available cash.
        let mut upstream_failures: Vec<RuleResult> = Vec::new();
        let mut fx_intents: Vec<Intent> = Vec::new();
        if options.auto_funding {
            let mut available: BTreeMap<String, Decimal> = BTreeMap::new();
            for balance in &before.cash_balances {
                *available.entry(balance.currency.clone()).or_default() += balance.amount;
            }
            if options.proposal_apply_cash_flows_first {
                for flow in &request.cash_flows {
                    *available.entry(flow.currency.clone()).or_default() += flow.amount;
                }
            }

            let funding = funding::plan_auto_funding(
                &trade_intents,
                &available,
                &base,
                &request.market_data,
                options,
            );
            for intent in trade_intents.iter_mut() {
                if let Intent::SecurityTrade {
                    intent_id,
                    dependencies,
                    ..
                } = intent
                {
                    if let Some(deps) = funding.dependencies.get(intent_id) {
                        dependencies.extend(deps.iter().cloned());
                    }
                }
            }
            for pair in &funding.missing_fx_pairs {
                if !diagnostics.missing_fx_pairs.contains(pair) {
                    diagnostics.missing_fx_pairs.push(pair.clone());
                }
            }
            diagnostics.funding_plan = funding.funding_plan;
            fx_intents = funding.fx_intents;

            if !diagnostics.missing_fx_pairs.is_empty() && options.block_on_missing_fx {
                upstream_failures.push(RuleResult::fail(
                    PROPOSAL_FUNDING_RULE,
                    RuleSeverity::Hard,
                    format!(
                        "FX rates unavailable for funding: {}",
                        diagnostics.missing_fx_pairs.join(", ")
                    ),
                    vec![PROPOSAL_MISSING_FX_FOR_FUNDING.to_string()],
                ));
            }
        }

        let mut all_intents = cash_flow_intents;
        all_intents.extend(trade_intents);
        all_intents.extend(fx_intents);

        let mut execution = simulate_execution(
            &before,
            &request.market_data,
            &shelf,
            options,
            all_intents,
            false,
            true,
        );
        diagnostics.insufficient_cash = execution.uncovered_cash.clone();
        if !options.proposal_block_negative_cash {
            // Negative projected cash is tolerated; the diagnostic stays.
            execution.uncovered_cash.clear();
        }
        diagnostics.cash_ladder = execution.ladder_rungs.clone();
        diagnostics.cash_ladder_breaches = execution.ladder_breaches.clone();

        let rule_results = evaluate_rules(
            &execution.after,
            &execution,
            &diagnostics,
            options,
            upstream_failures,
        );
        let status = RunStatus::derive(&rule_results);

        let drift_analysis = request
            .reference_model
            .as_ref()
            .map(|reference| drift::analyze_drift(reference, &before, &execution.after));

        let suitability_report = suitability::scan(
            &before,
            &execution.after,
            &shelf,
            options,
            &attempted_buys,
            &diagnostics.data_quality,
        );

        let gate_decision = evaluate_gate(
            status,
            &rule_results,
            Some(&suitability_report),
            &diagnostics,
            options,
        );

        debug!(
            "Proposal pipeline finished: {} intents, status {status}",
            execution.intents.len()
        );

        ProposalResult {
            run_id: run_id.to_string(),
            correlation_id: correlation_id.to_string(),
            status,
            before,
            after_simulated: execution.after,
            intents: execution.intents,
            rule_results,
            diagnostics,
            reconciliation: execution.reconciliation,
            drift_analysis,
            suitability: Some(suitability_report),
            gate_decision,
            lineage,
        }
    }
}

impl Default for AdvisoryEngine {
    fn default() -> Self {
        Self::new()
    }
}
