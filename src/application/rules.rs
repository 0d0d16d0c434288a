//! Hard/soft compliance evaluation against the simulated after-state.
//!
//! Each check produces a `RuleResult`; none of them aborts the pipeline.
//! Checks with no configured threshold are skipped rather than emitted as
//! vacuous passes.

use rust_decimal::Decimal;

use crate::application::execution::ExecutionOutcome;
use crate::domain::model::diagnostics::Diagnostics;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::result::ReconciliationStatus;
use crate::domain::model::rules::{RuleResult, RuleSeverity, rule_id};
use crate::domain::model::state::SimulatedState;

pub mod reason_code {
    pub const SELL_EXCEEDS_HOLDINGS: &str = "SELL_EXCEEDS_HOLDINGS";
    pub const VALUE_MISMATCH: &str = "VALUE_MISMATCH";
    pub const MISSING_PRICES: &str = "MISSING_PRICES";
    pub const MISSING_FX: &str = "MISSING_FX";
    pub const INSUFFICIENT_CASH: &str = "INSUFFICIENT_CASH";
    pub const CASH_BELOW_BAND: &str = "CASH_BELOW_BAND";
    pub const CASH_ABOVE_BAND: &str = "CASH_ABOVE_BAND";
    pub const POSITION_ABOVE_MAX: &str = "POSITION_ABOVE_MAX";
}

pub fn evaluate_rules(
    after: &SimulatedState,
    execution: &ExecutionOutcome,
    diagnostics: &Diagnostics,
    options: &EngineOptions,
    upstream_failures: Vec<RuleResult>,
) -> Vec<RuleResult> {
    let mut results = upstream_failures;

    // CASH_BAND (soft): only when a band is configured.
    if options.cash_band_min_weight.is_some() || options.cash_band_max_weight.is_some() {
        let cash_weight = after.cash_weight();
        let min = options.cash_band_min_weight.unwrap_or(Decimal::ZERO);
        let max = options.cash_band_max_weight.unwrap_or(Decimal::ONE);
        if cash_weight < min {
            results.push(RuleResult::fail(
                rule_id::CASH_BAND,
                RuleSeverity::Soft,
                format!("Cash weight {} below band minimum {min}", cash_weight.round_dp(6)),
                vec![reason_code::CASH_BELOW_BAND.to_string()],
            ));
        } else if cash_weight > max {
            results.push(RuleResult::fail(
                rule_id::CASH_BAND,
                RuleSeverity::Soft,
                format!("Cash weight {} above band maximum {max}", cash_weight.round_dp(6)),
                vec![reason_code::CASH_ABOVE_BAND.to_string()],
            ));
        } else {
            results.push(RuleResult::pass(
                rule_id::CASH_BAND,
                RuleSeverity::Soft,
                format!("Cash weight {} within band", cash_weight.round_dp(6)),
            ));
        }
    }

    // SINGLE_POSITION_MAX (hard): compliance threshold, distinct from the
    // targeting cap.
    if let Some(limit) = options.suitability.single_position_max_weight {
        let breaches: Vec<String> = after
            .positions
            .iter()
            .filter(|p| p.weight > limit)
            .map(|p| p.instrument_id.clone())
            .collect();
        if breaches.is_empty() {
            results.push(RuleResult::pass(
                rule_id::SINGLE_POSITION_MAX,
                RuleSeverity::Hard,
                format!("All positions within {limit}"),
            ));
        } else {
            results.push(
                RuleResult::fail(
                    rule_id::SINGLE_POSITION_MAX,
                    RuleSeverity::Hard,
                    format!("Positions above {limit}: {}", breaches.join(", ")),
                    vec![reason_code::POSITION_ABOVE_MAX.to_string()],
                )
                .with_details(serde_json::json!({ "instruments": breaches })),
            );
        }
    }

    // DATA_QUALITY (hard when blocking flags are set).
    if options.block_on_missing_prices || options.block_on_missing_fx {
        let mut reason_codes = Vec::new();
        if options.block_on_missing_prices && !diagnostics.data_quality.price_missing.is_empty() {
            reason_codes.push(reason_code::MISSING_PRICES.to_string());
        }
        if options.block_on_missing_fx && !diagnostics.data_quality.fx_missing.is_empty() {
            reason_codes.push(reason_code::MISSING_FX.to_string());
        }
        if reason_codes.is_empty() {
            results.push(RuleResult::pass(
                rule_id::DATA_QUALITY,
                RuleSeverity::Hard,
                "Market data complete for all holdings",
            ));
        } else {
            results.push(
                RuleResult::fail(
                    rule_id::DATA_QUALITY,
                    RuleSeverity::Hard,
                    "Market data incomplete",
                    reason_codes,
                )
                .with_details(serde_json::json!({
                    "price_missing": diagnostics.data_quality.price_missing,
                    "fx_missing": diagnostics.data_quality.fx_missing,
                })),
            );
        }
    }

    // MIN_TRADE_SIZE (informational pass when dust was suppressed).
    if !diagnostics.suppressed_intents.is_empty() {
        results.push(RuleResult::pass(
            rule_id::MIN_TRADE_SIZE,
            RuleSeverity::Info,
            format!(
                "{} intent(s) suppressed below minimum trade size",
                diagnostics.suppressed_intents.len()
            ),
        ));
    }

    // NO_SHORTING (hard, always evaluated).
    if execution.negative_holdings.is_empty() {
        results.push(RuleResult::pass(
            rule_id::NO_SHORTING,
            RuleSeverity::Hard,
            "No holding goes negative",
        ));
    } else {
        results.push(
            RuleResult::fail(
                rule_id::NO_SHORTING,
                RuleSeverity::Hard,
                format!(
                    "Holdings would go negative: {}",
                    execution.negative_holdings.join(", ")
                ),
                vec![reason_code::SELL_EXCEEDS_HOLDINGS.to_string()],
            )
            .with_details(serde_json::json!({
                "instruments": execution.negative_holdings,
            })),
        );
    }

    // INSUFFICIENT_CASH (hard): uncovered end balances or ladder breaches.
    let mut cash_reasons: Vec<String> = Vec::new();
    if !execution.uncovered_cash.is_empty() {
        cash_reasons.push(reason_code::INSUFFICIENT_CASH.to_string());
    }
    for breach in &execution.ladder_breaches {
        if !cash_reasons.contains(&breach.reason) {
            cash_reasons.push(breach.reason.clone());
        }
    }
    if cash_reasons.is_empty() {
        results.push(RuleResult::pass(
            rule_id::INSUFFICIENT_CASH,
            RuleSeverity::Hard,
            "Projected cash stays within allowed overdraft",
        ));
    } else {
        results.push(
            RuleResult::fail(
                rule_id::INSUFFICIENT_CASH,
                RuleSeverity::Hard,
                "Projected cash falls below the allowed overdraft",
                cash_reasons,
            )
            .with_details(serde_json::json!({
                "currencies": execution.uncovered_cash,
                "ladder_breaches": execution.ladder_breaches.len(),
            })),
        );
    }

    // RECONCILIATION (hard, always evaluated).
    match execution.reconciliation.status {
        ReconciliationStatus::Ok => results.push(RuleResult::pass(
            rule_id::RECONCILIATION,
            RuleSeverity::Hard,
            "Value conserved within tolerance",
        )),
        ReconciliationStatus::Mismatch => results.push(RuleResult::fail(
            rule_id::RECONCILIATION,
            RuleSeverity::Hard,
            format!(
                "Value delta {} exceeds tolerance {}",
                execution.reconciliation.delta, execution.reconciliation.tolerance
            ),
            vec![reason_code::VALUE_MISMATCH.to_string()],
        )),
    }

    results
}
