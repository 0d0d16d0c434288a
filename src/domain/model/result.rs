use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::model::diagnostics::Diagnostics;
use crate::domain::model::drift::DriftAnalysis;
use crate::domain::model::gate::GateDecision;
use crate::domain::model::intent::Intent;
use crate::domain::model::rules::{RuleResult, RunStatus};
use crate::domain::model::state::SimulatedState;
use crate::domain::model::suitability::SuitabilityReport;
use crate::domain::model::target::{TargetSet, Universe};

/// Engine version stamped into lineage; bumped with the crate.
pub const ENGINE_VERSION: &str = concat!("rebalancer/", env!("CARGO_PKG_VERSION"));

/// Legacy lineage fallback for market data submitted without a snapshot id.
pub const LEGACY_MARKET_DATA_ID: &str = "md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Ok,
    Mismatch,
}

/// Value-conservation check between the before and after states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub before_total: Decimal,
    pub after_total: Decimal,
    pub delta: Decimal,
    pub tolerance: Decimal,
    pub status: ReconciliationStatus,
}

impl Reconciliation {
    /// `tolerance = 0.5 + before_total * 0.0005`, in base currency units.
    pub fn evaluate(before_total: Decimal, after_total: Decimal) -> Self {
        let tolerance = Decimal::new(5, 1) + before_total.abs() * Decimal::new(5, 4);
        let delta = after_total - before_total;
        let status = if delta.abs() <= tolerance {
            ReconciliationStatus::Ok
        } else {
            ReconciliationStatus::Mismatch
        };
        Self {
            before_total,
            after_total,
            delta,
            tolerance,
            status,
        }
    }
}

/// Realized-gain summary for tax-aware runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxImpact {
    pub total_realized_gain: Decimal,
    pub total_realized_loss: Decimal,
    pub lots_consumed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Decimal>,
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
    pub request_hash: String,
    pub portfolio_snapshot_id: String,
    pub market_data_snapshot_id: String,
    pub engine_version: String,
}

/// Structured comparison attached when both target methods run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMethodComparison {
    pub primary_method: String,
    pub secondary_method: String,
    pub primary_status: String,
    pub secondary_status: String,
    pub max_weight_divergence: Decimal,
    pub tolerance: Decimal,
    pub diverged_instruments: Vec<String>,
}

/// The auditable bundle returned by a DPM simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub run_id: String,
    pub correlation_id: String,
    pub status: RunStatus,
    pub before: SimulatedState,
    pub after_simulated: SimulatedState,
    pub universe: Universe,
    pub target: TargetSet,
    pub intents: Vec<Intent>,
    pub rule_results: Vec<RuleResult>,
    pub diagnostics: Diagnostics,
    pub reconciliation: Reconciliation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_impact: Option<TaxImpact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_decision: Option<GateDecision>,
    pub lineage: Lineage,
}

/// The auditable bundle returned by an advisory proposal simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResult {
    pub run_id: String,
    pub correlation_id: String,
    pub status: RunStatus,
    pub before: SimulatedState,
    pub after_simulated: SimulatedState,
    pub intents: Vec<Intent>,
    pub rule_results: Vec<RuleResult>,
    pub diagnostics: Diagnostics,
    pub reconciliation: Reconciliation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_analysis: Option<DriftAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suitability: Option<SuitabilityReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_decision: Option<GateDecision>,
    pub lineage: Lineage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reconciliation_tolerance_formula() {
        let recon = Reconciliation::evaluate(dec!(100000), dec!(100050));
        // tolerance = 0.5 + 100000 * 0.0005 = 50.5
        assert_eq!(recon.tolerance, dec!(50.5));
        assert_eq!(recon.status, ReconciliationStatus::Ok);

        let recon = Reconciliation::evaluate(dec!(100000), dec!(100051));
        assert_eq!(recon.status, ReconciliationStatus::Mismatch);
    }

    #[test]
    fn test_reconciliation_zero_portfolio() {
        let recon = Reconciliation::evaluate(Decimal::ZERO, dec!(0.4));
        assert_eq!(recon.tolerance, dec!(0.5));
        assert_eq!(recon.status, ReconciliationStatus::Ok);
    }
}
