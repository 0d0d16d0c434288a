use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::model::intent::{DroppedIntent, SuppressedIntent};
use crate::domain::model::state::DataQuality;

pub mod warning_code {
    pub const POSITION_VALUE_MISMATCH: &str = "POSITION_VALUE_MISMATCH";
    pub const PARTIAL_REBALANCE_TURNOVER_LIMIT: &str = "PARTIAL_REBALANCE_TURNOVER_LIMIT";
    pub const TAX_BUDGET_LIMIT_REACHED: &str = "TAX_BUDGET_LIMIT_REACHED";
    pub const SETTLEMENT_OVERDRAFT_UTILIZED: &str = "SETTLEMENT_OVERDRAFT_UTILIZED";
    pub const TARGET_METHOD_STATUS_DIVERGENCE: &str = "TARGET_METHOD_STATUS_DIVERGENCE";
    pub const TARGET_METHOD_WEIGHT_DIVERGENCE: &str = "TARGET_METHOD_WEIGHT_DIVERGENCE";
    pub const PARTIAL_BATCH_FAILURE: &str = "PARTIAL_BATCH_FAILURE";
}

/// Per-currency projected balances across settlement day offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashLadderRung {
    pub currency: String,
    pub day: u8,
    /// Cumulative balance at end of this day offset.
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashLadderBreach {
    pub currency: String,
    pub day: u8,
    pub balance: Decimal,
    pub overdraft_limit: Decimal,
    /// `OVERDRAFT_ON_T_PLUS_<N>`.
    pub reason: String,
}

/// Per-currency funding math recorded by advisory auto-funding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingPlanEntry {
    pub currency: String,
    pub required: Decimal,
    pub available_before_fx: Decimal,
    pub fx_needed: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_pair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_currency: Option<String>,
}

/// A sell whose quantity was reduced to respect the realized-gains budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBudgetConstraintEvent {
    pub instrument_id: String,
    pub requested_quantity: Decimal,
    pub allowed_quantity: Decimal,
    pub realized_gain: Decimal,
    pub remaining_budget: Decimal,
}

/// Everything the pipeline wants to tell the reviewer that is not a rule
/// outcome. Accumulated across stages; never causes an abort by itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suppressed_intents: Vec<SuppressedIntent>,
    #[serde(default)]
    pub dropped_intents: Vec<DroppedIntent>,
    #[serde(default)]
    pub data_quality: DataQuality,
    #[serde(default)]
    pub cash_ladder: Vec<CashLadderRung>,
    #[serde(default)]
    pub cash_ladder_breaches: Vec<CashLadderBreach>,
    #[serde(default)]
    pub funding_plan: Vec<FundingPlanEntry>,
    #[serde(default)]
    pub missing_fx_pairs: Vec<String>,
    #[serde(default)]
    pub insufficient_cash: Vec<String>,
    #[serde(default)]
    pub tax_budget_constraint_events: Vec<TaxBudgetConstraintEvent>,
}

impl Diagnostics {
    /// Record a warning code once; repeats are collapsed.
    pub fn warn(&mut self, code: &str) {
        if !self.warnings.iter().any(|w| w == code) {
            self.warnings.push(code.to_string());
        }
    }
}
