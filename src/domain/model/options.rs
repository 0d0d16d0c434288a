use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValuationMode {
    #[default]
    Calculated,
    TrustSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetMethod {
    #[default]
    Heuristic,
    Solver,
}

impl std::fmt::Display for TargetMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetMethod::Heuristic => write!(f, "HEURISTIC"),
            TargetMethod::Solver => write!(f, "SOLVER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingMode {
    #[default]
    AutoFx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxFundingSourceCurrency {
    #[default]
    BaseOnly,
    AnyCash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxGenerationPolicy {
    #[default]
    OneFxPerCcy,
}

/// Upper bound for the combined weight of a `"attribute:value"` group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConstraint {
    pub max_weight: Decimal,
}

/// Thresholds consumed by the suitability scanner and the hard
/// concentration rules. All optional; unset checks are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuitabilityThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_position_max_weight: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_max_weight: Option<Decimal>,
    /// Per-liquidity-tier weight caps, e.g. `ILLIQUID -> 0.10`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub liquidity_tier_caps: BTreeMap<String, Decimal>,
    /// Severity assigned to data-quality findings (`HIGH`/`MEDIUM`/`LOW`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality_severity: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_settlement_horizon() -> u8 {
    5
}

fn default_fx_settlement_days() -> u8 {
    2
}

fn default_comparison_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// The full set of recognized engine settings.
///
/// Unknown keys are rejected during deserialization so option typos surface
/// as 422s instead of silently falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineOptions {
    // Valuation
    pub valuation_mode: ValuationMode,

    // Targeting
    pub target_method: TargetMethod,
    pub compare_target_methods: bool,
    pub compare_target_methods_tolerance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_position_max_weight: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_cash_buffer_pct: Option<Decimal>,
    /// Keyed by `"attribute:value"`, e.g. `"sector:TECH"`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub group_constraints: BTreeMap<String, GroupConstraint>,

    // Trades
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_trade_notional: Option<Money>,
    pub suppress_dust_trades: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turnover_pct: Option<Decimal>,
    /// Reserved. Parsed for forward compatibility, never consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dust_trade_threshold: Option<Decimal>,

    // Tax
    pub enable_tax_awareness: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_realized_capital_gains: Option<Decimal>,

    // Settlement
    pub enable_settlement_awareness: bool,
    pub settlement_horizon_days: u8,
    pub fx_settlement_days: u8,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub max_overdraft_by_ccy: BTreeMap<String, Decimal>,
    pub fx_buffer_pct: Decimal,

    // Compliance bands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_band_min_weight: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_band_max_weight: Option<Decimal>,

    // Data quality
    pub block_on_missing_prices: bool,
    pub block_on_missing_fx: bool,
    pub allow_restricted: bool,

    // Advisory
    pub enable_proposal_simulation: bool,
    pub proposal_apply_cash_flows_first: bool,
    pub proposal_block_negative_cash: bool,
    pub auto_funding: bool,
    pub funding_mode: FundingMode,
    pub fx_funding_source_currency: FxFundingSourceCurrency,
    pub fx_generation_policy: FxGenerationPolicy,

    // Workflow
    pub enable_workflow_gates: bool,
    pub workflow_requires_client_consent: bool,
    pub client_consent_already_obtained: bool,

    // Dependencies
    pub link_buy_to_same_currency_sell_dependency: bool,

    // Suitability
    pub suitability: SuitabilityThresholds,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            valuation_mode: ValuationMode::default(),
            target_method: TargetMethod::default(),
            compare_target_methods: false,
            compare_target_methods_tolerance: default_comparison_tolerance(),
            single_position_max_weight: None,
            min_cash_buffer_pct: None,
            group_constraints: BTreeMap::new(),
            min_trade_notional: None,
            suppress_dust_trades: default_true(),
            max_turnover_pct: None,
            dust_trade_threshold: None,
            enable_tax_awareness: false,
            max_realized_capital_gains: None,
            enable_settlement_awareness: false,
            settlement_horizon_days: default_settlement_horizon(),
            fx_settlement_days: default_fx_settlement_days(),
            max_overdraft_by_ccy: BTreeMap::new(),
            fx_buffer_pct: Decimal::ZERO,
            cash_band_min_weight: None,
            cash_band_max_weight: None,
            block_on_missing_prices: default_true(),
            block_on_missing_fx: default_true(),
            allow_restricted: false,
            enable_proposal_simulation: default_true(),
            proposal_apply_cash_flows_first: default_true(),
            proposal_block_negative_cash: default_true(),
            auto_funding: default_true(),
            funding_mode: FundingMode::default(),
            fx_funding_source_currency: FxFundingSourceCurrency::default(),
            fx_generation_policy: FxGenerationPolicy::default(),
            enable_workflow_gates: false,
            workflow_requires_client_consent: default_true(),
            client_consent_already_obtained: false,
            link_buy_to_same_currency_sell_dependency: default_true(),
            suitability: SuitabilityThresholds::default(),
        }
    }
}

impl EngineOptions {
    /// Allowed overdraft for a currency; zero unless configured.
    pub fn overdraft_limit(&self, currency: &str) -> Decimal {
        self.max_overdraft_by_ccy
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
