use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::ValidationError;
use crate::domain::model::intent::TradeSide;
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::model_portfolio::{ModelPortfolio, ReferenceModel};
use crate::domain::model::options::EngineOptions;
use crate::domain::model::portfolio::PortfolioSnapshot;
use crate::domain::model::shelf::{MAX_SETTLEMENT_DAYS, ShelfEntry};
use crate::domain::money::parse_pair;

/// A DPM rebalance simulation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRequest {
    pub portfolio: PortfolioSnapshot,
    pub market_data: MarketDataSnapshot,
    #[serde(default)]
    pub shelf: Vec<ShelfEntry>,
    pub model: ModelPortfolio,
    #[serde(default)]
    pub options: EngineOptions,
}

impl RebalanceRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.portfolio.validate()?;
        self.model.validate()?;
        validate_market_data(&self.market_data)?;
        validate_shelf(&self.shelf)?;
        Ok(())
    }
}

/// An advisor-entered trade instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualTrade {
    pub instrument_id: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A client deposit or withdrawal applied before trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualCashFlow {
    pub currency: String,
    /// Signed: deposits positive, withdrawals negative.
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

/// An advisory proposal simulation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub portfolio: PortfolioSnapshot,
    pub market_data: MarketDataSnapshot,
    #[serde(default)]
    pub shelf: Vec<ShelfEntry>,
    #[serde(default)]
    pub trades: Vec<ManualTrade>,
    #[serde(default)]
    pub cash_flows: Vec<ManualCashFlow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_model: Option<ReferenceModel>,
    #[serde(default)]
    pub options: EngineOptions,
}

impl ProposalRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.portfolio.validate()?;
        validate_market_data(&self.market_data)?;
        validate_shelf(&self.shelf)?;
        Ok(())
    }
}

/// Batch analysis: named option overlays executed against one shared
/// snapshot. Keys must match `[a-z0-9_\-]{1,64}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub portfolio: PortfolioSnapshot,
    pub market_data: MarketDataSnapshot,
    #[serde(default)]
    pub shelf: Vec<ShelfEntry>,
    pub model: ModelPortfolio,
    /// Scenario name -> raw options overlay. Left as JSON so a bad overlay
    /// fails only its own scenario.
    pub scenarios: BTreeMap<String, serde_json::Value>,
}

pub const MAX_SCENARIOS: usize = 20;

impl AnalyzeRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.portfolio.validate()?;
        self.model.validate()?;
        validate_market_data(&self.market_data)?;
        validate_shelf(&self.shelf)?;
        if self.scenarios.len() > MAX_SCENARIOS {
            return Err(ValidationError::TooManyScenarios {
                count: self.scenarios.len(),
                max: MAX_SCENARIOS,
            });
        }
        for name in self.scenarios.keys() {
            if !valid_scenario_name(name) {
                return Err(ValidationError::InvalidScenarioName { name: name.clone() });
            }
        }
        Ok(())
    }
}

pub fn valid_scenario_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

fn validate_market_data(market_data: &MarketDataSnapshot) -> Result<(), ValidationError> {
    for fx in &market_data.fx_rates {
        parse_pair(&fx.pair)?;
    }
    Ok(())
}

fn validate_shelf(shelf: &[ShelfEntry]) -> Result<(), ValidationError> {
    for entry in shelf {
        if entry.settlement_days > MAX_SETTLEMENT_DAYS {
            return Err(ValidationError::InvalidOptions {
                detail: format!(
                    "settlement_days {} out of range for {}",
                    entry.settlement_days, entry.instrument_id
                ),
            });
        }
    }
    Ok(())
}
