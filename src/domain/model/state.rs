use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::model::portfolio::CashBalance;

/// A valued portfolio state, before or after simulation.
///
/// Everything here is derived: values are FX-adjusted into the base
/// currency and weights are fractions of `total_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedState {
    pub base_currency: String,
    /// Total portfolio value in base currency (positions + cash).
    pub total_value: Decimal,
    pub cash_balances: Vec<CashBalance>,
    pub positions: Vec<EnrichedPosition>,
    pub allocation_by_asset_class: Vec<AllocationSlice>,
    pub allocation_by_instrument: Vec<AllocationSlice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_by_attribute: Option<Vec<AttributeAllocation>>,
}

impl SimulatedState {
    pub fn cash_total_base(&self) -> Decimal {
        self.total_value
            - self
                .positions
                .iter()
                .map(|p| p.value_base)
                .sum::<Decimal>()
    }

    /// Cash weight of the state; zero when the portfolio has no value.
    pub fn cash_weight(&self) -> Decimal {
        if self.total_value.is_zero() {
            return Decimal::ZERO;
        }
        self.cash_total_base() / self.total_value
    }

    pub fn position(&self, instrument_id: &str) -> Option<&EnrichedPosition> {
        self.positions
            .iter()
            .find(|p| p.instrument_id == instrument_id)
    }

    pub fn weight_of(&self, instrument_id: &str) -> Decimal {
        self.position(instrument_id)
            .map(|p| p.weight)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPosition {
    pub instrument_id: String,
    pub quantity: Decimal,
    pub currency: String,
    /// Value in the instrument's trading currency.
    pub value_instrument: Decimal,
    /// Value in the portfolio base currency.
    pub value_base: Decimal,
    pub weight: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
    /// True when the position could not be valued (missing price or FX).
    #[serde(default)]
    pub unpriced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub key: String,
    pub value_base: Decimal,
    pub weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeAllocation {
    pub attribute: String,
    pub slices: Vec<AllocationSlice>,
}

/// Data-quality buckets collected during valuation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataQuality {
    #[serde(default)]
    pub price_missing: Vec<String>,
    #[serde(default)]
    pub fx_missing: Vec<String>,
}

impl DataQuality {
    pub fn is_clean(&self) -> bool {
        self.price_missing.is_empty() && self.fx_missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cash_weight() {
        let state = SimulatedState {
            base_currency: "SGD".to_string(),
            total_value: dec!(1000),
            cash_balances: vec![CashBalance {
                currency: "SGD".to_string(),
                amount: dec!(200),
            }],
            positions: vec![EnrichedPosition {
                instrument_id: "AAA".to_string(),
                quantity: dec!(8),
                currency: "SGD".to_string(),
                value_instrument: dec!(800),
                value_base: dec!(800),
                weight: dec!(0.8),
                asset_class: None,
                unpriced: false,
            }],
            allocation_by_asset_class: vec![],
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        };
        assert_eq!(state.cash_total_base(), dec!(200));
        assert_eq!(state.cash_weight(), dec!(0.2));
    }

    #[test]
    fn test_zero_total_has_zero_cash_weight() {
        let state = SimulatedState {
            base_currency: "SGD".to_string(),
            total_value: Decimal::ZERO,
            cash_balances: vec![],
            positions: vec![],
            allocation_by_asset_class: vec![],
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        };
        assert_eq!(state.cash_weight(), Decimal::ZERO);
    }
}
