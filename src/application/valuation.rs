//! Before/after state construction.
//!
//! Values every position and cash balance into the portfolio base currency,
//! assigns weights, and collects data-quality buckets. Unpriceable positions
//! contribute zero value but stay visible with `unpriced = true` so nothing
//! silently disappears from the result.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use crate::domain::model::diagnostics::warning_code;
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::options::ValuationMode;
use crate::domain::model::portfolio::{CashBalance, PortfolioSnapshot};
use crate::domain::model::shelf::Shelf;
use crate::domain::model::state::{
    AllocationSlice, AttributeAllocation, DataQuality, EnrichedPosition, SimulatedState,
};

const TRUST_DEVIATION_LIMIT: Decimal = dec!(0.005);

/// Raw holdings to value: ordered positions and cash by currency.
#[derive(Debug, Clone)]
pub struct Holdings {
    pub positions: Vec<(String, Decimal)>,
    pub cash: Vec<(String, Decimal)>,
}

impl Holdings {
    pub fn from_snapshot(portfolio: &PortfolioSnapshot) -> Self {
        let mut cash: BTreeMap<String, Decimal> = BTreeMap::new();
        for balance in &portfolio.cash_balances {
            *cash.entry(balance.currency.clone()).or_default() += balance.amount;
        }
        Self {
            positions: portfolio
                .positions
                .iter()
                .map(|p| (p.instrument_id.clone(), p.quantity))
                .collect(),
            cash: cash.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValuationOutput {
    pub state: SimulatedState,
    pub data_quality: DataQuality,
    pub warnings: Vec<String>,
}

/// Value the submitted snapshot, honoring the valuation mode.
pub fn value_snapshot(
    portfolio: &PortfolioSnapshot,
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    mode: ValuationMode,
    include_attribute_allocations: bool,
) -> ValuationOutput {
    let base = &portfolio.base_currency;
    let mut data_quality = DataQuality::default();
    let mut warnings = Vec::new();
    let mut enriched = Vec::with_capacity(portfolio.positions.len());

    for position in &portfolio.positions {
        let calculated = value_position(
            &position.instrument_id,
            position.quantity,
            market_data,
            base,
            &mut data_quality,
        );

        let position_value = match mode {
            ValuationMode::Calculated => calculated,
            ValuationMode::TrustSnapshot => match &position.market_value {
                Some(trusted) => {
                    let trusted_base = market_data
                        .convert(trusted.amount, &trusted.currency, base)
                        .unwrap_or(trusted.amount);
                    if let Valued::Priced { value_base, .. } = &calculated {
                        if !value_base.is_zero() {
                            let deviation = ((trusted_base - value_base) / value_base).abs();
                            if deviation > TRUST_DEVIATION_LIMIT {
                                warnings.push(warning_code::POSITION_VALUE_MISMATCH.to_string());
                            }
                        }
                    }
                    Valued::Priced {
                        currency: trusted.currency.clone(),
                        value_instrument: trusted.amount,
                        value_base: trusted_base,
                    }
                }
                None => calculated,
            },
        };

        enriched.push(match position_value {
            Valued::Priced {
                currency,
                value_instrument,
                value_base,
            } => EnrichedPosition {
                instrument_id: position.instrument_id.clone(),
                quantity: position.quantity,
                currency,
                value_instrument,
                value_base,
                weight: Decimal::ZERO,
                asset_class: shelf
                    .get(&position.instrument_id)
                    .map(|e| e.asset_class.clone()),
                unpriced: false,
            },
            Valued::Unpriced => EnrichedPosition {
                instrument_id: position.instrument_id.clone(),
                quantity: position.quantity,
                currency: base.clone(),
                value_instrument: Decimal::ZERO,
                value_base: Decimal::ZERO,
                weight: Decimal::ZERO,
                asset_class: shelf
                    .get(&position.instrument_id)
                    .map(|e| e.asset_class.clone()),
                unpriced: true,
            },
        });
    }

    let holdings = Holdings::from_snapshot(portfolio);
    let state = assemble_state(
        base,
        enriched,
        &holdings.cash,
        market_data,
        shelf,
        &mut data_quality,
        include_attribute_allocations,
    );

    ValuationOutput {
        state,
        data_quality,
        warnings,
    }
}

/// Value raw holdings (always CALCULATED); used for the simulated after
/// state.
pub fn value_holdings(
    holdings: &Holdings,
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    base: &str,
    include_attribute_allocations: bool,
) -> ValuationOutput {
    let mut data_quality = DataQuality::default();
    let mut enriched = Vec::with_capacity(holdings.positions.len());

    for (instrument_id, quantity) in &holdings.positions {
        let valued = value_position(instrument_id, *quantity, market_data, base, &mut data_quality);
        enriched.push(match valued {
            Valued::Priced {
                currency,
                value_instrument,
                value_base,
            } => EnrichedPosition {
                instrument_id: instrument_id.clone(),
                quantity: *quantity,
                currency,
                value_instrument,
                value_base,
                weight: Decimal::ZERO,
                asset_class: shelf.get(instrument_id).map(|e| e.asset_class.clone()),
                unpriced: false,
            },
            Valued::Unpriced => EnrichedPosition {
                instrument_id: instrument_id.clone(),
                quantity: *quantity,
                currency: base.to_string(),
                value_instrument: Decimal::ZERO,
                value_base: Decimal::ZERO,
                weight: Decimal::ZERO,
                asset_class: shelf.get(instrument_id).map(|e| e.asset_class.clone()),
                unpriced: true,
            },
        });
    }

    let state = assemble_state(
        base,
        enriched,
        &holdings.cash,
        market_data,
        shelf,
        &mut data_quality,
        include_attribute_allocations,
    );

    ValuationOutput {
        state,
        data_quality,
        warnings: vec![],
    }
}

enum Valued {
    Priced {
        currency: String,
        value_instrument: Decimal,
        value_base: Decimal,
    },
    Unpriced,
}

fn value_position(
    instrument_id: &str,
    quantity: Decimal,
    market_data: &MarketDataSnapshot,
    base: &str,
    data_quality: &mut DataQuality,
) -> Valued {
    let Some(price) = market_data.price(instrument_id) else {
        bucket(&mut data_quality.price_missing, instrument_id);
        return Valued::Unpriced;
    };
    let value_instrument = quantity * price.amount;
    let Some(value_base) = market_data.convert(value_instrument, &price.currency, base) else {
        bucket(&mut data_quality.fx_missing, instrument_id);
        return Valued::Unpriced;
    };
    Valued::Priced {
        currency: price.currency.clone(),
        value_instrument,
        value_base,
    }
}

fn bucket(items: &mut Vec<String>, id: &str) {
    if !items.iter().any(|i| i == id) {
        items.push(id.to_string());
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble_state(
    base: &str,
    mut positions: Vec<EnrichedPosition>,
    cash: &[(String, Decimal)],
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    data_quality: &mut DataQuality,
    include_attribute_allocations: bool,
) -> SimulatedState {
    let mut cash_total_base = Decimal::ZERO;
    let mut cash_balances = Vec::with_capacity(cash.len());
    for (currency, amount) in cash {
        cash_balances.push(CashBalance {
            currency: currency.clone(),
            amount: *amount,
        });
        match market_data.convert(*amount, currency, base) {
            Some(converted) => cash_total_base += converted,
            None => bucket(&mut data_quality.fx_missing, &format!("CASH_{currency}")),
        }
    }

    let positions_total: Decimal = positions.iter().map(|p| p.value_base).sum();
    let total_value = positions_total + cash_total_base;

    if !total_value.is_zero() {
        for position in positions.iter_mut() {
            position.weight = position.value_base / total_value;
        }
    }

    let allocation_by_instrument = positions
        .iter()
        .map(|p| AllocationSlice {
            key: p.instrument_id.clone(),
            value_base: p.value_base,
            weight: p.weight,
        })
        .collect();

    let mut by_class: BTreeMap<String, Decimal> = BTreeMap::new();
    for position in &positions {
        let class = position
            .asset_class
            .clone()
            .unwrap_or_else(|| "UNCLASSIFIED".to_string());
        *by_class.entry(class).or_default() += position.value_base;
    }
    if !cash_total_base.is_zero() || !cash_balances.is_empty() {
        *by_class.entry("CASH".to_string()).or_default() += cash_total_base;
    }
    let allocation_by_asset_class = by_class
        .into_iter()
        .map(|(key, value_base)| AllocationSlice {
            key,
            value_base,
            weight: if total_value.is_zero() {
                Decimal::ZERO
            } else {
                value_base / total_value
            },
        })
        .collect();

    let allocation_by_attribute = if include_attribute_allocations {
        Some(attribute_allocations(&positions, shelf, total_value))
    } else {
        None
    };

    SimulatedState {
        base_currency: base.to_string(),
        total_value,
        cash_balances,
        positions,
        allocation_by_asset_class,
        allocation_by_instrument,
        allocation_by_attribute,
    }
}

fn attribute_allocations(
    positions: &[EnrichedPosition],
    shelf: &Shelf,
    total_value: Decimal,
) -> Vec<AttributeAllocation> {
    let mut by_attribute: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
    for position in positions {
        if let Some(entry) = shelf.get(&position.instrument_id) {
            for (attribute, value) in &entry.attributes {
                *by_attribute
                    .entry(attribute.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default() += position.value_base;
            }
        }
    }
    by_attribute
        .into_iter()
        .map(|(attribute, values)| AttributeAllocation {
            attribute,
            slices: values
                .into_iter()
                .map(|(key, value_base)| AllocationSlice {
                    key,
                    value_base,
                    weight: if total_value.is_zero() {
                        Decimal::ZERO
                    } else {
                        value_base / total_value
                    },
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::market::{FxRatePoint, PricePoint};
    use crate::domain::model::portfolio::Position;
    use crate::domain::money::Money;

    fn market_data() -> MarketDataSnapshot {
        MarketDataSnapshot {
            snapshot_id: None,
            prices: vec![PricePoint {
                instrument_id: "US_ETF".to_string(),
                price: Money::new(dec!(500), "USD"),
            }],
            fx_rates: vec![FxRatePoint {
                pair: "USD/SGD".to_string(),
                rate: dec!(1.35),
            }],
        }
    }

    fn portfolio(quantity: Decimal) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "SGD".to_string(),
            positions: vec![Position {
                instrument_id: "US_ETF".to_string(),
                quantity,
                market_value: None,
                lots: None,
            }],
            cash_balances: vec![CashBalance {
                currency: "SGD".to_string(),
                amount: dec!(660000),
            }],
        }
    }

    #[test]
    fn test_calculated_valuation_with_fx() {
        let output = value_snapshot(
            &portfolio(dec!(100)),
            &market_data(),
            &Shelf::default(),
            ValuationMode::Calculated,
            false,
        );
        let state = output.state;
        // 100 * 500 USD * 1.35 = 67,500 SGD + 660,000 cash
        assert_eq!(state.total_value, dec!(727500));
        assert_eq!(state.positions[0].value_instrument, dec!(50000));
        assert_eq!(state.positions[0].value_base, dec!(67500.00));
        assert!(output.data_quality.is_clean());
    }

    #[test]
    fn test_missing_price_bucket() {
        let mut md = market_data();
        md.prices.clear();
        let output = value_snapshot(
            &portfolio(dec!(100)),
            &md,
            &Shelf::default(),
            ValuationMode::Calculated,
            false,
        );
        assert_eq!(output.data_quality.price_missing, vec!["US_ETF"]);
        assert!(output.state.positions[0].unpriced);
        // Cash still counts.
        assert_eq!(output.state.total_value, dec!(660000));
    }

    #[test]
    fn test_missing_fx_bucket() {
        let mut md = market_data();
        md.fx_rates.clear();
        let output = value_snapshot(
            &portfolio(dec!(100)),
            &md,
            &Shelf::default(),
            ValuationMode::Calculated,
            false,
        );
        assert_eq!(output.data_quality.fx_missing, vec!["US_ETF"]);
    }

    #[test]
    fn test_trust_snapshot_deviation_warning() {
        let mut p = portfolio(dec!(100));
        // Calculated base value is 67,500; trusted claims 70,000.
        p.positions[0].market_value = Some(Money::new(dec!(70000), "SGD"));
        let output = value_snapshot(
            &p,
            &market_data(),
            &Shelf::default(),
            ValuationMode::TrustSnapshot,
            false,
        );
        assert!(
            output
                .warnings
                .contains(&warning_code::POSITION_VALUE_MISMATCH.to_string())
        );
        assert_eq!(output.state.positions[0].value_base, dec!(70000));
    }

    #[test]
    fn test_trust_snapshot_falls_back_to_calculated() {
        let output = value_snapshot(
            &portfolio(dec!(100)),
            &market_data(),
            &Shelf::default(),
            ValuationMode::TrustSnapshot,
            false,
        );
        assert_eq!(output.state.positions[0].value_base, dec!(67500.00));
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_weights_sum_to_one() {
        let output = value_snapshot(
            &portfolio(dec!(100)),
            &market_data(),
            &Shelf::default(),
            ValuationMode::Calculated,
            false,
        );
        let state = output.state;
        let weight_sum: Decimal =
            state.positions.iter().map(|p| p.weight).sum::<Decimal>() + state.cash_weight();
        assert!((weight_sum - Decimal::ONE).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_negative_quantity_preserved() {
        let output = value_snapshot(
            &portfolio(dec!(-10)),
            &market_data(),
            &Shelf::default(),
            ValuationMode::Calculated,
            false,
        );
        assert_eq!(output.state.positions[0].quantity, dec!(-10));
        assert_eq!(output.state.positions[0].value_base, dec!(-6750.00));
    }
}
