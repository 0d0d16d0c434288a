//! Drift-to-trade conversion.
//!
//! Walks the target set against current weights, sizes whole-unit security
//! trades, and suppresses dust. Quantities are always floored; the engine
//! never rounds a trade up.

use rust_decimal::Decimal;

use crate::domain::model::intent::{
    Intent, Rationale, SuppressedIntent, TradeSide, rationale_code, suppression_reason,
};
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::shelf::Shelf;
use crate::domain::model::state::SimulatedState;
use crate::domain::model::target::{TargetSet, Universe};
use crate::domain::money::Money;

#[derive(Debug, Default)]
pub struct DriftIntents {
    pub intents: Vec<Intent>,
    pub suppressed: Vec<SuppressedIntent>,
    /// Model instruments that could not be priced, merged into the
    /// data-quality buckets by the caller.
    pub price_missing: Vec<String>,
    pub fx_missing: Vec<String>,
    pub missing_fx_pairs: Vec<String>,
}

pub fn drift_to_intents(
    universe: &Universe,
    target: &TargetSet,
    before: &SimulatedState,
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    options: &EngineOptions,
) -> DriftIntents {
    let mut output = DriftIntents::default();
    let base = &before.base_currency;
    let total_value = before.total_value;
    if total_value <= Decimal::ZERO {
        return output;
    }

    for entry in &target.entries {
        let universe_entry = universe.entry(&entry.instrument_id);
        if universe_entry.map(|u| u.is_locked()).unwrap_or(false) {
            continue;
        }
        let current_weight = before.weight_of(&entry.instrument_id);
        let drift_base = (entry.final_weight - current_weight) * total_value;
        if drift_base.is_zero() {
            continue;
        }
        let side = if drift_base > Decimal::ZERO {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        };

        if let Some(universe_entry) = universe_entry {
            match side {
                TradeSide::Buy if !universe_entry.buy_eligible => continue,
                TradeSide::Sell if !universe_entry.sell_eligible => continue,
                _ => {}
            }
        }

        let Some(price) = market_data.price(&entry.instrument_id) else {
            push_unique(&mut output.price_missing, &entry.instrument_id);
            continue;
        };
        if price.amount <= Decimal::ZERO {
            push_unique(&mut output.price_missing, &entry.instrument_id);
            continue;
        }
        let Some(rate_to_base) = market_data.rate(&price.currency, base) else {
            push_unique(&mut output.fx_missing, &entry.instrument_id);
            push_unique(
                &mut output.missing_fx_pairs,
                &format!("{}/{}", price.currency, base),
            );
            continue;
        };

        let drift_instrument = drift_base.abs() / rate_to_base;
        let quantity = (drift_instrument / price.amount).floor();
        if quantity.is_zero() {
            output.suppressed.push(SuppressedIntent {
                instrument_id: entry.instrument_id.clone(),
                side,
                notional_base: drift_base.abs(),
                reason: suppression_reason::ZERO_QUANTITY.to_string(),
                threshold: None,
            });
            continue;
        }

        let quantity = match side {
            TradeSide::Sell => {
                let held = universe_entry
                    .map(|u| u.held_quantity)
                    .unwrap_or(Decimal::ZERO);
                quantity.min(held.max(Decimal::ZERO))
            }
            TradeSide::Buy => quantity,
        };
        if quantity.is_zero() {
            continue;
        }

        let notional_instrument = quantity * price.amount;
        let notional_base = notional_instrument * rate_to_base;

        // Dust: explicit option threshold wins, shelf minimum is the
        // fallback. A notional exactly on the threshold is suppressed.
        if options.suppress_dust_trades {
            if let Some(threshold) = dust_threshold_base(
                &entry.instrument_id,
                options,
                shelf,
                market_data,
                base,
            ) {
                if notional_base.abs() <= threshold.amount {
                    output.suppressed.push(SuppressedIntent {
                        instrument_id: entry.instrument_id.clone(),
                        side,
                        notional_base: notional_base.abs(),
                        reason: suppression_reason::BELOW_MIN_NOTIONAL.to_string(),
                        threshold: Some(threshold),
                    });
                    continue;
                }
            }
        }

        let in_model = universe_entry.map(|u| u.in_model).unwrap_or(false);
        let rationale = if in_model {
            Rationale::new(
                rationale_code::MODEL_DRIFT,
                format!(
                    "Weight {} drifts from target {}",
                    current_weight.round_dp(6),
                    entry.final_weight.round_dp(6)
                ),
            )
        } else {
            Rationale::new(
                rationale_code::SELL_DOWN,
                "Held position outside the model is sold down".to_string(),
            )
        };

        output.intents.push(Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(side, &entry.instrument_id),
            instrument_id: entry.instrument_id.clone(),
            side,
            quantity,
            notional: Money::new(notional_instrument, price.currency.clone()),
            notional_base,
            dependencies: vec![],
            rationale,
            constraints_applied: entry.reasons.iter().map(|r| r.to_string()).collect(),
        });
    }

    output
}

/// Effective dust threshold in base currency, if any applies.
fn dust_threshold_base(
    instrument_id: &str,
    options: &EngineOptions,
    shelf: &Shelf,
    market_data: &MarketDataSnapshot,
    base: &str,
) -> Option<Money> {
    let threshold = options
        .min_trade_notional
        .clone()
        .or_else(|| shelf.min_notional(instrument_id).cloned())?;
    let amount_base = market_data.convert(threshold.amount, &threshold.currency, base)?;
    Some(Money::new(amount_base, base))
}

fn push_unique(items: &mut Vec<String>, value: &str) {
    if !items.iter().any(|v| v == value) {
        items.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::market::{FxRatePoint, PricePoint};
    use crate::domain::model::shelf::{ShelfEntry, ShelfStatus};
    use crate::domain::model::target::{TargetEntry, UniverseEntry};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn universe_entry(id: &str, held: Decimal, current: Decimal) -> UniverseEntry {
        UniverseEntry {
            instrument_id: id.to_string(),
            in_model: true,
            model_weight: dec!(0.8),
            held_quantity: held,
            current_weight: current,
            shelf_status: Some(ShelfStatus::Approved),
            buy_eligible: true,
            sell_eligible: true,
            lock_reason: None,
        }
    }

    fn target_set(id: &str, weight: Decimal) -> TargetSet {
        TargetSet {
            method: "HEURISTIC".to_string(),
            entries: vec![TargetEntry {
                instrument_id: id.to_string(),
                model_weight: weight,
                final_weight: weight,
                reasons: vec![],
            }],
            cash_weight: Decimal::ONE - weight,
            explanation: None,
        }
    }

    fn before_state(total: Decimal) -> SimulatedState {
        SimulatedState {
            base_currency: "SGD".to_string(),
            total_value: total,
            cash_balances: vec![],
            positions: vec![],
            allocation_by_asset_class: vec![],
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        }
    }

    fn market() -> MarketDataSnapshot {
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

    #[test]
    fn test_buy_quantity_floors() {
        let universe = Universe {
            entries: vec![universe_entry("US_ETF", Decimal::ZERO, Decimal::ZERO)],
            displaced_weight: Decimal::ZERO,
        };
        let output = drift_to_intents(
            &universe,
            &target_set("US_ETF", dec!(0.80)),
            &before_state(dec!(660000)),
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
        );
        assert_eq!(output.intents.len(), 1);
        let Intent::SecurityTrade {
            quantity,
            notional,
            notional_base,
            side,
            ..
        } = &output.intents[0]
        else {
            panic!("expected security trade");
        };
        // 0.80 * 660,000 = 528,000 SGD -> 391,111.11 USD -> floor(782.22) = 782
        assert_eq!(*side, TradeSide::Buy);
        assert_eq!(*quantity, dec!(782));
        assert_eq!(notional.amount, dec!(391000));
        assert_eq!(notional.currency, "USD");
        assert_eq!(*notional_base, dec!(527850.00));
    }

    #[test]
    fn test_sell_capped_at_holding() {
        let universe = Universe {
            entries: vec![universe_entry("US_ETF", dec!(10), dec!(0.9))],
            displaced_weight: Decimal::ZERO,
        };
        let output = drift_to_intents(
            &universe,
            &target_set("US_ETF", Decimal::ZERO),
            &before_state(dec!(100000)),
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
        );
        let Intent::SecurityTrade { quantity, side, .. } = &output.intents[0] else {
            panic!("expected security trade");
        };
        assert_eq!(*side, TradeSide::Sell);
        assert!(*quantity <= dec!(10));
    }

    #[test]
    fn test_dust_suppression_on_boundary() {
        let universe = Universe {
            entries: vec![universe_entry("US_ETF", Decimal::ZERO, Decimal::ZERO)],
            displaced_weight: Decimal::ZERO,
        };
        let mut options = EngineOptions::default();
        // One unit costs 675 SGD; threshold exactly equal suppresses.
        options.min_trade_notional = Some(Money::new(dec!(675), "SGD"));
        let output = drift_to_intents(
            &universe,
            &target_set("US_ETF", dec!(0.000675)),
            &before_state(dec!(1000000)),
            &market(),
            &Shelf::default(),
            &options,
        );
        assert!(output.intents.is_empty());
        assert_eq!(output.suppressed.len(), 1);
        assert_eq!(
            output.suppressed[0].reason,
            suppression_reason::BELOW_MIN_NOTIONAL
        );
    }

    #[test]
    fn test_shelf_min_notional_fallback() {
        let universe = Universe {
            entries: vec![universe_entry("US_ETF", Decimal::ZERO, Decimal::ZERO)],
            displaced_weight: Decimal::ZERO,
        };
        let shelf = Shelf::from_entries(vec![ShelfEntry {
            instrument_id: "US_ETF".to_string(),
            status: ShelfStatus::Approved,
            asset_class: "EQUITY".to_string(),
            min_notional: Some(Money::new(dec!(1000), "USD")),
            settlement_days: 2,
            attributes: BTreeMap::new(),
            issuer_id: None,
            liquidity_tier: None,
        }]);
        let output = drift_to_intents(
            &universe,
            &target_set("US_ETF", dec!(0.000675)),
            &before_state(dec!(1000000)),
            &market(),
            &shelf,
            &EngineOptions::default(),
        );
        // 675 SGD notional is below the 1,000 USD shelf minimum.
        assert!(output.intents.is_empty());
        assert_eq!(output.suppressed.len(), 1);
    }

    #[test]
    fn test_missing_price_recorded() {
        let universe = Universe {
            entries: vec![universe_entry("UNPRICED", Decimal::ZERO, Decimal::ZERO)],
            displaced_weight: Decimal::ZERO,
        };
        let output = drift_to_intents(
            &universe,
            &target_set("UNPRICED", dec!(0.5)),
            &before_state(dec!(100000)),
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
        );
        assert!(output.intents.is_empty());
        assert_eq!(output.price_missing, vec!["UNPRICED"]);
    }
}
