//! Universe construction: intersect the model with the shelf, join held
//! positions, and classify lock reasons.
//!
//! The lock predicate is `quantity != 0`; short positions stay in the
//! universe locked or tradeable so the safety rules can see them.

use rust_decimal::Decimal;
use std::collections::BTreeSet;

use crate::domain::model::model_portfolio::ModelPortfolio;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::portfolio::PortfolioSnapshot;
use crate::domain::model::shelf::{Shelf, ShelfStatus};
use crate::domain::model::state::SimulatedState;
use crate::domain::model::target::{LockReason, Universe, UniverseEntry};

pub fn build_universe(
    model: &ModelPortfolio,
    portfolio: &PortfolioSnapshot,
    before: &SimulatedState,
    shelf: &Shelf,
    options: &EngineOptions,
) -> Universe {
    let mut instrument_ids: BTreeSet<String> = model
        .security_targets()
        .map(|(id, _)| id.clone())
        .collect();
    for position in &portfolio.positions {
        instrument_ids.insert(position.instrument_id.clone());
    }

    let mut entries = Vec::with_capacity(instrument_ids.len());
    let mut displaced_weight = Decimal::ZERO;

    for instrument_id in instrument_ids {
        let model_weight = model
            .targets
            .get(&instrument_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let in_model = model_weight > Decimal::ZERO;
        let held_quantity = portfolio
            .position(&instrument_id)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO);
        let held = held_quantity != Decimal::ZERO;
        let current_weight = before.weight_of(&instrument_id);
        let shelf_entry = shelf.get(&instrument_id);

        let lock_reason = if held {
            match shelf_entry {
                None => Some(LockReason::LockedDueToMissingShelf),
                Some(entry) => match entry.status {
                    ShelfStatus::Restricted if !options.allow_restricted => {
                        Some(LockReason::LockedDueToRestricted)
                    }
                    status => LockReason::from_status(status).filter(|_| {
                        matches!(status, ShelfStatus::Suspended | ShelfStatus::Banned)
                    }),
                },
            }
        } else {
            None
        };
        let locked = lock_reason.is_some();

        let buy_eligible = !locked
            && shelf_entry
                .map(|e| e.buy_allowed(options.allow_restricted))
                .unwrap_or(false);
        let sell_eligible = !locked
            && shelf_entry
                .map(|e| e.sell_allowed(options.allow_restricted))
                .unwrap_or(false);

        // Model weight that cannot be reached through buying goes to the
        // redistribution pool: the full weight of excluded instruments, the
        // un-buyable excess of sell-only and locked ones.
        if in_model {
            if locked {
                displaced_weight += (model_weight - current_weight).max(Decimal::ZERO);
            } else if !buy_eligible {
                let retained = if sell_eligible {
                    // Sell-only: can keep what is already held, up to model.
                    current_weight.min(model_weight).max(Decimal::ZERO)
                } else {
                    Decimal::ZERO
                };
                displaced_weight += model_weight - retained;
            }
        }

        entries.push(UniverseEntry {
            instrument_id,
            in_model,
            model_weight,
            held_quantity,
            current_weight,
            shelf_status: shelf_entry.map(|e| e.status),
            buy_eligible,
            sell_eligible,
            lock_reason,
        });
    }

    Universe {
        entries,
        displaced_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::market::MarketDataSnapshot;
    use crate::domain::model::options::ValuationMode;
    use crate::domain::model::portfolio::Position;
    use crate::domain::model::shelf::ShelfEntry;
    use crate::application::valuation::value_snapshot;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn shelf_entry(id: &str, status: ShelfStatus) -> ShelfEntry {
        ShelfEntry {
            instrument_id: id.to_string(),
            status,
            asset_class: "EQUITY".to_string(),
            min_notional: None,
            settlement_days: 2,
            attributes: BTreeMap::new(),
            issuer_id: None,
            liquidity_tier: None,
        }
    }

    fn empty_before(base: &str) -> SimulatedState {
        SimulatedState {
            base_currency: base.to_string(),
            total_value: Decimal::ZERO,
            cash_balances: vec![],
            positions: vec![],
            allocation_by_asset_class: vec![],
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        }
    }

    fn model(weights: &[(&str, Decimal)]) -> ModelPortfolio {
        ModelPortfolio {
            model_id: None,
            targets: weights
                .iter()
                .map(|(id, w)| (id.to_string(), *w))
                .collect(),
        }
    }

    fn portfolio(positions: Vec<Position>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "USD".to_string(),
            positions,
            cash_balances: vec![],
        }
    }

    #[test]
    fn test_approved_model_instrument_is_tradeable() {
        let shelf = Shelf::from_entries(vec![shelf_entry("AAA", ShelfStatus::Approved)]);
        let universe = build_universe(
            &model(&[("AAA", dec!(1))]),
            &portfolio(vec![]),
            &empty_before("USD"),
            &shelf,
            &EngineOptions::default(),
        );
        let entry = universe.entry("AAA").unwrap();
        assert!(entry.buy_eligible);
        assert!(entry.sell_eligible);
        assert!(!entry.is_locked());
        assert_eq!(universe.displaced_weight, Decimal::ZERO);
    }

    #[test]
    fn test_unheld_suspended_model_weight_is_displaced() {
        let shelf = Shelf::from_entries(vec![
            shelf_entry("AAA", ShelfStatus::Suspended),
            shelf_entry("BBB", ShelfStatus::Approved),
        ]);
        let universe = build_universe(
            &model(&[("AAA", dec!(0.4)), ("BBB", dec!(0.6))]),
            &portfolio(vec![]),
            &empty_before("USD"),
            &shelf,
            &EngineOptions::default(),
        );
        assert!(!universe.entry("AAA").unwrap().buy_eligible);
        assert_eq!(universe.displaced_weight, dec!(0.4));
    }

    #[test]
    fn test_held_position_missing_shelf_is_locked() {
        let universe = build_universe(
            &model(&[]),
            &portfolio(vec![Position {
                instrument_id: "MYSTERY".to_string(),
                quantity: dec!(10),
                market_value: None,
                lots: None,
            }]),
            &empty_before("USD"),
            &Shelf::default(),
            &EngineOptions::default(),
        );
        assert_eq!(
            universe.entry("MYSTERY").unwrap().lock_reason,
            Some(LockReason::LockedDueToMissingShelf)
        );
    }

    #[test]
    fn test_lock_predicate_uses_nonzero_not_positive() {
        let universe = build_universe(
            &model(&[]),
            &portfolio(vec![Position {
                instrument_id: "SHORTED".to_string(),
                quantity: dec!(-5),
                market_value: None,
                lots: None,
            }]),
            &empty_before("USD"),
            &Shelf::default(),
            &EngineOptions::default(),
        );
        assert!(universe.entry("SHORTED").unwrap().is_locked());
    }

    #[test]
    fn test_held_restricted_locked_unless_allowed() {
        let shelf = Shelf::from_entries(vec![shelf_entry("RRR", ShelfStatus::Restricted)]);
        let holding = portfolio(vec![Position {
            instrument_id: "RRR".to_string(),
            quantity: dec!(10),
            market_value: None,
            lots: None,
        }]);
        let locked = build_universe(
            &model(&[]),
            &holding,
            &empty_before("USD"),
            &shelf,
            &EngineOptions::default(),
        );
        assert_eq!(
            locked.entry("RRR").unwrap().lock_reason,
            Some(LockReason::LockedDueToRestricted)
        );

        let mut options = EngineOptions::default();
        options.allow_restricted = true;
        let unlocked = build_universe(&model(&[]), &holding, &empty_before("USD"), &shelf, &options);
        assert!(!unlocked.entry("RRR").unwrap().is_locked());
        assert!(unlocked.entry("RRR").unwrap().sell_eligible);
    }

    #[test]
    fn test_sell_only_excess_displaced() {
        use crate::domain::model::market::PricePoint;
        use crate::domain::money::Money;

        let shelf = Shelf::from_entries(vec![shelf_entry("SSS", ShelfStatus::SellOnly)]);
        // Hold 10 units at 100 with 9,000 cash: current weight 0.10.
        let holding = PortfolioSnapshot {
            portfolio_id: "p1".to_string(),
            snapshot_id: None,
            base_currency: "USD".to_string(),
            positions: vec![Position {
                instrument_id: "SSS".to_string(),
                quantity: dec!(10),
                market_value: None,
                lots: None,
            }],
            cash_balances: vec![crate::domain::model::portfolio::CashBalance {
                currency: "USD".to_string(),
                amount: dec!(9000),
            }],
        };
        let market_data = MarketDataSnapshot {
            snapshot_id: None,
            prices: vec![PricePoint {
                instrument_id: "SSS".to_string(),
                price: Money::new(dec!(100), "USD"),
            }],
            fx_rates: vec![],
        };
        let before = value_snapshot(
            &holding,
            &market_data,
            &shelf,
            ValuationMode::Calculated,
            false,
        )
        .state;
        let universe = build_universe(
            &model(&[("SSS", dec!(0.30))]),
            &holding,
            &before,
            &shelf,
            &EngineOptions::default(),
        );
        let entry = universe.entry("SSS").unwrap();
        assert!(!entry.buy_eligible);
        assert!(entry.sell_eligible);
        // Model wants 0.30, holding covers 0.10; 0.20 is displaced.
        assert_eq!(universe.displaced_weight, dec!(0.20));
    }
}
