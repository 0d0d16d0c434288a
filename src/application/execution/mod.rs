//! Execution simulation: FX funding, dependency wiring, ledger
//! application, settlement ladder, safety facts, and reconciliation.
//!
//! This stage computes facts; the rule engine turns them into verdicts.

pub mod settlement;

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::model::diagnostics::{CashLadderBreach, CashLadderRung};
use crate::domain::model::intent::{Intent, Rationale, TradeSide, rationale_code};
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::result::Reconciliation;
use crate::domain::model::shelf::Shelf;
use crate::domain::model::state::{DataQuality, SimulatedState};
use crate::domain::money::{currency_minor_units, round_to_minor_units};

use crate::application::valuation::{Holdings, value_holdings};

#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Final intent list in deterministic output order with dependencies.
    pub intents: Vec<Intent>,
    pub after: SimulatedState,
    pub after_data_quality: DataQuality,
    pub reconciliation: Reconciliation,
    /// Instruments whose holding went (or stayed) negative.
    pub negative_holdings: Vec<String>,
    /// Currencies whose final balance is negative beyond any overdraft.
    pub uncovered_cash: Vec<String>,
    /// Final balances dipped into an allowed overdraft.
    pub overdraft_used: bool,
    pub ladder_rungs: Vec<CashLadderRung>,
    pub ladder_breaches: Vec<CashLadderBreach>,
    pub ladder_overdraft_utilized: bool,
    pub missing_fx_pairs: Vec<String>,
}

/// Simulate applying `intents` to the portfolio. With `generate_fx` the
/// simulator nets per-currency balances, creates hub-and-spoke FX against
/// the base currency (one FX per pair per run), and wires BUY
/// dependencies; without it the caller owns both FX and dependencies.
pub fn simulate_execution(
    before: &SimulatedState,
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    options: &EngineOptions,
    intents: Vec<Intent>,
    generate_fx: bool,
    include_attribute_allocations: bool,
) -> ExecutionOutcome {
    let base = before.base_currency.clone();
    let mut missing_fx_pairs: Vec<String> = Vec::new();

    // Opening cash by currency.
    let mut opening_cash: BTreeMap<String, Decimal> = BTreeMap::new();
    for balance in &before.cash_balances {
        *opening_cash.entry(balance.currency.clone()).or_default() += balance.amount;
    }

    // Net cash effect of the submitted intents.
    let mut projected: BTreeMap<String, Decimal> = opening_cash.clone();
    for intent in &intents {
        apply_cash_effect(&mut projected, intent);
    }

    let mut all_intents = intents;

    if generate_fx {
        let buffer = Decimal::ONE + options.fx_buffer_pct;
        for (currency, balance) in projected.clone() {
            if currency == base || balance.is_zero() {
                continue;
            }
            if balance < Decimal::ZERO {
                // FUNDING: buy the deficit currency against base.
                let Some(rate) = market_data.rate(&currency, &base) else {
                    push_unique(&mut missing_fx_pairs, &format!("{currency}/{base}"));
                    continue;
                };
                let buy_amount = round_up_minor(balance.abs() * buffer, &currency);
                let sell_amount = round_to_minor_units(buy_amount * rate, &base);
                all_intents.push(Intent::FxSpot {
                    intent_id: Intent::fx_id(&currency, &base),
                    pair: format!("{currency}/{base}"),
                    buy_currency: currency.clone(),
                    buy_amount,
                    sell_currency: base.clone(),
                    sell_amount_estimated: sell_amount,
                    rate,
                    dependencies: vec![],
                    rationale: Rationale::new(
                        rationale_code::FUNDING,
                        format!("Fund {currency} purchases from {base}"),
                    ),
                });
            } else {
                // SWEEP: surplus back into base.
                let Some(rate) = market_data.rate(&base, &currency) else {
                    push_unique(&mut missing_fx_pairs, &format!("{base}/{currency}"));
                    continue;
                };
                let Some(buy_amount) = balance.checked_div(rate) else {
                    continue;
                };
                let buy_amount = round_to_minor_units(buy_amount, &base);
                all_intents.push(Intent::FxSpot {
                    intent_id: Intent::fx_id(&base, &currency),
                    pair: format!("{base}/{currency}"),
                    buy_currency: base.clone(),
                    buy_amount,
                    sell_currency: currency.clone(),
                    sell_amount_estimated: balance,
                    rate,
                    dependencies: vec![],
                    rationale: Rationale::new(
                        rationale_code::SWEEP,
                        format!("Sweep surplus {currency} into {base}"),
                    ),
                });
            }
        }
    }

    if generate_fx {
        wire_dependencies(&mut all_intents, options);
    }

    // Apply everything to the ledger.
    let mut cash = opening_cash.clone();
    let mut position_order: Vec<String> = before
        .positions
        .iter()
        .map(|p| p.instrument_id.clone())
        .collect();
    let mut quantities: BTreeMap<String, Decimal> = before
        .positions
        .iter()
        .map(|p| (p.instrument_id.clone(), p.quantity))
        .collect();

    for intent in &all_intents {
        apply_cash_effect(&mut cash, intent);
        if let Intent::SecurityTrade {
            instrument_id,
            side,
            quantity,
            ..
        } = intent
        {
            let entry = quantities.entry(instrument_id.clone()).or_insert_with(|| {
                position_order.push(instrument_id.clone());
                Decimal::ZERO
            });
            match side {
                TradeSide::Buy => *entry += *quantity,
                TradeSide::Sell => *entry -= *quantity,
            }
        }
    }

    let negative_holdings: Vec<String> = position_order
        .iter()
        .filter(|id| quantities.get(*id).copied().unwrap_or(Decimal::ZERO) < Decimal::ZERO)
        .cloned()
        .collect();

    let mut uncovered_cash = Vec::new();
    let mut overdraft_used = false;
    for (currency, balance) in &cash {
        if *balance < Decimal::ZERO {
            if balance.abs() > options.overdraft_limit(currency) {
                uncovered_cash.push(currency.clone());
            } else {
                overdraft_used = true;
            }
        }
    }

    // Settlement ladder over the full intent set.
    let (ladder_rungs, ladder_breaches, ladder_overdraft_utilized) =
        if options.enable_settlement_awareness {
            let outcome = settlement::build_ladder(&opening_cash, &all_intents, shelf, options);
            (outcome.rungs, outcome.breaches, outcome.overdraft_utilized)
        } else {
            (vec![], vec![], false)
        };

    // Value the after state.
    let holdings = Holdings {
        positions: position_order
            .iter()
            .map(|id| (id.clone(), quantities[id]))
            .collect(),
        cash: cash.into_iter().collect(),
    };
    let valuation = value_holdings(
        &holdings,
        market_data,
        shelf,
        &base,
        include_attribute_allocations,
    );

    // External client flows shift the conservation baseline.
    let mut flow_adjustment = Decimal::ZERO;
    for intent in &all_intents {
        if let Intent::CashFlow {
            currency, amount, ..
        } = intent
        {
            flow_adjustment += market_data
                .convert(*amount, currency, &base)
                .unwrap_or(*amount);
        }
    }
    let reconciliation = Reconciliation::evaluate(
        before.total_value + flow_adjustment,
        valuation.state.total_value,
    );

    // Deterministic output order.
    let indexed: Vec<(usize, Intent)> = all_intents.into_iter().enumerate().collect();
    let mut ordered = indexed;
    ordered.sort_by(|(ia, a), (ib, b)| a.ordering_key(*ia).cmp(&b.ordering_key(*ib)));
    let intents = ordered.into_iter().map(|(_, intent)| intent).collect();

    ExecutionOutcome {
        intents,
        after: valuation.state,
        after_data_quality: valuation.data_quality,
        reconciliation,
        negative_holdings,
        uncovered_cash,
        overdraft_used,
        ladder_rungs,
        ladder_breaches,
        ladder_overdraft_utilized,
        missing_fx_pairs,
    }
}

fn apply_cash_effect(cash: &mut BTreeMap<String, Decimal>, intent: &Intent) {
    match intent {
        Intent::SecurityTrade {
            side, notional, ..
        } => {
            let entry = cash.entry(notional.currency.clone()).or_default();
            match side {
                TradeSide::Buy => *entry -= notional.amount,
                TradeSide::Sell => *entry += notional.amount,
            }
        }
        Intent::FxSpot {
            buy_currency,
            buy_amount,
            sell_currency,
            sell_amount_estimated,
            ..
        } => {
            *cash.entry(buy_currency.clone()).or_default() += *buy_amount;
            *cash.entry(sell_currency.clone()).or_default() -= *sell_amount_estimated;
        }
        Intent::CashFlow {
            currency, amount, ..
        } => {
            *cash.entry(currency.clone()).or_default() += *amount;
        }
    }
}

/// Wire BUY dependencies: the funding FX for the trade currency, and
/// optionally every same-currency SELL.
fn wire_dependencies(intents: &mut [Intent], options: &EngineOptions) {
    let mut funding_by_currency: BTreeMap<String, String> = BTreeMap::new();
    let mut sells_by_currency: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for intent in intents.iter() {
        match intent {
            Intent::FxSpot {
                intent_id,
                buy_currency,
                rationale,
                ..
            } if rationale.code == rationale_code::FUNDING => {
                funding_by_currency.insert(buy_currency.clone(), intent_id.clone());
            }
            Intent::SecurityTrade {
                intent_id,
                side: TradeSide::Sell,
                notional,
                ..
            } => {
                sells_by_currency
                    .entry(notional.currency.clone())
                    .or_default()
                    .push(intent_id.clone());
            }
            _ => {}
        }
    }

    for intent in intents.iter_mut() {
        if let Intent::SecurityTrade {
            side: TradeSide::Buy,
            notional,
            dependencies,
            ..
        } = intent
        {
            if let Some(fx_id) = funding_by_currency.get(&notional.currency) {
                dependencies.push(fx_id.clone());
            }
            if options.link_buy_to_same_currency_sell_dependency {
                if let Some(sells) = sells_by_currency.get(&notional.currency) {
                    for sell_id in sells {
                        dependencies.push(sell_id.clone());
                    }
                }
            }
        }
    }
}

fn round_up_minor(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(
        currency_minor_units(currency),
        rust_decimal::RoundingStrategy::AwayFromZero,
    )
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
    use crate::domain::model::portfolio::CashBalance;
    use crate::domain::model::state::EnrichedPosition;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    fn before_with_cash(base: &str, cash: Vec<(&str, Decimal)>) -> SimulatedState {
        let total: Decimal = cash.iter().map(|(_, a)| *a).sum();
        SimulatedState {
            base_currency: base.to_string(),
            total_value: total,
            cash_balances: cash
                .into_iter()
                .map(|(c, a)| CashBalance {
                    currency: c.to_string(),
                    amount: a,
                })
                .collect(),
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

    fn buy_us_etf(quantity: Decimal) -> Intent {
        Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Buy, "US_ETF"),
            instrument_id: "US_ETF".to_string(),
            side: TradeSide::Buy,
            quantity,
            notional: Money::new(quantity * dec!(500), "USD"),
            notional_base: quantity * dec!(500) * dec!(1.35),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        }
    }

    #[test]
    fn test_funding_fx_generated_and_buy_depends_on_it() {
        let before = before_with_cash("SGD", vec![("SGD", dec!(660000))]);
        let outcome = simulate_execution(
            &before,
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
            vec![buy_us_etf(dec!(782))],
            true,
            false,
        );

        let fx: Vec<_> = outcome
            .intents
            .iter()
            .filter(|i| matches!(i, Intent::FxSpot { .. }))
            .collect();
        assert_eq!(fx.len(), 1);
        let Intent::FxSpot {
            intent_id,
            pair,
            buy_amount,
            sell_amount_estimated,
            ..
        } = fx[0]
        else {
            unreachable!()
        };
        assert_eq!(pair, "USD/SGD");
        assert_eq!(*buy_amount, dec!(391000.00));
        assert_eq!(*sell_amount_estimated, dec!(527850.00));

        let Intent::SecurityTrade { dependencies, .. } = outcome
            .intents
            .iter()
            .find(|i| matches!(i, Intent::SecurityTrade { .. }))
            .unwrap()
        else {
            unreachable!()
        };
        assert_eq!(dependencies, &vec![intent_id.clone()]);

        // After: SGD cash 660,000 - 527,850 = 132,150; no shorts, covered.
        assert!(outcome.negative_holdings.is_empty());
        assert!(outcome.uncovered_cash.is_empty());
        assert_eq!(
            outcome.reconciliation.status,
            crate::domain::model::result::ReconciliationStatus::Ok
        );
    }

    #[test]
    fn test_sweep_generated_for_surplus() {
        let before = before_with_cash("SGD", vec![("SGD", dec!(1000)), ("USD", dec!(2000))]);
        let outcome = simulate_execution(
            &before,
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
            vec![],
            true,
            false,
        );
        let Some(Intent::FxSpot {
            pair,
            sell_amount_estimated,
            rationale,
            ..
        }) = outcome
            .intents
            .iter()
            .find(|i| matches!(i, Intent::FxSpot { .. }))
        else {
            panic!("expected sweep fx");
        };
        assert_eq!(pair, "SGD/USD");
        assert_eq!(*sell_amount_estimated, dec!(2000));
        assert_eq!(rationale.code, rationale_code::SWEEP);
    }

    #[test]
    fn test_sell_exceeding_holdings_goes_negative() {
        let mut before = before_with_cash("USD", vec![]);
        before.positions.push(EnrichedPosition {
            instrument_id: "US_ETF".to_string(),
            quantity: dec!(1),
            currency: "USD".to_string(),
            value_instrument: dec!(500),
            value_base: dec!(500),
            weight: Decimal::ONE,
            asset_class: None,
            unpriced: false,
        });
        before.total_value = dec!(500);

        let sell = Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Sell, "US_ETF"),
            instrument_id: "US_ETF".to_string(),
            side: TradeSide::Sell,
            quantity: dec!(3),
            notional: Money::new(dec!(1500), "USD"),
            notional_base: dec!(1500),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        };
        let outcome = simulate_execution(
            &before,
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
            vec![sell],
            true,
            false,
        );
        assert_eq!(outcome.negative_holdings, vec!["US_ETF"]);
    }

    #[test]
    fn test_missing_fx_recorded_for_funding() {
        let mut md = market();
        md.fx_rates.clear();
        let before = before_with_cash("SGD", vec![("SGD", dec!(660000))]);
        let outcome = simulate_execution(
            &before,
            &md,
            &Shelf::default(),
            &EngineOptions::default(),
            vec![buy_us_etf(dec!(10))],
            true,
            false,
        );
        assert_eq!(outcome.missing_fx_pairs, vec!["USD/SGD"]);
        // The USD deficit stays uncovered.
        assert_eq!(outcome.uncovered_cash, vec!["USD"]);
    }

    #[test]
    fn test_output_ordering() {
        let before = before_with_cash("SGD", vec![("SGD", dec!(1000000)), ("USD", dec!(5))]);
        let sell = Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Sell, "ZZZ"),
            instrument_id: "ZZZ".to_string(),
            side: TradeSide::Sell,
            quantity: dec!(1),
            notional: Money::new(dec!(100), "SGD"),
            notional_base: dec!(100),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        };
        let outcome = simulate_execution(
            &before,
            &market(),
            &Shelf::default(),
            &EngineOptions::default(),
            vec![buy_us_etf(dec!(100)), sell],
            true,
            false,
        );
        // SELL first, FX next, BUY last.
        let kinds: Vec<u8> = outcome
            .intents
            .iter()
            .enumerate()
            .map(|(i, intent)| intent.ordering_key(i).0)
            .collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert!(matches!(
            outcome.intents[0],
            Intent::SecurityTrade {
                side: TradeSide::Sell,
                ..
            }
        ));
    }
}
