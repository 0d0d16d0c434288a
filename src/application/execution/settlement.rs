//! Settlement ladder: project per-currency cash across day offsets.
//!
//! Securities settle on the shelf's `settlement_days`, FX legs on
//! `fx_settlement_days`. Balances accumulate day by day; a day whose
//! cumulative balance dips below the allowed overdraft is a breach.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::model::diagnostics::{CashLadderBreach, CashLadderRung};
use crate::domain::model::intent::{Intent, TradeSide};
use crate::domain::model::options::EngineOptions;
use crate::domain::model::shelf::Shelf;

pub struct LadderOutcome {
    pub rungs: Vec<CashLadderRung>,
    pub breaches: Vec<CashLadderBreach>,
    /// True when an allowed overdraft was used without being breached.
    pub overdraft_utilized: bool,
}

pub fn build_ladder(
    opening_cash: &BTreeMap<String, Decimal>,
    intents: &[Intent],
    shelf: &Shelf,
    options: &EngineOptions,
) -> LadderOutcome {
    // (currency, day) -> flow. Day 0 carries the opening balances and any
    // client cash flows.
    let mut flows: BTreeMap<(String, u8), Decimal> = BTreeMap::new();
    for (currency, amount) in opening_cash {
        *flows.entry((currency.clone(), 0)).or_default() += *amount;
    }

    let mut max_day = options.settlement_horizon_days;
    for intent in intents {
        match intent {
            Intent::SecurityTrade {
                instrument_id,
                side,
                notional,
                ..
            } => {
                let day = shelf.settlement_days(instrument_id);
                max_day = max_day.max(day);
                let signed = match side {
                    TradeSide::Sell => notional.amount,
                    TradeSide::Buy => -notional.amount,
                };
                *flows.entry((notional.currency.clone(), day)).or_default() += signed;
            }
            Intent::FxSpot {
                buy_currency,
                buy_amount,
                sell_currency,
                sell_amount_estimated,
                ..
            } => {
                let day = options.fx_settlement_days;
                max_day = max_day.max(day);
                *flows.entry((buy_currency.clone(), day)).or_default() += *buy_amount;
                *flows.entry((sell_currency.clone(), day)).or_default() -=
                    *sell_amount_estimated;
            }
            Intent::CashFlow {
                currency, amount, ..
            } => {
                *flows.entry((currency.clone(), 0)).or_default() += *amount;
            }
        }
    }

    let mut currencies: Vec<String> = flows.keys().map(|(c, _)| c.clone()).collect();
    currencies.sort();
    currencies.dedup();

    let mut rungs = Vec::new();
    let mut breaches = Vec::new();
    let mut overdraft_utilized = false;

    for currency in currencies {
        let limit = options.overdraft_limit(&currency);
        let mut balance = Decimal::ZERO;
        for day in 0..=max_day {
            balance += flows
                .get(&(currency.clone(), day))
                .copied()
                .unwrap_or(Decimal::ZERO);
            rungs.push(CashLadderRung {
                currency: currency.clone(),
                day,
                balance,
            });
            if balance < -limit {
                breaches.push(CashLadderBreach {
                    currency: currency.clone(),
                    day,
                    balance,
                    overdraft_limit: limit,
                    reason: format!("OVERDRAFT_ON_T_PLUS_{day}"),
                });
            } else if balance < Decimal::ZERO {
                overdraft_utilized = true;
            }
        }
    }

    LadderOutcome {
        rungs,
        breaches,
        overdraft_utilized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::intent::{Rationale, rationale_code};
    use crate::domain::model::shelf::{ShelfEntry, ShelfStatus};
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    fn shelf(entries: &[(&str, u8)]) -> Shelf {
        Shelf::from_entries(
            entries
                .iter()
                .map(|(id, days)| ShelfEntry {
                    instrument_id: id.to_string(),
                    status: ShelfStatus::Approved,
                    asset_class: "FUND".to_string(),
                    min_notional: None,
                    settlement_days: *days,
                    attributes: Default::default(),
                    issuer_id: None,
                    liquidity_tier: None,
                })
                .collect(),
        )
    }

    fn trade(id: &str, side: TradeSide, notional: Decimal) -> Intent {
        Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(side, id),
            instrument_id: id.to_string(),
            side,
            quantity: dec!(1),
            notional: Money::new(notional, "SGD"),
            notional_base: notional,
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        }
    }

    #[test]
    fn test_mismatched_settlement_goes_negative() {
        // Sell settles T+3, buy settles T+1: days 1 and 2 are negative,
        // day 3 recovers to zero.
        let shelf = shelf(&[("SlowFund", 3), ("FastStock", 1)]);
        let mut options = EngineOptions::default();
        options.enable_settlement_awareness = true;
        options.settlement_horizon_days = 3;

        let outcome = build_ladder(
            &BTreeMap::new(),
            &[
                trade("SlowFund", TradeSide::Sell, dec!(100000)),
                trade("FastStock", TradeSide::Buy, dec!(100000)),
            ],
            &shelf,
            &options,
        );

        let rung = |day: u8| {
            outcome
                .rungs
                .iter()
                .find(|r| r.currency == "SGD" && r.day == day)
                .unwrap()
                .balance
        };
        assert_eq!(rung(0), Decimal::ZERO);
        assert_eq!(rung(1), dec!(-100000));
        assert_eq!(rung(2), dec!(-100000));
        assert_eq!(rung(3), Decimal::ZERO);

        assert_eq!(outcome.breaches.len(), 2);
        assert_eq!(outcome.breaches[0].reason, "OVERDRAFT_ON_T_PLUS_1");
    }

    #[test]
    fn test_allowed_overdraft_is_utilized_not_breached() {
        let shelf = shelf(&[("SlowFund", 3), ("FastStock", 1)]);
        let mut options = EngineOptions::default();
        options.enable_settlement_awareness = true;
        options
            .max_overdraft_by_ccy
            .insert("SGD".to_string(), dec!(150000));

        let outcome = build_ladder(
            &BTreeMap::new(),
            &[
                trade("SlowFund", TradeSide::Sell, dec!(100000)),
                trade("FastStock", TradeSide::Buy, dec!(100000)),
            ],
            &shelf,
            &options,
        );
        assert!(outcome.breaches.is_empty());
        assert!(outcome.overdraft_utilized);
    }

    #[test]
    fn test_settlement_day_on_horizon_included() {
        let shelf = shelf(&[("EdgeFund", 5)]);
        let mut options = EngineOptions::default();
        options.settlement_horizon_days = 5;
        let outcome = build_ladder(
            &BTreeMap::new(),
            &[trade("EdgeFund", TradeSide::Buy, dec!(1000))],
            &shelf,
            &options,
        );
        let day5 = outcome
            .rungs
            .iter()
            .find(|r| r.day == 5)
            .expect("horizon day present");
        assert_eq!(day5.balance, dec!(-1000));
    }

    #[test]
    fn test_fx_settles_on_fx_days() {
        let mut options = EngineOptions::default();
        options.fx_settlement_days = 2;
        let fx = Intent::FxSpot {
            intent_id: Intent::fx_id("USD", "SGD"),
            pair: "USD/SGD".to_string(),
            buy_currency: "USD".to_string(),
            buy_amount: dec!(1000),
            sell_currency: "SGD".to_string(),
            sell_amount_estimated: dec!(1350),
            rate: dec!(1.35),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::FUNDING, "funding"),
        };
        let outcome = build_ladder(&BTreeMap::new(), &[fx], &Shelf::default(), &options);
        let usd_day2 = outcome
            .rungs
            .iter()
            .find(|r| r.currency == "USD" && r.day == 2)
            .unwrap();
        assert_eq!(usd_day2.balance, dec!(1000));
        let usd_day1 = outcome
            .rungs
            .iter()
            .find(|r| r.currency == "USD" && r.day == 1)
            .unwrap();
        assert_eq!(usd_day1.balance, Decimal::ZERO);
    }
}
