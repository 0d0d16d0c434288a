//! Advisory auto-funding: cover BUY deficits per currency with FX.
//!
//! Existing cash in the trade currency is used first, then same-currency
//! sell proceeds. The remaining deficit is funded with FX under the
//! one-FX-per-currency policy; source selection follows
//! `fx_funding_source_currency`.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::model::diagnostics::FundingPlanEntry;
use crate::domain::model::intent::{Intent, Rationale, TradeSide, rationale_code};
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::options::{EngineOptions, FxFundingSourceCurrency};
use crate::domain::money::round_to_minor_units;

pub struct FundingOutcome {
    pub fx_intents: Vec<Intent>,
    pub funding_plan: Vec<FundingPlanEntry>,
    pub missing_fx_pairs: Vec<String>,
    /// BUY intent id -> FX intent ids it depends on.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

pub fn plan_auto_funding(
    trades: &[Intent],
    available_cash: &BTreeMap<String, Decimal>,
    base: &str,
    market_data: &MarketDataSnapshot,
    options: &EngineOptions,
) -> FundingOutcome {
    let mut outcome = FundingOutcome {
        fx_intents: vec![],
        funding_plan: vec![],
        missing_fx_pairs: vec![],
        dependencies: BTreeMap::new(),
    };

    // Required notional, sell proceeds, and buy ids per currency.
    let mut required: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut sell_proceeds: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut buys_by_currency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for intent in trades {
        if let Intent::SecurityTrade {
            intent_id,
            side,
            notional,
            ..
        } = intent
        {
            match side {
                TradeSide::Buy => {
                    *required.entry(notional.currency.clone()).or_default() += notional.amount;
                    buys_by_currency
                        .entry(notional.currency.clone())
                        .or_default()
                        .push(intent_id.clone());
                }
                TradeSide::Sell => {
                    *sell_proceeds.entry(notional.currency.clone()).or_default() +=
                        notional.amount;
                }
            }
        }
    }

    let mut remaining_cash: BTreeMap<String, Decimal> = available_cash.clone();
    let buffer = Decimal::ONE + options.fx_buffer_pct;

    for (currency, required_amount) in &required {
        let cash_here = remaining_cash
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        let sells_here = sell_proceeds
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let available = cash_here + sells_here;
        let deficit = (*required_amount - available).max(Decimal::ZERO);

        let mut plan = FundingPlanEntry {
            currency: currency.clone(),
            required: *required_amount,
            available_before_fx: available,
            fx_needed: deficit,
            fx_pair: None,
            funding_currency: None,
        };

        // Local cash is consumed by the buy regardless of FX.
        let consumed_local = cash_here.min(*required_amount);
        if let Some(balance) = remaining_cash.get_mut(currency) {
            *balance -= consumed_local;
        }

        if deficit.is_zero() {
            outcome.funding_plan.push(plan);
            continue;
        }

        // Decide how much each source currency contributes, merging
        // repeated sources so at most one FX per (target, source) pair
        // exists.
        let mut chunks: Vec<(String, Decimal, Decimal)> = Vec::new(); // (source, rate, amount)
        let mut still_needed = deficit;
        for (source, bounded) in funding_sources(currency, base, &remaining_cash, options) {
            if still_needed <= Decimal::ZERO {
                break;
            }
            let Some(rate) = market_data.rate(currency, &source) else {
                let pair = format!("{currency}/{source}");
                if !outcome.missing_fx_pairs.contains(&pair) {
                    outcome.missing_fx_pairs.push(pair);
                }
                continue;
            };
            let capacity = if bounded {
                let source_cash = remaining_cash
                    .get(&source)
                    .copied()
                    .unwrap_or(Decimal::ZERO)
                    .max(Decimal::ZERO);
                market_data
                    .convert(source_cash, &source, currency)
                    .unwrap_or(Decimal::ZERO)
            } else {
                still_needed
            };
            let chunk = still_needed.min(capacity.max(Decimal::ZERO));
            if chunk <= Decimal::ZERO {
                continue;
            }
            match chunks.iter_mut().find(|(s, _, _)| s == &source) {
                Some((_, _, amount)) => *amount += chunk,
                None => chunks.push((source.clone(), rate, chunk)),
            }
            if let Some(balance) = remaining_cash.get_mut(&source) {
                *balance -= chunk * rate;
            }
            still_needed -= chunk;
        }

        let mut fx_ids: Vec<String> = Vec::new();
        for (source, rate, amount) in &chunks {
            let buy_amount = round_to_minor_units(*amount * buffer, currency);
            let sell_amount = round_to_minor_units(buy_amount * rate, source);
            let fx_id = Intent::fx_id(currency, source);
            if plan.fx_pair.is_none() {
                plan.fx_pair = Some(format!("{currency}/{source}"));
                plan.funding_currency = Some(source.clone());
            }
            outcome.fx_intents.push(Intent::FxSpot {
                intent_id: fx_id.clone(),
                pair: format!("{currency}/{source}"),
                buy_currency: currency.clone(),
                buy_amount,
                sell_currency: source.clone(),
                sell_amount_estimated: sell_amount,
                rate: *rate,
                dependencies: vec![],
                rationale: Rationale::new(
                    rationale_code::FUNDING,
                    format!("Fund {currency} purchase from {source}"),
                ),
            });
            fx_ids.push(fx_id);
        }

        for buy_id in buys_by_currency.get(currency).into_iter().flatten() {
            outcome
                .dependencies
                .entry(buy_id.clone())
                .or_default()
                .extend(fx_ids.iter().cloned());
        }

        outcome.funding_plan.push(plan);
    }

    outcome
}

/// Funding source order. `BASE_ONLY` draws everything from base. `ANY_CASH`
/// prefers base cash, then other positive balances lexicographically
/// (excluding the target currency), with base backstopping any remainder.
/// The bool marks whether the source is bounded by its available cash.
fn funding_sources(
    target: &str,
    base: &str,
    cash: &BTreeMap<String, Decimal>,
    options: &EngineOptions,
) -> Vec<(String, bool)> {
    match options.fx_funding_source_currency {
        FxFundingSourceCurrency::BaseOnly => vec![(base.to_string(), false)],
        FxFundingSourceCurrency::AnyCash => {
            let mut sources = vec![(base.to_string(), true)];
            for (currency, balance) in cash {
                if currency != base && currency != target && *balance > Decimal::ZERO {
                    sources.push((currency.clone(), true));
                }
            }
            sources.push((base.to_string(), false));
            sources
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::market::FxRatePoint;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    fn buy(id: &str, notional: Decimal, currency: &str) -> Intent {
        Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Buy, id),
            instrument_id: id.to_string(),
            side: TradeSide::Buy,
            quantity: dec!(1),
            notional: Money::new(notional, currency),
            notional_base: notional,
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::ADVISOR_INSTRUCTION, "advisor"),
            constraints_applied: vec![],
        }
    }

    fn market() -> MarketDataSnapshot {
        MarketDataSnapshot {
            snapshot_id: None,
            prices: vec![],
            fx_rates: vec![
                FxRatePoint {
                    pair: "USD/SGD".to_string(),
                    rate: dec!(1.35),
                },
                FxRatePoint {
                    pair: "EUR/SGD".to_string(),
                    rate: dec!(1.45),
                },
            ],
        }
    }

    #[test]
    fn test_partial_funding_uses_cash_first() {
        // USD cash 5,000, buy 25,000 USD: one FX for the 20,000 deficit.
        let cash = BTreeMap::from([
            ("USD".to_string(), dec!(5000)),
            ("SGD".to_string(), dec!(100000)),
        ]);
        let outcome = plan_auto_funding(
            &[buy("US_ETF", dec!(25000), "USD")],
            &cash,
            "SGD",
            &market(),
            &EngineOptions::default(),
        );

        assert_eq!(outcome.fx_intents.len(), 1);
        let Intent::FxSpot {
            buy_amount,
            sell_amount_estimated,
            pair,
            ..
        } = &outcome.fx_intents[0]
        else {
            unreachable!()
        };
        assert_eq!(pair, "USD/SGD");
        assert_eq!(*buy_amount, dec!(20000.00));
        assert_eq!(*sell_amount_estimated, dec!(27000.00));

        assert_eq!(outcome.funding_plan.len(), 1);
        let plan = &outcome.funding_plan[0];
        assert_eq!(plan.currency, "USD");
        assert_eq!(plan.required, dec!(25000));
        assert_eq!(plan.available_before_fx, dec!(5000));
        assert_eq!(plan.fx_needed, dec!(20000));
        assert_eq!(plan.funding_currency.as_deref(), Some("SGD"));

        let deps = outcome
            .dependencies
            .get("int_buy_US_ETF")
            .expect("buy wired to fx");
        assert_eq!(deps, &vec![Intent::fx_id("USD", "SGD")]);
    }

    #[test]
    fn test_fully_covered_buy_has_no_fx() {
        let cash = BTreeMap::from([("USD".to_string(), dec!(30000))]);
        let outcome = plan_auto_funding(
            &[buy("US_ETF", dec!(25000), "USD")],
            &cash,
            "SGD",
            &market(),
            &EngineOptions::default(),
        );
        assert!(outcome.fx_intents.is_empty());
        assert!(outcome.dependencies.is_empty());
        assert_eq!(outcome.funding_plan[0].fx_needed, Decimal::ZERO);
    }

    #[test]
    fn test_sells_count_as_available() {
        let sell = Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Sell, "OLD_ETF"),
            instrument_id: "OLD_ETF".to_string(),
            side: TradeSide::Sell,
            quantity: dec!(1),
            notional: Money::new(dec!(25000), "USD"),
            notional_base: dec!(25000),
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::ADVISOR_INSTRUCTION, "advisor"),
            constraints_applied: vec![],
        };
        let outcome = plan_auto_funding(
            &[buy("US_ETF", dec!(25000), "USD"), sell],
            &BTreeMap::new(),
            "SGD",
            &market(),
            &EngineOptions::default(),
        );
        assert!(outcome.fx_intents.is_empty());
        assert_eq!(outcome.funding_plan[0].available_before_fx, dec!(25000));
    }

    #[test]
    fn test_missing_fx_pair_recorded() {
        let outcome = plan_auto_funding(
            &[buy("EU_FUND", dec!(10000), "CHF")],
            &BTreeMap::new(),
            "SGD",
            &MarketDataSnapshot {
                snapshot_id: None,
                prices: vec![],
                fx_rates: vec![],
            },
            &EngineOptions::default(),
        );
        assert!(outcome.fx_intents.is_empty());
        assert_eq!(outcome.missing_fx_pairs, vec!["CHF/SGD"]);
    }

    #[test]
    fn test_any_cash_prefers_base_then_lexicographic() {
        // Base SGD has 13,500 (covers 10,000 USD); EUR holds the rest.
        let cash = BTreeMap::from([
            ("SGD".to_string(), dec!(13500)),
            ("EUR".to_string(), dec!(100000)),
        ]);
        let mut options = EngineOptions::default();
        options.fx_funding_source_currency = FxFundingSourceCurrency::AnyCash;
        // Need USD/EUR for the second leg.
        let mut md = market();
        md.fx_rates.push(FxRatePoint {
            pair: "USD/EUR".to_string(),
            rate: dec!(0.90),
        });
        let outcome = plan_auto_funding(
            &[buy("US_ETF", dec!(15000), "USD")],
            &cash,
            "SGD",
            &md,
            &options,
        );
        assert_eq!(outcome.fx_intents.len(), 2);
        let pairs: Vec<&str> = outcome
            .fx_intents
            .iter()
            .map(|i| match i {
                Intent::FxSpot { pair, .. } => pair.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(pairs, vec!["USD/SGD", "USD/EUR"]);
    }
}
