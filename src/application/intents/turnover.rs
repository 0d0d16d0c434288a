//! Turnover cap: bound total traded notional to a fraction of portfolio
//! value, preferring the trades that close the most drift.
//!
//! Selection is skip-and-continue: a trade that does not fit is dropped and
//! the scan keeps going, so smaller trades further down the ranking can
//! still use the remaining room.

use rust_decimal::Decimal;

use crate::domain::model::intent::{DroppedIntent, Intent, drop_reason};

pub struct TurnoverOutcome {
    pub kept: Vec<Intent>,
    pub dropped: Vec<DroppedIntent>,
}

pub fn apply_turnover_cap(
    intents: Vec<Intent>,
    total_value: Decimal,
    max_turnover_pct: Decimal,
) -> TurnoverOutcome {
    let budget = total_value * max_turnover_pct;
    let total_notional: Decimal = intents
        .iter()
        .map(|i| security_notional(i).abs())
        .sum();
    if total_notional <= budget {
        return TurnoverOutcome {
            kept: intents,
            dropped: vec![],
        };
    }

    // Rank by score (|notional| / total) descending; ties by ascending
    // |notional|, instrument id, intent id.
    let mut ranked: Vec<(usize, Decimal)> = intents
        .iter()
        .enumerate()
        .map(|(i, intent)| (i, security_notional(intent).abs()))
        .collect();
    ranked.sort_by(|(ia, na), (ib, nb)| {
        nb.cmp(na)
            .then_with(|| instrument_of(&intents[*ia]).cmp(instrument_of(&intents[*ib])))
            .then_with(|| intents[*ia].intent_id().cmp(intents[*ib].intent_id()))
    });

    let mut selected = vec![false; intents.len()];
    let mut used = Decimal::ZERO;
    for (index, notional) in ranked {
        if used + notional <= budget {
            used += notional;
            selected[index] = true;
        }
    }

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (index, intent) in intents.into_iter().enumerate() {
        if selected[index] {
            kept.push(intent);
        } else if let Intent::SecurityTrade {
            instrument_id,
            side,
            notional_base,
            ..
        } = intent
        {
            dropped.push(DroppedIntent {
                instrument_id,
                side,
                notional_base: notional_base.abs(),
                reason: drop_reason::TURNOVER_LIMIT.to_string(),
            });
        }
    }

    TurnoverOutcome { kept, dropped }
}

fn security_notional(intent: &Intent) -> Decimal {
    match intent {
        Intent::SecurityTrade { notional_base, .. } => *notional_base,
        _ => Decimal::ZERO,
    }
}

fn instrument_of(intent: &Intent) -> &str {
    match intent {
        Intent::SecurityTrade { instrument_id, .. } => instrument_id,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::intent::{Rationale, TradeSide, rationale_code};
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    fn buy(id: &str, notional: Decimal) -> Intent {
        Intent::SecurityTrade {
            intent_id: Intent::security_trade_id(TradeSide::Buy, id),
            instrument_id: id.to_string(),
            side: TradeSide::Buy,
            quantity: dec!(1),
            notional: Money::new(notional, "USD"),
            notional_base: notional,
            dependencies: vec![],
            rationale: Rationale::new(rationale_code::MODEL_DRIFT, "drift"),
            constraints_applied: vec![],
        }
    }

    #[test]
    fn test_skip_and_continue_selection() {
        // A=10k, B=10k, C=2k against a 15k budget: A fits, B does not,
        // C still fits after B is skipped.
        let outcome = apply_turnover_cap(
            vec![buy("A", dec!(10000)), buy("B", dec!(10000)), buy("C", dec!(2000))],
            dec!(100000),
            dec!(0.15),
        );
        let kept: Vec<&str> = outcome
            .kept
            .iter()
            .map(|i| match i {
                Intent::SecurityTrade { instrument_id, .. } => instrument_id.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(kept, vec!["A", "C"]);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].instrument_id, "B");
        assert_eq!(outcome.dropped[0].reason, drop_reason::TURNOVER_LIMIT);
    }

    #[test]
    fn test_under_budget_untouched() {
        let outcome = apply_turnover_cap(
            vec![buy("A", dec!(1000))],
            dec!(100000),
            dec!(0.15),
        );
        assert_eq!(outcome.kept.len(), 1);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn test_tie_breaks_by_instrument_id() {
        // Equal notionals: ascending instrument id wins the last slot.
        let outcome = apply_turnover_cap(
            vec![buy("B", dec!(5000)), buy("A", dec!(5000))],
            dec!(100000),
            dec!(0.05),
        );
        let kept: Vec<&str> = outcome
            .kept
            .iter()
            .map(|i| match i {
                Intent::SecurityTrade { instrument_id, .. } => instrument_id.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(kept, vec!["A"]);
    }
}
