//! Tax-aware sell sizing.
//!
//! Sells consume lots highest-cost-first (HIFO): `unit_cost` descending,
//! `purchase_date` descending, `lot_id` ascending. Realized gains accumulate
//! against the base-currency budget; a sell that would overshoot is reduced
//! to the remaining headroom and further selling of that instrument stops.
//! Loss lots always improve headroom.

use rust_decimal::Decimal;

use crate::domain::model::diagnostics::TaxBudgetConstraintEvent;
use crate::domain::model::intent::{Intent, TradeSide};
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::portfolio::{PortfolioSnapshot, TaxLot};
use crate::domain::model::result::TaxImpact;

pub struct TaxOutcome {
    pub intents: Vec<Intent>,
    pub impact: TaxImpact,
    pub events: Vec<TaxBudgetConstraintEvent>,
}

pub fn apply_tax_budget(
    intents: Vec<Intent>,
    portfolio: &PortfolioSnapshot,
    market_data: &MarketDataSnapshot,
    budget: Option<Decimal>,
) -> TaxOutcome {
    let base = &portfolio.base_currency;
    let mut impact = TaxImpact {
        budget,
        ..TaxImpact::default()
    };
    let mut events = Vec::new();
    let mut realized_total = Decimal::ZERO;
    let mut adjusted = Vec::with_capacity(intents.len());

    for intent in intents {
        let (
            intent_id,
            instrument_id,
            quantity,
            notional,
            notional_base,
            dependencies,
            rationale,
            constraints_applied,
        ) = match intent {
            Intent::SecurityTrade {
                intent_id,
                instrument_id,
                side: TradeSide::Sell,
                quantity,
                notional,
                notional_base,
                dependencies,
                rationale,
                constraints_applied,
            } => (
                intent_id,
                instrument_id,
                quantity,
                notional,
                notional_base,
                dependencies,
                rationale,
                constraints_applied,
            ),
            other => {
                adjusted.push(other);
                continue;
            }
        };

        let lots = portfolio
            .position(&instrument_id)
            .and_then(|p| p.lots.clone());
        let Some(mut lots) = lots else {
            // No lot information: the sell passes through untouched.
            adjusted.push(Intent::SecurityTrade {
                intent_id,
                instrument_id,
                side: TradeSide::Sell,
                quantity,
                notional,
                notional_base,
                dependencies,
                rationale,
                constraints_applied,
            });
            continue;
        };
        sort_hifo(&mut lots);

        let unit_price = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            notional.amount / quantity
        };
        let rate_to_base = market_data
            .rate(&notional.currency, base)
            .unwrap_or(Decimal::ONE);

        let mut remaining = quantity;
        let mut allowed = Decimal::ZERO;
        let mut constrained = false;

        for lot in &lots {
            if remaining.is_zero() {
                break;
            }
            let take = remaining.min(lot.quantity);
            if take.is_zero() {
                continue;
            }
            let gain_per_unit_base = (unit_price - lot.unit_cost.amount) * rate_to_base;
            let lot_gain = gain_per_unit_base * take;

            if gain_per_unit_base <= Decimal::ZERO {
                // Losses (and flat lots) always fit and restore headroom.
                realized_total += lot_gain;
                impact.total_realized_loss += lot_gain.min(Decimal::ZERO);
                impact.lots_consumed += 1;
                allowed += take;
                remaining -= take;
                continue;
            }

            match budget {
                Some(cap) => {
                    let headroom = cap - realized_total;
                    if headroom <= Decimal::ZERO {
                        constrained = true;
                        break;
                    }
                    if lot_gain <= headroom {
                        realized_total += lot_gain;
                        impact.total_realized_gain += lot_gain;
                        impact.lots_consumed += 1;
                        allowed += take;
                        remaining -= take;
                    } else {
                        // Partial fill: only as many units as the headroom
                        // supports, floored to whole units.
                        let fit = (headroom / gain_per_unit_base).floor();
                        if fit > Decimal::ZERO {
                            let fit = fit.min(take);
                            let gain = gain_per_unit_base * fit;
                            realized_total += gain;
                            impact.total_realized_gain += gain;
                            impact.lots_consumed += 1;
                            allowed += fit;
                        }
                        constrained = true;
                        break;
                    }
                }
                None => {
                    realized_total += lot_gain;
                    impact.total_realized_gain += lot_gain;
                    impact.lots_consumed += 1;
                    allowed += take;
                    remaining -= take;
                }
            }
        }

        if constrained {
            impact.budget_exhausted = true;
            events.push(TaxBudgetConstraintEvent {
                instrument_id: instrument_id.clone(),
                requested_quantity: quantity,
                allowed_quantity: allowed,
                realized_gain: realized_total,
                remaining_budget: budget.map(|c| c - realized_total).unwrap_or(Decimal::ZERO),
            });
        }

        if allowed.is_zero() {
            continue;
        }

        let new_notional = unit_price * allowed;
        adjusted.push(Intent::SecurityTrade {
            intent_id,
            instrument_id,
            side: TradeSide::Sell,
            quantity: allowed,
            notional: crate::domain::money::Money::new(new_notional, notional.currency.clone()),
            notional_base: new_notional * rate_to_base,
            dependencies,
            rationale,
            constraints_applied,
        });
    }

    TaxOutcome {
        intents: adjusted,
        impact,
        events,
    }
}

fn sort_hifo(lots: &mut [TaxLot]) {
    lots.sort_by(|a, b| {
        b.unit_cost
            .amount
            .cmp(&a.unit_cost.amount)
            .then_with(|| b.purchase_date.cmp(&a.purchase_date))
            .then_with(|| a.lot_id.cmp(&b.lot_id))
    });
}
