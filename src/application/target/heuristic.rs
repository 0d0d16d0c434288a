//! Heuristic target generation.
//!
//! Works the model weights through a fixed sequence of adjustments:
//! absorb displaced weight into buy-eligible instruments, apply the
//! single-position cap, apply group constraints in ascending key order,
//! then reserve the cash buffer. Each stage redistributes released weight
//! proportionally and tags the affected targets. Stages are applied once,
//! in order; a later stage does not re-trigger an earlier cap.

use rust_decimal::Decimal;
use std::collections::BTreeSet;

use crate::domain::model::options::EngineOptions;
use crate::domain::model::shelf::Shelf;
use crate::domain::model::target::{TargetEntry, TargetReason, TargetSet, Universe};

use super::{TargetGeneration, reason_code};

struct Working {
    instrument_id: String,
    model_weight: Decimal,
    weight: Decimal,
    buy_eligible: bool,
    locked: bool,
    reasons: BTreeSet<TargetReason>,
}

pub fn generate(universe: &Universe, shelf: &Shelf, options: &EngineOptions) -> TargetGeneration {
    let mut working: Vec<Working> = universe
        .entries
        .iter()
        .map(|entry| {
            let mut reasons = BTreeSet::new();
            let weight = if entry.is_locked() {
                reasons.insert(TargetReason::LockedPosition);
                entry.current_weight
            } else if entry.in_model && entry.buy_eligible {
                entry.model_weight
            } else if entry.in_model && entry.sell_eligible {
                // Sell-only: keep what is held, up to the model weight.
                entry.current_weight.min(entry.model_weight).max(Decimal::ZERO)
            } else if entry.in_model {
                Decimal::ZERO
            } else {
                reasons.insert(TargetReason::ImplicitSellToZero);
                Decimal::ZERO
            };
            Working {
                instrument_id: entry.instrument_id.clone(),
                model_weight: entry.model_weight,
                weight,
                buy_eligible: entry.buy_eligible,
                locked: entry.is_locked(),
                reasons,
            }
        })
        .collect();

    // 1. Absorb displaced model weight.
    if universe.displaced_weight > Decimal::ZERO {
        let recipients: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, w)| !w.locked && w.buy_eligible)
            .map(|(i, _)| i)
            .collect();
        if recipients.is_empty() {
            return no_destination();
        }
        distribute(&mut working, &recipients, universe.displaced_weight);
    }

    // 2. Single-position cap. One pass: instruments over the cap are
    // trimmed and the excess flows to the remaining buy-eligible targets.
    // Recipients are not re-checked; later stages own their own caps.
    if let Some(cap) = options.single_position_max_weight {
        let over: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, w)| !w.locked && w.buy_eligible && w.weight > cap)
            .map(|(i, _)| i)
            .collect();
        if !over.is_empty() {
            let mut excess = Decimal::ZERO;
            for &i in &over {
                excess += working[i].weight - cap;
                working[i].weight = cap;
                working[i].reasons.insert(TargetReason::CappedByMaxWeight);
            }
            let destinations: Vec<usize> = working
                .iter()
                .enumerate()
                .filter(|(_, w)| {
                    !w.locked
                        && w.buy_eligible
                        && !w.reasons.contains(&TargetReason::CappedByMaxWeight)
                })
                .map(|(i, _)| i)
                .collect();
            if destinations.is_empty() {
                return no_destination();
            }
            distribute(&mut working, &destinations, excess);
        }
    }

    // 3. Group constraints, ascending "attribute:value" key order.
    for (key, constraint) in &options.group_constraints {
        let Some((attribute, value)) = key.split_once(':') else {
            continue;
        };
        let members: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, w)| {
                shelf
                    .get(&w.instrument_id)
                    .and_then(|e| e.attribute(attribute))
                    .map(|v| v == value)
                    .unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();
        let group_weight: Decimal = members.iter().map(|&i| working[i].weight).sum();
        if group_weight <= constraint.max_weight {
            continue;
        }

        let locked_weight: Decimal = members
            .iter()
            .filter(|&&i| working[i].locked)
            .map(|&i| working[i].weight)
            .sum();
        let tradeable: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| !working[i].locked)
            .collect();
        let tradeable_weight = group_weight - locked_weight;
        let target_tradeable = (constraint.max_weight - locked_weight).max(Decimal::ZERO);
        let released = tradeable_weight - target_tradeable;

        if tradeable_weight > Decimal::ZERO {
            // Multiply before dividing: exact when the ratio terminates, and
            // the last member absorbs any residue either way.
            let mut assigned = Decimal::ZERO;
            for (pos, &i) in tradeable.iter().enumerate() {
                let scaled = if pos == tradeable.len() - 1 {
                    target_tradeable - assigned
                } else {
                    working[i].weight * target_tradeable / tradeable_weight
                };
                assigned += scaled;
                working[i].weight = scaled;
                working[i].reasons.insert(TargetReason::CappedByGroupLimit);
            }
        }

        if released > Decimal::ZERO {
            let member_set: BTreeSet<usize> = members.iter().copied().collect();
            let destinations: Vec<usize> = working
                .iter()
                .enumerate()
                .filter(|(i, w)| !w.locked && w.buy_eligible && !member_set.contains(i))
                .map(|(i, _)| i)
                .collect();
            if destinations.is_empty() {
                return no_destination();
            }
            distribute(&mut working, &destinations, released);
        }
    }

    // 4. Cash buffer: scale tradeable weights down until the implied cash
    // weight reaches the floor. The model's explicit cash sleeve is already
    // part of the implied cash (1 - security weights).
    if let Some(buffer) = options.min_cash_buffer_pct {
        let security_total: Decimal = working.iter().map(|w| w.weight).sum();
        let implied_cash = Decimal::ONE - security_total;
        if implied_cash < buffer {
            let needed = buffer - implied_cash;
            let tradeable_total: Decimal = working
                .iter()
                .filter(|w| !w.locked)
                .map(|w| w.weight)
                .sum();
            if tradeable_total < needed {
                return no_destination();
            }
            let kept = tradeable_total - needed;
            let mut assigned = Decimal::ZERO;
            let tradeable: Vec<usize> = working
                .iter()
                .enumerate()
                .filter(|(_, w)| !w.locked)
                .map(|(i, _)| i)
                .collect();
            for (pos, &i) in tradeable.iter().enumerate() {
                let scaled = if pos == tradeable.len() - 1 {
                    kept - assigned
                } else {
                    working[i].weight * kept / tradeable_total
                };
                assigned += scaled;
                working[i].weight = scaled;
            }
        }
    }

    let security_total: Decimal = working.iter().map(|w| w.weight).sum();
    let cash_weight = Decimal::ONE - security_total;

    let entries = working
        .into_iter()
        .map(|w| TargetEntry {
            instrument_id: w.instrument_id,
            model_weight: w.model_weight,
            final_weight: w.weight.normalize(),
            reasons: w.reasons.into_iter().collect(),
        })
        .collect();

    TargetGeneration::Generated(TargetSet {
        method: "HEURISTIC".to_string(),
        entries,
        cash_weight: cash_weight.normalize(),
        explanation: None,
    })
}

fn no_destination() -> TargetGeneration {
    TargetGeneration::Blocked {
        reason_codes: vec![reason_code::NO_ELIGIBLE_REDISTRIBUTION_DESTINATION.to_string()],
        message: "No buy-eligible instrument can absorb redistributed weight".to_string(),
    }
}

/// Distribute `amount` across `destinations` proportionally to their
/// current weight (equal split when all are zero). The final recipient
/// absorbs the division residue so the distributed total is exact.
fn distribute(working: &mut [Working], destinations: &[usize], amount: Decimal) {
    let basis: Decimal = destinations.iter().map(|&i| working[i].weight).sum();
    let mut remaining = amount;
    for (pos, &i) in destinations.iter().enumerate() {
        let share = if pos == destinations.len() - 1 {
            remaining
        } else if basis > Decimal::ZERO {
            amount * working[i].weight / basis
        } else {
            amount / Decimal::from(destinations.len() as i64)
        };
        working[i].weight += share;
        working[i].reasons.insert(TargetReason::RedistributedRecipient);
        remaining -= share;
    }
}
