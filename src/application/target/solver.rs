//! Solver-backed target generation.
//!
//! Formulates `min ||w - w_model||^2` over the tradeable universe with box
//! bounds, group caps, and a budget band derived from the cash constraints,
//! then tries the configured backends in fixed order. Infeasible problems
//! are classified into recognizable contradiction hints before the result
//! is surfaced.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::sync::Arc;

use crate::domain::model::options::EngineOptions;
use crate::domain::model::shelf::Shelf;
use crate::domain::model::target::{TargetEntry, TargetReason, TargetSet, Universe};
use crate::domain::ports::{GroupBound, QuadraticProblem, QuadraticSolver, SolveOutcome};
use tracing::warn;

use super::{TargetGeneration, reason_code};

const WEIGHT_SCALE: u32 = 9;

struct Formulation {
    /// Universe indices of the free (non-locked, tradeable) variables.
    variable_entries: Vec<usize>,
    problem: QuadraticProblem,
}

pub fn generate(
    universe: &Universe,
    shelf: &Shelf,
    options: &EngineOptions,
    solvers: &[Arc<dyn QuadraticSolver>],
) -> TargetGeneration {
    let formulation = match formulate(universe, shelf, options) {
        Ok(f) => f,
        Err(generation) => return generation,
    };

    let hints = infeasibility_hints(universe, shelf, options, &formulation);

    let mut last_error: Option<String> = None;
    for solver in solvers {
        match solver.minimize_distance(&formulation.problem) {
            Ok(SolveOutcome::Solved { weights }) => {
                return assemble(universe, &formulation, solver.name(), &weights);
            }
            Ok(SolveOutcome::Infeasible { status }) => {
                let mut reason_codes = vec![format!("INFEASIBLE_{status}")];
                reason_codes.extend(hints.clone());
                return TargetGeneration::Blocked {
                    reason_codes,
                    message: format!("{} reported the problem infeasible", solver.name()),
                };
            }
            Err(err) => {
                warn!("Solver backend {} failed: {}", solver.name(), err);
                last_error = Some(err.to_string());
            }
        }
    }

    TargetGeneration::Blocked {
        reason_codes: vec![reason_code::SOLVER_ERROR.to_string()],
        message: last_error.unwrap_or_else(|| "No solver backend available".to_string()),
    }
}

fn formulate(
    universe: &Universe,
    shelf: &Shelf,
    options: &EngineOptions,
) -> Result<Formulation, TargetGeneration> {
    let mut variable_entries = Vec::new();
    let mut target = Vec::new();
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    let mut locked_total = Decimal::ZERO;

    let cap = options
        .single_position_max_weight
        .and_then(|c| c.to_f64())
        .unwrap_or(1.0);

    for (index, entry) in universe.entries.iter().enumerate() {
        if entry.is_locked() {
            locked_total += entry.current_weight;
            continue;
        }
        if !entry.buy_eligible && !entry.sell_eligible {
            continue;
        }
        let model_weight = entry.model_weight.to_f64().unwrap_or(0.0);
        let max_weight = if entry.buy_eligible {
            cap
        } else {
            // Sell-only: cannot buy above the current holding.
            entry.current_weight.to_f64().unwrap_or(0.0).min(cap)
        };
        variable_entries.push(index);
        target.push(model_weight);
        lower.push(0.0);
        upper.push(max_weight.max(0.0));
    }

    // The model's implicit cash sleeve (weights sum to 1 including CASH)
    // anchors the budget when no explicit band is configured.
    let model_security_total: Decimal = universe.entries.iter().map(|e| e.model_weight).sum();
    let model_cash = (Decimal::ONE - model_security_total).max(Decimal::ZERO);
    let (budget_min, budget_max) = budget_band(options, locked_total, model_cash);
    if budget_min > budget_max + 1e-12 {
        return Err(TargetGeneration::Blocked {
            reason_codes: vec![
                "INFEASIBLE_EMPTY_BUDGET".to_string(),
                reason_code::HINT_CASH_BAND_CONTRADICTION.to_string(),
            ],
            message: "Cash band leaves no feasible security budget".to_string(),
        });
    }

    let groups = options
        .group_constraints
        .iter()
        .filter_map(|(key, constraint)| {
            let (attribute, value) = key.split_once(':')?;
            let mut indices = Vec::new();
            let mut locked_in_group = Decimal::ZERO;
            for (slot, &entry_index) in variable_entries.iter().enumerate() {
                let entry = &universe.entries[entry_index];
                if shelf
                    .get(&entry.instrument_id)
                    .and_then(|e| e.attribute(attribute))
                    .map(|v| v == value)
                    .unwrap_or(false)
                {
                    indices.push(slot);
                }
            }
            for entry in universe.entries.iter().filter(|e| e.is_locked()) {
                if shelf
                    .get(&entry.instrument_id)
                    .and_then(|e| e.attribute(attribute))
                    .map(|v| v == value)
                    .unwrap_or(false)
                {
                    locked_in_group += entry.current_weight;
                }
            }
            let max_weight = (constraint.max_weight - locked_in_group)
                .to_f64()
                .unwrap_or(0.0);
            Some(GroupBound {
                key: key.clone(),
                indices,
                max_weight,
            })
        })
        .collect();

    Ok(Formulation {
        variable_entries,
        problem: QuadraticProblem {
            target,
            lower,
            upper,
            groups,
            budget_min,
            budget_max,
        },
    })
}

/// Security budget band: `1 - locked - cash_max <= sum(w) <= 1 - locked -
/// cash_min`. Without a configured band the budget pins to the model's
/// cash sleeve so the solver cannot silently park value in (or drain) cash.
fn budget_band(options: &EngineOptions, locked_total: Decimal, model_cash: Decimal) -> (f64, f64) {
    let locked = locked_total.to_f64().unwrap_or(0.0);
    let band_min = options
        .cash_band_min_weight
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0);
    let buffer_min = options
        .min_cash_buffer_pct
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0);
    let band_configured =
        options.cash_band_min_weight.is_some() || options.cash_band_max_weight.is_some();

    if !band_configured {
        let cash = model_cash.to_f64().unwrap_or(0.0).max(buffer_min);
        let budget = (1.0 - locked - cash).max(0.0);
        return (budget, budget);
    }

    let cash_min = band_min.max(buffer_min);
    let budget_max = (1.0 - locked - cash_min).max(0.0);
    let budget_min = match options.cash_band_max_weight.and_then(|d| d.to_f64()) {
        Some(cash_max) => (1.0 - locked - cash_max).max(0.0),
        None => budget_max,
    };
    (budget_min.min(budget_max), budget_max)
}

fn infeasibility_hints(
    universe: &Universe,
    shelf: &Shelf,
    options: &EngineOptions,
    formulation: &Formulation,
) -> Vec<String> {
    let mut hints = Vec::new();

    if let (Some(cash_min), Some(cash_max)) =
        (options.cash_band_min_weight, options.cash_band_max_weight)
    {
        if cash_min > cash_max {
            hints.push(reason_code::HINT_CASH_BAND_CONTRADICTION.to_string());
        }
    }

    let capacity: f64 = formulation.problem.upper.iter().sum();
    if capacity + 1e-12 < formulation.problem.budget_min {
        hints.push(reason_code::HINT_SINGLE_POSITION_CAPACITY.to_string());
    }

    for (key, constraint) in &options.group_constraints {
        let Some((attribute, value)) = key.split_once(':') else {
            continue;
        };
        let locked_in_group: Decimal = universe
            .entries
            .iter()
            .filter(|e| e.is_locked())
            .filter(|e| {
                shelf
                    .get(&e.instrument_id)
                    .and_then(|s| s.attribute(attribute))
                    .map(|v| v == value)
                    .unwrap_or(false)
            })
            .map(|e| e.current_weight)
            .sum();
        if locked_in_group > constraint.max_weight {
            hints.push(format!("{}{key}", reason_code::HINT_LOCKED_GROUP_WEIGHT_PREFIX));
        }
    }

    hints
}

fn assemble(
    universe: &Universe,
    formulation: &Formulation,
    backend: &str,
    weights: &[f64],
) -> TargetGeneration {
    let mut entries = Vec::with_capacity(universe.entries.len());
    let mut security_total = Decimal::ZERO;

    for (index, entry) in universe.entries.iter().enumerate() {
        let mut reasons = Vec::new();
        let final_weight = if entry.is_locked() {
            reasons.push(TargetReason::LockedPosition);
            entry.current_weight
        } else if let Some(slot) = formulation
            .variable_entries
            .iter()
            .position(|&i| i == index)
        {
            let solved = weights.get(slot).copied().unwrap_or(0.0).max(0.0);
            let rounded = Decimal::from_f64(solved)
                .unwrap_or(Decimal::ZERO)
                .round_dp(WEIGHT_SCALE);
            let upper = formulation.problem.upper[slot];
            if upper < 1.0 && (solved - upper).abs() < 1e-9 && upper + 1e-9 < formulation.problem.target[slot] {
                reasons.push(TargetReason::CappedByMaxWeight);
            }
            if !entry.in_model && rounded > Decimal::ZERO {
                reasons.push(TargetReason::RedistributedRecipient);
            }
            if !entry.in_model && rounded.is_zero() {
                reasons.push(TargetReason::ImplicitSellToZero);
            }
            rounded
        } else {
            if !entry.in_model {
                reasons.push(TargetReason::ImplicitSellToZero);
            }
            Decimal::ZERO
        };

        security_total += final_weight;
        entries.push(TargetEntry {
            instrument_id: entry.instrument_id.clone(),
            model_weight: entry.model_weight,
            final_weight: final_weight.normalize(),
            reasons,
        });
    }

    let cash_weight = (Decimal::ONE - security_total).normalize();

    TargetGeneration::Generated(TargetSet {
        method: "SOLVER".to_string(),
        entries,
        cash_weight,
        explanation: Some(serde_json::json!({ "backend": backend })),
    })
}
