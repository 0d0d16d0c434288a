//! Target generation stage: heuristic and solver paths plus the optional
//! dual-method comparison.

pub mod heuristic;
pub mod solver;

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::model::diagnostics::warning_code;
use crate::domain::model::options::{EngineOptions, TargetMethod};
use crate::domain::model::result::TargetMethodComparison;
use crate::domain::model::rules::{RuleResult, RuleSeverity};
use crate::domain::model::shelf::Shelf;
use crate::domain::model::target::{TargetEntry, TargetSet, Universe};
use crate::domain::ports::QuadraticSolver;

pub mod reason_code {
    pub const NO_ELIGIBLE_REDISTRIBUTION_DESTINATION: &str =
        "NO_ELIGIBLE_REDISTRIBUTION_DESTINATION";
    pub const SOLVER_ERROR: &str = "SOLVER_ERROR";
    pub const HINT_CASH_BAND_CONTRADICTION: &str = "INFEASIBILITY_HINT_CASH_BAND_CONTRADICTION";
    pub const HINT_SINGLE_POSITION_CAPACITY: &str = "INFEASIBILITY_HINT_SINGLE_POSITION_CAPACITY";
    pub const HINT_LOCKED_GROUP_WEIGHT_PREFIX: &str = "INFEASIBILITY_HINT_LOCKED_GROUP_WEIGHT_";
}

/// Rule id carrying target-stage feasibility outcomes into the rule list.
pub const TARGET_FEASIBILITY_RULE: &str = "TARGET_FEASIBILITY";

#[derive(Debug, Clone)]
pub enum TargetGeneration {
    Generated(TargetSet),
    Blocked {
        reason_codes: Vec<String>,
        message: String,
    },
}

impl TargetGeneration {
    pub fn status_label(&self) -> &'static str {
        match self {
            TargetGeneration::Generated(_) => "GENERATED",
            TargetGeneration::Blocked { .. } => "BLOCKED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetStageOutput {
    /// The generated targets, or a hold-current fallback when blocked.
    pub target: TargetSet,
    /// Failing HARD rule when the stage blocked the run.
    pub feasibility: Option<RuleResult>,
    pub warnings: Vec<String>,
}

pub fn generate_targets(
    universe: &Universe,
    shelf: &Shelf,
    options: &EngineOptions,
    solvers: &[Arc<dyn QuadraticSolver>],
) -> TargetStageOutput {
    let primary = run_method(options.target_method, universe, shelf, options, solvers);

    let mut warnings = Vec::new();
    let mut comparison = None;
    if options.compare_target_methods {
        let secondary_method = match options.target_method {
            TargetMethod::Heuristic => TargetMethod::Solver,
            TargetMethod::Solver => TargetMethod::Heuristic,
        };
        let secondary = run_method(secondary_method, universe, shelf, options, solvers);
        let (built, divergence_warnings) = compare_methods(
            options.target_method,
            secondary_method,
            &primary,
            &secondary,
            options.compare_target_methods_tolerance,
        );
        comparison = Some(built);
        warnings.extend(divergence_warnings);
    }

    match primary {
        TargetGeneration::Generated(mut target) => {
            if let Some(comparison) = comparison {
                let mut explanation = target
                    .explanation
                    .take()
                    .unwrap_or_else(|| serde_json::json!({}));
                if let Some(map) = explanation.as_object_mut() {
                    map.insert(
                        "target_method_comparison".to_string(),
                        serde_json::to_value(&comparison).unwrap_or(serde_json::Value::Null),
                    );
                }
                target.explanation = Some(explanation);
            }
            TargetStageOutput {
                target,
                feasibility: None,
                warnings,
            }
        }
        TargetGeneration::Blocked {
            reason_codes,
            message,
        } => TargetStageOutput {
            target: hold_current(universe, options.target_method),
            feasibility: Some(RuleResult::fail(
                TARGET_FEASIBILITY_RULE,
                RuleSeverity::Hard,
                message,
                reason_codes,
            )),
            warnings,
        },
    }
}

fn run_method(
    method: TargetMethod,
    universe: &Universe,
    shelf: &Shelf,
    options: &EngineOptions,
    solvers: &[Arc<dyn QuadraticSolver>],
) -> TargetGeneration {
    match method {
        TargetMethod::Heuristic => heuristic::generate(universe, shelf, options),
        TargetMethod::Solver => solver::generate(universe, shelf, options, solvers),
    }
}

/// When target generation blocks, fall back to holding current weights so
/// the rest of the pipeline still produces an auditable (trade-free) result.
fn hold_current(universe: &Universe, method: TargetMethod) -> TargetSet {
    let entries: Vec<TargetEntry> = universe
        .entries
        .iter()
        .map(|entry| TargetEntry {
            instrument_id: entry.instrument_id.clone(),
            model_weight: entry.model_weight,
            final_weight: entry.current_weight,
            reasons: vec![],
        })
        .collect();
    let security_total: Decimal = entries.iter().map(|e| e.final_weight).sum();
    TargetSet {
        method: method.to_string(),
        entries,
        cash_weight: Decimal::ONE - security_total,
        explanation: None,
    }
}

fn compare_methods(
    primary_method: TargetMethod,
    secondary_method: TargetMethod,
    primary: &TargetGeneration,
    secondary: &TargetGeneration,
    tolerance: Decimal,
) -> (TargetMethodComparison, Vec<String>) {
    let mut warnings = Vec::new();

    if primary.status_label() != secondary.status_label() {
        warnings.push(warning_code::TARGET_METHOD_STATUS_DIVERGENCE.to_string());
    }

    let mut max_divergence = Decimal::ZERO;
    let mut diverged = Vec::new();
    if let (TargetGeneration::Generated(a), TargetGeneration::Generated(b)) = (primary, secondary) {
        for entry in &a.entries {
            let other = b.weight_of(&entry.instrument_id);
            let delta = (entry.final_weight - other).abs();
            if delta > max_divergence {
                max_divergence = delta;
            }
            if delta > tolerance {
                diverged.push(entry.instrument_id.clone());
            }
        }
        if !diverged.is_empty() {
            warnings.push(warning_code::TARGET_METHOD_WEIGHT_DIVERGENCE.to_string());
        }
    }

    (
        TargetMethodComparison {
            primary_method: primary_method.to_string(),
            secondary_method: secondary_method.to_string(),
            primary_status: primary.status_label().to_string(),
            secondary_status: secondary.status_label().to_string(),
            max_weight_divergence: max_divergence,
            tolerance,
            diverged_instruments: diverged,
        },
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::options::GroupConstraint;
    use crate::domain::model::shelf::{ShelfEntry, ShelfStatus};
    use crate::domain::model::target::{TargetReason, UniverseEntry};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn entry(
        id: &str,
        model_weight: Decimal,
        current_weight: Decimal,
        buy: bool,
        sell: bool,
    ) -> UniverseEntry {
        UniverseEntry {
            instrument_id: id.to_string(),
            in_model: model_weight > Decimal::ZERO,
            model_weight,
            held_quantity: if current_weight > Decimal::ZERO {
                dec!(1)
            } else {
                Decimal::ZERO
            },
            current_weight,
            shelf_status: Some(ShelfStatus::Approved),
            buy_eligible: buy,
            sell_eligible: sell,
            lock_reason: None,
        }
    }

    fn shelf_with_sectors(entries: &[(&str, &str)]) -> Shelf {
        Shelf::from_entries(
            entries
                .iter()
                .map(|(id, sector)| ShelfEntry {
                    instrument_id: id.to_string(),
                    status: ShelfStatus::Approved,
                    asset_class: "EQUITY".to_string(),
                    min_notional: None,
                    settlement_days: 2,
                    attributes: BTreeMap::from([("sector".to_string(), sector.to_string())]),
                    issuer_id: None,
                    liquidity_tier: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_single_cap_then_group_constraint() {
        // Model: TechA 0.50, TechB 0.50; cap 0.30; sector TECH <= 0.20.
        // BondC is a held, approved redistribution destination.
        let universe = Universe {
            entries: vec![
                entry("BondC", Decimal::ZERO, dec!(0.10), true, true),
                entry("TechA", dec!(0.50), Decimal::ZERO, true, true),
                entry("TechB", dec!(0.50), Decimal::ZERO, true, true),
            ],
            displaced_weight: Decimal::ZERO,
        };
        let shelf = shelf_with_sectors(&[
            ("TechA", "TECH"),
            ("TechB", "TECH"),
            ("BondC", "FIXED_INCOME"),
        ]);
        let mut options = EngineOptions::default();
        options.single_position_max_weight = Some(dec!(0.30));
        options.group_constraints.insert(
            "sector:TECH".to_string(),
            GroupConstraint {
                max_weight: dec!(0.20),
            },
        );

        let output = generate_targets(&universe, &shelf, &options, &[]);
        assert!(output.feasibility.is_none());
        let target = output.target;

        let tech_total = target.weight_of("TechA") + target.weight_of("TechB");
        assert_eq!(tech_total, dec!(0.20));
        assert_eq!(target.weight_of("BondC"), dec!(0.80));
        let tech_a = target
            .entries
            .iter()
            .find(|e| e.instrument_id == "TechA")
            .unwrap();
        assert!(tech_a.reasons.contains(&TargetReason::CappedByGroupLimit));
        assert!((target.total_weight() - Decimal::ONE).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_no_destination_blocks() {
        // Sole model instrument is suspended: pool has nowhere to go.
        let universe = Universe {
            entries: vec![UniverseEntry {
                instrument_id: "GONE".to_string(),
                in_model: true,
                model_weight: Decimal::ONE,
                held_quantity: Decimal::ZERO,
                current_weight: Decimal::ZERO,
                shelf_status: Some(ShelfStatus::Suspended),
                buy_eligible: false,
                sell_eligible: false,
                lock_reason: None,
            }],
            displaced_weight: Decimal::ONE,
        };
        let output = generate_targets(&universe, &Shelf::default(), &EngineOptions::default(), &[]);
        let feasibility = output.feasibility.expect("should block");
        assert!(
            feasibility
                .reason_codes
                .contains(&reason_code::NO_ELIGIBLE_REDISTRIBUTION_DESTINATION.to_string())
        );
        // Fallback target holds current weights.
        assert_eq!(output.target.weight_of("GONE"), Decimal::ZERO);
    }

    #[test]
    fn test_cash_buffer_scales_weights() {
        let universe = Universe {
            entries: vec![
                entry("AAA", dec!(0.60), Decimal::ZERO, true, true),
                entry("BBB", dec!(0.40), Decimal::ZERO, true, true),
            ],
            displaced_weight: Decimal::ZERO,
        };
        let mut options = EngineOptions::default();
        options.min_cash_buffer_pct = Some(dec!(0.10));
        let output = generate_targets(&universe, &Shelf::default(), &options, &[]);
        let target = output.target;
        assert_eq!(target.cash_weight, dec!(0.1));
        assert_eq!(target.weight_of("AAA"), dec!(0.54));
        assert_eq!(target.weight_of("BBB"), dec!(0.36));
    }

    #[test]
    fn test_solver_error_when_no_backends() {
        let universe = Universe {
            entries: vec![entry("AAA", Decimal::ONE, Decimal::ZERO, true, true)],
            displaced_weight: Decimal::ZERO,
        };
        let mut options = EngineOptions::default();
        options.target_method = TargetMethod::Solver;
        let output = generate_targets(&universe, &Shelf::default(), &options, &[]);
        let feasibility = output.feasibility.expect("should block");
        assert!(
            feasibility
                .reason_codes
                .contains(&reason_code::SOLVER_ERROR.to_string())
        );
    }

    #[test]
    fn test_locked_position_keeps_weight() {
        let mut locked = entry("LOCKED", Decimal::ZERO, dec!(0.25), false, false);
        locked.lock_reason =
            Some(crate::domain::model::target::LockReason::LockedDueToSuspended);
        let universe = Universe {
            entries: vec![locked, entry("AAA", Decimal::ONE, Decimal::ZERO, true, true)],
            displaced_weight: Decimal::ZERO,
        };
        let output = generate_targets(&universe, &Shelf::default(), &EngineOptions::default(), &[]);
        let target = output.target;
        assert_eq!(target.weight_of("LOCKED"), dec!(0.25));
        let locked_entry = target
            .entries
            .iter()
            .find(|e| e.instrument_id == "LOCKED")
            .unwrap();
        assert!(locked_entry.reasons.contains(&TargetReason::LockedPosition));
    }
}
