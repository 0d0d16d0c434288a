//! Projection fallback solver.
//!
//! Dykstra's alternating projections onto the constraint sets (box, group
//! half-spaces, budget band) compute the Euclidean projection of the model
//! weights. Fully deterministic: fixed iteration budget, fixed set order.

use ndarray::Array1;

use crate::domain::errors::EngineError;
use crate::domain::ports::{QuadraticProblem, QuadraticSolver, SolveOutcome};

const MAX_ITERATIONS: usize = 2000;
const CONVERGENCE_EPS: f64 = 1e-12;
const FEASIBILITY_EPS: f64 = 1e-6;

pub struct ProjectedGradientBackend;

impl ProjectedGradientBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProjectedGradientBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One convex set we project onto.
enum ConstraintSet {
    Box,
    /// `sum(x[indices]) <= bound`
    HalfSpace { indices: Vec<usize>, bound: f64 },
    /// `budget_min <= sum(x) <= budget_max`
    BudgetBand,
}

impl QuadraticSolver for ProjectedGradientBackend {
    fn name(&self) -> &'static str {
        "PROJECTED_GRADIENT"
    }

    fn minimize_distance(&self, problem: &QuadraticProblem) -> Result<SolveOutcome, EngineError> {
        let n = problem.target.len();
        if n == 0 {
            return Ok(SolveOutcome::Solved { weights: vec![] });
        }

        let mut sets = vec![ConstraintSet::Box];
        for group in &problem.groups {
            sets.push(ConstraintSet::HalfSpace {
                indices: group.indices.clone(),
                bound: group.max_weight,
            });
        }
        sets.push(ConstraintSet::BudgetBand);

        let mut x = Array1::from_vec(problem.target.clone());
        // One correction term per set (Dykstra).
        let mut corrections: Vec<Array1<f64>> =
            sets.iter().map(|_| Array1::zeros(n)).collect();

        for _ in 0..MAX_ITERATIONS {
            let previous = x.clone();
            for (set, correction) in sets.iter().zip(corrections.iter_mut()) {
                let y = &x + &*correction;
                let projected = project(&y, set, problem);
                *correction = &y - &projected;
                x = projected;
            }
            let shift = (&x - &previous).mapv(f64::abs).sum();
            if shift < CONVERGENCE_EPS {
                break;
            }
        }

        if violation(&x, problem) > FEASIBILITY_EPS {
            return Ok(SolveOutcome::Infeasible {
                status: "NO_FEASIBLE_POINT".to_string(),
            });
        }

        Ok(SolveOutcome::Solved {
            weights: x.to_vec(),
        })
    }
}

fn project(y: &Array1<f64>, set: &ConstraintSet, problem: &QuadraticProblem) -> Array1<f64> {
    match set {
        ConstraintSet::Box => {
            let mut out = y.clone();
            for (i, value) in out.iter_mut().enumerate() {
                *value = value.clamp(problem.lower[i], problem.upper[i].max(problem.lower[i]));
            }
            out
        }
        ConstraintSet::HalfSpace { indices, bound } => {
            let total: f64 = indices.iter().map(|&i| y[i]).sum();
            if total <= *bound || indices.is_empty() {
                return y.clone();
            }
            let shift = (total - bound) / indices.len() as f64;
            let mut out = y.clone();
            for &i in indices {
                out[i] -= shift;
            }
            out
        }
        ConstraintSet::BudgetBand => {
            let total: f64 = y.sum();
            let n = y.len() as f64;
            if total > problem.budget_max {
                let offset = Array1::from_elem(y.len(), (total - problem.budget_max) / n);
                y - &offset
            } else if total < problem.budget_min {
                let offset = Array1::from_elem(y.len(), (problem.budget_min - total) / n);
                y + &offset
            } else {
                y.clone()
            }
        }
    }
}

fn violation(x: &Array1<f64>, problem: &QuadraticProblem) -> f64 {
    let mut worst: f64 = 0.0;
    for (i, value) in x.iter().enumerate() {
        worst = worst.max(problem.lower[i] - value);
        worst = worst.max(value - problem.upper[i]);
    }
    for group in &problem.groups {
        let total: f64 = group.indices.iter().map(|&i| x[i]).sum();
        worst = worst.max(total - group.max_weight);
    }
    let total = x.sum();
    worst = worst.max(problem.budget_min - total);
    worst = worst.max(total - problem.budget_max);
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::GroupBound;

    fn solve(problem: &QuadraticProblem) -> Vec<f64> {
        match ProjectedGradientBackend::new()
            .minimize_distance(problem)
            .unwrap()
        {
            SolveOutcome::Solved { weights } => weights,
            SolveOutcome::Infeasible { status } => panic!("infeasible: {status}"),
        }
    }

    #[test]
    fn test_feasible_target_unchanged() {
        let problem = QuadraticProblem {
            target: vec![0.6, 0.4],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
            groups: vec![],
            budget_min: 1.0,
            budget_max: 1.0,
        };
        let weights = solve(&problem);
        assert!((weights[0] - 0.6).abs() < 1e-6);
        assert!((weights[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_budget_band_projection() {
        let problem = QuadraticProblem {
            target: vec![0.8, 0.8],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
            groups: vec![],
            budget_min: 0.9,
            budget_max: 1.0,
        };
        let weights = solve(&problem);
        let total: f64 = weights.iter().sum();
        assert!(total <= 1.0 + 1e-6);
        assert!(total >= 0.9 - 1e-6);
        // Symmetric targets project symmetrically.
        assert!((weights[0] - weights[1]).abs() < 1e-6);
    }

    #[test]
    fn test_group_constraint_respected() {
        let problem = QuadraticProblem {
            target: vec![0.5, 0.5, 0.0],
            lower: vec![0.0; 3],
            upper: vec![1.0; 3],
            groups: vec![GroupBound {
                key: "sector:TECH".to_string(),
                indices: vec![0, 1],
                max_weight: 0.2,
            }],
            budget_min: 0.0,
            budget_max: 1.0,
        };
        let weights = solve(&problem);
        assert!(weights[0] + weights[1] <= 0.2 + 1e-5);
    }

    #[test]
    fn test_infeasible_detected() {
        let problem = QuadraticProblem {
            target: vec![0.5, 0.5],
            lower: vec![0.0, 0.0],
            upper: vec![0.2, 0.2],
            groups: vec![],
            budget_min: 1.0,
            budget_max: 1.0,
        };
        let outcome = ProjectedGradientBackend::new()
            .minimize_distance(&problem)
            .unwrap();
        assert!(matches!(outcome, SolveOutcome::Infeasible { .. }));
    }

    #[test]
    fn test_determinism() {
        let problem = QuadraticProblem {
            target: vec![0.4, 0.35, 0.25],
            lower: vec![0.0; 3],
            upper: vec![0.3; 3],
            groups: vec![],
            budget_min: 0.85,
            budget_max: 0.9,
        };
        assert_eq!(solve(&problem), solve(&problem));
    }
}
