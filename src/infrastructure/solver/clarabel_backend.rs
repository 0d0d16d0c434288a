//! Clarabel-backed quadratic solver.
//!
//! Formulates the target projection as `min 1/2 x'Px + q'x` with
//! `P = 2I`, `q = -2 * target`, subject to box bounds, group caps, and the
//! budget band expressed as cone constraints.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use crate::domain::errors::EngineError;
use crate::domain::ports::{QuadraticProblem, QuadraticSolver, SolveOutcome};

pub struct ClarabelBackend;

impl ClarabelBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClarabelBackend {
    fn default() -> Self {
        Self::new()
    }
}

const BUDGET_EQUALITY_EPS: f64 = 1e-12;

impl QuadraticSolver for ClarabelBackend {
    fn name(&self) -> &'static str {
        "CLARABEL"
    }

    fn minimize_distance(&self, problem: &QuadraticProblem) -> Result<SolveOutcome, EngineError> {
        let n = problem.target.len();
        if n == 0 {
            return Ok(SolveOutcome::Solved { weights: vec![] });
        }

        // P = 2I in CSC form: one entry per column.
        let p = CscMatrix::new(
            n,
            n,
            (0..=n).collect(),
            (0..n).collect(),
            vec![2.0; n],
        );
        let q: Vec<f64> = problem.target.iter().map(|t| -2.0 * t).collect();

        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut b: Vec<f64> = Vec::new();
        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();

        // Budget: equality when the band collapses, two half-spaces
        // otherwise.
        let equality = (problem.budget_max - problem.budget_min).abs() < BUDGET_EQUALITY_EPS;
        if equality {
            rows.push(vec![1.0; n]);
            b.push(problem.budget_max);
            cones.push(SupportedConeT::ZeroConeT(1));
        } else {
            rows.push(vec![1.0; n]);
            b.push(problem.budget_max);
            rows.push(vec![-1.0; n]);
            b.push(-problem.budget_min);
            cones.push(SupportedConeT::NonnegativeConeT(2));
        }

        // Box bounds: x <= upper, -x <= -lower.
        let mut inequality_rows = 0;
        for (i, upper) in problem.upper.iter().enumerate() {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            rows.push(row);
            b.push(*upper);
            inequality_rows += 1;
        }
        for (i, lower) in problem.lower.iter().enumerate() {
            let mut row = vec![0.0; n];
            row[i] = -1.0;
            rows.push(row);
            b.push(-lower);
            inequality_rows += 1;
        }

        // Group caps.
        for group in &problem.groups {
            let mut row = vec![0.0; n];
            for &index in &group.indices {
                row[index] = 1.0;
            }
            rows.push(row);
            b.push(group.max_weight);
            inequality_rows += 1;
        }
        cones.push(SupportedConeT::NonnegativeConeT(inequality_rows));

        let a = dense_rows_to_csc(&rows, n);
        let settings = DefaultSettings {
            verbose: false,
            ..DefaultSettings::default()
        };

        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => Ok(SolveOutcome::Solved {
                weights: solver.solution.x.clone(),
            }),
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                Ok(SolveOutcome::Infeasible {
                    status: "PRIMAL_INFEASIBLE".to_string(),
                })
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                Ok(SolveOutcome::Infeasible {
                    status: "DUAL_INFEASIBLE".to_string(),
                })
            }
            other => Err(EngineError::Solver {
                backend: "CLARABEL".to_string(),
                reason: format!("{other:?}"),
            }),
        }
    }
}

/// Column-compressed form of a dense row-major constraint matrix.
fn dense_rows_to_csc(rows: &[Vec<f64>], n_cols: usize) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(n_cols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for col in 0..n_cols {
        for (row_index, row) in rows.iter().enumerate() {
            let value = row[col];
            if value != 0.0 {
                rowval.push(row_index);
                nzval.push(value);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(rows.len(), n_cols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::GroupBound;

    fn solve(problem: &QuadraticProblem) -> Vec<f64> {
        match ClarabelBackend::new().minimize_distance(problem).unwrap() {
            SolveOutcome::Solved { weights } => weights,
            SolveOutcome::Infeasible { status } => panic!("infeasible: {status}"),
        }
    }

    #[test]
    fn test_unconstrained_target_is_returned() {
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
    fn test_cap_binds_and_budget_holds() {
        let problem = QuadraticProblem {
            target: vec![0.8, 0.2],
            lower: vec![0.0, 0.0],
            upper: vec![0.5, 1.0],
            groups: vec![],
            budget_min: 1.0,
            budget_max: 1.0,
        };
        let weights = solve(&problem);
        assert!((weights[0] - 0.5).abs() < 1e-5);
        assert!((weights[0] + weights[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_group_cap_binds() {
        let problem = QuadraticProblem {
            target: vec![0.5, 0.5, 0.0],
            lower: vec![0.0; 3],
            upper: vec![1.0; 3],
            groups: vec![GroupBound {
                key: "sector:TECH".to_string(),
                indices: vec![0, 1],
                max_weight: 0.2,
            }],
            budget_min: 1.0,
            budget_max: 1.0,
        };
        let weights = solve(&problem);
        assert!(weights[0] + weights[1] <= 0.2 + 1e-5);
        assert!((weights[2] - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_infeasible_caps_detected() {
        // Two instruments capped at 0.2 cannot reach a budget of 1.
        let problem = QuadraticProblem {
            target: vec![0.5, 0.5],
            lower: vec![0.0, 0.0],
            upper: vec![0.2, 0.2],
            groups: vec![],
            budget_min: 1.0,
            budget_max: 1.0,
        };
        let outcome = ClarabelBackend::new().minimize_distance(&problem).unwrap();
        assert!(matches!(outcome, SolveOutcome::Infeasible { .. }));
    }
}
