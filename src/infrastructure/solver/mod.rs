//! Quadratic solver backends, tried in fixed order by the target stage.

pub mod clarabel_backend;
pub mod projection;

use std::sync::Arc;

use crate::domain::ports::QuadraticSolver;

/// The default backend stack: interior point first, projection fallback.
pub fn default_solvers() -> Vec<Arc<dyn QuadraticSolver>> {
    vec![
        Arc::new(clarabel_backend::ClarabelBackend::new()),
        Arc::new(projection::ProjectedGradientBackend::new()),
    ]
}
