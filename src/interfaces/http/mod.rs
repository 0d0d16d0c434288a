//! HTTP boundary: thin axum adapters around the application services.
//!
//! Domain outcomes are always 200s; everything else leaves as
//! `application/problem+json` with the status mapping in `problem.rs`.

pub mod handlers;
pub mod headers;
pub mod problem;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
