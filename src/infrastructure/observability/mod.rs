//! Observability: a Prometheus registry scraped at `GET /metrics`.

pub mod metrics;

pub use metrics::Metrics;
