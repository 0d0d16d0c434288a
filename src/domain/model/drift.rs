use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Drift of one bucket (asset class or instrument) against the reference
/// model, before and after the proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftBucket {
    pub bucket: String,
    pub model_weight: Decimal,
    pub weight_before: Decimal,
    pub weight_after: Decimal,
    pub drift_before: Decimal,
    pub drift_after: Decimal,
    pub abs_drift_before: Decimal,
    pub abs_drift_after: Decimal,
    /// Positive when the proposal moved the bucket toward the model.
    pub improvement: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAnalysis {
    /// Total drift `0.5 * sum(|w_portfolio - w_model|)`, in `[0, 1]`.
    pub total_drift_before: Decimal,
    pub total_drift_after: Decimal,
    pub asset_class_buckets: Vec<DriftBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_buckets: Option<Vec<DriftBucket>>,
    /// Sorted by `abs_drift_before` descending, bucket id ascending.
    pub top_contributors: Vec<String>,
}
