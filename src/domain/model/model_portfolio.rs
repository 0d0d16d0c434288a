use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::ValidationError;
use rust_decimal_macros::dec;

/// Pseudo-instrument key used by models that carry an explicit cash sleeve.
pub const CASH_INSTRUMENT: &str = "CASH";

/// Target weights by instrument. Weights must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPortfolio {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub targets: BTreeMap<String, Decimal>,
}

impl ModelPortfolio {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let sum: Decimal = self.targets.values().copied().sum();
        if (sum - Decimal::ONE).abs() > dec!(0.000001) {
            return Err(ValidationError::ModelWeightSum { sum });
        }
        Ok(())
    }

    /// Explicit cash sleeve, zero when the model holds none.
    pub fn cash_weight(&self) -> Decimal {
        self.targets
            .get(CASH_INSTRUMENT)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Security targets in deterministic (instrument id) order, cash excluded.
    pub fn security_targets(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.targets.iter().filter(|(id, _)| *id != CASH_INSTRUMENT)
    }
}

/// Reference model for advisory drift analytics: asset-class weights are
/// required, instrument weights optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceModel {
    pub asset_class_weights: BTreeMap<String, Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_weights: Option<BTreeMap<String, Decimal>>,
}
