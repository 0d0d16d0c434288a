//! Drift analytics against a reference model.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::model::drift::{DriftAnalysis, DriftBucket};
use crate::domain::model::model_portfolio::ReferenceModel;
use crate::domain::model::state::SimulatedState;

const TOP_CONTRIBUTORS: usize = 5;

pub fn analyze_drift(
    reference: &ReferenceModel,
    before: &SimulatedState,
    after: &SimulatedState,
) -> DriftAnalysis {
    let asset_class_buckets = bucket_drift(
        &reference.asset_class_weights,
        &allocation_weights(before, true),
        &allocation_weights(after, true),
    );

    let instrument_buckets = reference.instrument_weights.as_ref().map(|weights| {
        bucket_drift(
            weights,
            &allocation_weights(before, false),
            &allocation_weights(after, false),
        )
    });

    let total_drift_before = half_abs_sum(&asset_class_buckets, |b| b.drift_before);
    let total_drift_after = half_abs_sum(&asset_class_buckets, |b| b.drift_after);

    let mut ranked: Vec<&DriftBucket> = asset_class_buckets.iter().collect();
    ranked.sort_by(|a, b| {
        b.abs_drift_before
            .cmp(&a.abs_drift_before)
            .then_with(|| a.bucket.cmp(&b.bucket))
    });
    let top_contributors = ranked
        .into_iter()
        .take(TOP_CONTRIBUTORS)
        .map(|b| b.bucket.clone())
        .collect();

    DriftAnalysis {
        total_drift_before,
        total_drift_after,
        asset_class_buckets,
        instrument_buckets,
        top_contributors,
    }
}

fn allocation_weights(state: &SimulatedState, by_asset_class: bool) -> BTreeMap<String, Decimal> {
    let slices = if by_asset_class {
        &state.allocation_by_asset_class
    } else {
        &state.allocation_by_instrument
    };
    slices
        .iter()
        .map(|s| (s.key.clone(), s.weight))
        .collect()
}

fn bucket_drift(
    model: &BTreeMap<String, Decimal>,
    before: &BTreeMap<String, Decimal>,
    after: &BTreeMap<String, Decimal>,
) -> Vec<DriftBucket> {
    let buckets: BTreeSet<&String> = model
        .keys()
        .chain(before.keys())
        .chain(after.keys())
        .collect();

    buckets
        .into_iter()
        .map(|bucket| {
            let model_weight = model.get(bucket).copied().unwrap_or(Decimal::ZERO);
            let weight_before = before.get(bucket).copied().unwrap_or(Decimal::ZERO);
            let weight_after = after.get(bucket).copied().unwrap_or(Decimal::ZERO);
            let drift_before = weight_before - model_weight;
            let drift_after = weight_after - model_weight;
            DriftBucket {
                bucket: bucket.clone(),
                model_weight,
                weight_before,
                weight_after,
                drift_before,
                drift_after,
                abs_drift_before: drift_before.abs(),
                abs_drift_after: drift_after.abs(),
                improvement: drift_before.abs() - drift_after.abs(),
            }
        })
        .collect()
}

fn half_abs_sum(buckets: &[DriftBucket], drift: impl Fn(&DriftBucket) -> Decimal) -> Decimal {
    let sum: Decimal = buckets.iter().map(|b| drift(b).abs()).sum();
    sum * dec!(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::state::AllocationSlice;

    fn state(allocations: Vec<(&str, Decimal)>) -> SimulatedState {
        SimulatedState {
            base_currency: "USD".to_string(),
            total_value: dec!(100),
            cash_balances: vec![],
            positions: vec![],
            allocation_by_asset_class: allocations
                .into_iter()
                .map(|(key, weight)| AllocationSlice {
                    key: key.to_string(),
                    value_base: weight * dec!(100),
                    weight,
                })
                .collect(),
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        }
    }

    #[test]
    fn test_total_drift_halves_abs_sum() {
        let reference = ReferenceModel {
            asset_class_weights: BTreeMap::from([
                ("EQUITY".to_string(), dec!(0.6)),
                ("BOND".to_string(), dec!(0.4)),
            ]),
            instrument_weights: None,
        };
        let before = state(vec![("EQUITY", dec!(0.8)), ("BOND", dec!(0.2))]);
        let after = state(vec![("EQUITY", dec!(0.6)), ("BOND", dec!(0.4))]);
        let analysis = analyze_drift(&reference, &before, &after);
        // |0.2| + |-0.2| = 0.4, halved.
        assert_eq!(analysis.total_drift_before, dec!(0.2));
        assert_eq!(analysis.total_drift_after, Decimal::ZERO);
        let equity = analysis
            .asset_class_buckets
            .iter()
            .find(|b| b.bucket == "EQUITY")
            .unwrap();
        assert_eq!(equity.improvement, dec!(0.2));
    }

    #[test]
    fn test_bucket_universe_is_union() {
        let reference = ReferenceModel {
            asset_class_weights: BTreeMap::from([("EQUITY".to_string(), Decimal::ONE)]),
            instrument_weights: None,
        };
        let before = state(vec![("CASH", Decimal::ONE)]);
        let after = state(vec![("EQUITY", dec!(0.5)), ("GOLD", dec!(0.5))]);
        let analysis = analyze_drift(&reference, &before, &after);
        let names: Vec<&str> = analysis
            .asset_class_buckets
            .iter()
            .map(|b| b.bucket.as_str())
            .collect();
        assert_eq!(names, vec!["CASH", "EQUITY", "GOLD"]);
    }

    #[test]
    fn test_top_contributors_order() {
        let reference = ReferenceModel {
            asset_class_weights: BTreeMap::from([
                ("A".to_string(), dec!(0.5)),
                ("B".to_string(), dec!(0.5)),
            ]),
            instrument_weights: None,
        };
        let before = state(vec![("A", dec!(0.1)), ("B", dec!(0.9))]);
        let after = state(vec![("A", dec!(0.5)), ("B", dec!(0.5))]);
        let analysis = analyze_drift(&reference, &before, &after);
        // Equal abs drift: ascending bucket id breaks the tie.
        assert_eq!(analysis.top_contributors, vec!["A", "B"]);
    }
}
