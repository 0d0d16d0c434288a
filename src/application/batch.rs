//! Batch scenario analysis: named option overlays executed against one
//! shared snapshot, with per-scenario isolation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

use crate::domain::model::diagnostics::warning_code;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::request::{AnalyzeRequest, RebalanceRequest};
use crate::domain::model::result::RebalanceResult;

use crate::application::engine::{RebalanceEngine, new_run_id};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    pub status: String,
    pub intent_count: usize,
    pub total_traded_notional_base: Decimal,
    pub after_cash_weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub correlation_id: String,
    pub scenarios: BTreeMap<String, RebalanceResult>,
    /// Metrics computed for successful scenarios only.
    pub comparison_metrics: BTreeMap<String, ScenarioMetrics>,
    pub failed_scenarios: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

/// Execute every scenario in sorted name order. A scenario failure never
/// poisons its siblings.
pub fn analyze(
    engine: &RebalanceEngine,
    request: &AnalyzeRequest,
    correlation_id: &str,
    request_hash: &str,
) -> AnalyzeResponse {
    let mut response = AnalyzeResponse {
        correlation_id: correlation_id.to_string(),
        scenarios: BTreeMap::new(),
        comparison_metrics: BTreeMap::new(),
        failed_scenarios: BTreeMap::new(),
        warnings: vec![],
    };

    for (name, overlay) in &request.scenarios {
        let options: EngineOptions = match serde_json::from_value(overlay.clone()) {
            Ok(options) => options,
            Err(err) => {
                response
                    .failed_scenarios
                    .insert(name.clone(), format!("INVALID_OPTIONS:{err}"));
                continue;
            }
        };

        let scenario_request = RebalanceRequest {
            portfolio: request.portfolio.clone(),
            market_data: request.market_data.clone(),
            shelf: request.shelf.clone(),
            model: request.model.clone(),
            options,
        };
        let run_id = new_run_id();
        let scenario_correlation = format!("{correlation_id}:{name}");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            engine.simulate(&scenario_request, &run_id, &scenario_correlation, request_hash)
        }));
        match outcome {
            Ok(result) => {
                response.comparison_metrics.insert(
                    name.clone(),
                    ScenarioMetrics {
                        status: result.status.to_string(),
                        intent_count: result.intents.len(),
                        total_traded_notional_base: result
                            .intents
                            .iter()
                            .map(|intent| match intent {
                                crate::domain::model::intent::Intent::SecurityTrade {
                                    notional_base,
                                    ..
                                } => notional_base.abs(),
                                _ => Decimal::ZERO,
                            })
                            .sum(),
                        after_cash_weight: result.after_simulated.cash_weight(),
                    },
                );
                response.scenarios.insert(name.clone(), result);
            }
            Err(panic) => {
                let detail: &str = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("Unknown");
                warn!("Scenario {name} failed: {detail}");
                response
                    .failed_scenarios
                    .insert(name.clone(), "SCENARIO_EXECUTION_ERROR:Panic".to_string());
            }
        }
    }

    if !response.failed_scenarios.is_empty() && !response.scenarios.is_empty() {
        response
            .warnings
            .push(warning_code::PARTIAL_BATCH_FAILURE.to_string());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::market::{FxRatePoint, MarketDataSnapshot, PricePoint};
    use crate::domain::model::model_portfolio::ModelPortfolio;
    use crate::domain::model::portfolio::{CashBalance, PortfolioSnapshot};
    use crate::domain::model::shelf::{ShelfEntry, ShelfStatus};
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn analyze_request(scenarios: BTreeMap<String, serde_json::Value>) -> AnalyzeRequest {
        AnalyzeRequest {
            portfolio: PortfolioSnapshot {
                portfolio_id: "p1".to_string(),
                snapshot_id: None,
                base_currency: "USD".to_string(),
                positions: vec![],
                cash_balances: vec![CashBalance {
                    currency: "USD".to_string(),
                    amount: dec!(100000),
                }],
            },
            market_data: MarketDataSnapshot {
                snapshot_id: None,
                prices: vec![PricePoint {
                    instrument_id: "AAA".to_string(),
                    price: Money::new(dec!(100), "USD"),
                }],
                fx_rates: vec![FxRatePoint {
                    pair: "USD/USD".to_string(),
                    rate: Decimal::ONE,
                }],
            },
            shelf: vec![ShelfEntry {
                instrument_id: "AAA".to_string(),
                status: ShelfStatus::Approved,
                asset_class: "EQUITY".to_string(),
                min_notional: None,
                settlement_days: 2,
                attributes: Default::default(),
                issuer_id: None,
                liquidity_tier: None,
            }],
            model: ModelPortfolio {
                model_id: None,
                targets: BTreeMap::from([("AAA".to_string(), Decimal::ONE)]),
            },
            scenarios,
        }
    }

    #[test]
    fn test_scenario_isolation() {
        let engine = RebalanceEngine::new(vec![]);
        let request = analyze_request(BTreeMap::from([
            ("good".to_string(), json!({})),
            ("bad".to_string(), json!({"no_such_option": 1})),
        ]));
        let response = analyze(&engine, &request, "c_1", "sha256:x");
        assert!(response.scenarios.contains_key("good"));
        assert!(
            response
                .failed_scenarios
                .get("bad")
                .unwrap()
                .starts_with("INVALID_OPTIONS:")
        );
        assert!(
            response
                .warnings
                .contains(&warning_code::PARTIAL_BATCH_FAILURE.to_string())
        );
        assert!(response.comparison_metrics.contains_key("good"));
        assert!(!response.comparison_metrics.contains_key("bad"));
    }

    #[test]
    fn test_scenarios_execute_in_sorted_order() {
        let engine = RebalanceEngine::new(vec![]);
        let request = analyze_request(BTreeMap::from([
            ("zeta".to_string(), json!({})),
            ("alpha".to_string(), json!({})),
        ]));
        let response = analyze(&engine, &request, "c_1", "sha256:x");
        let names: Vec<&String> = response.scenarios.keys().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
