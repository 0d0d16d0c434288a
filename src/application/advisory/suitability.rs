//! Suitability scanning.
//!
//! Computes issue sets for the before and after states, classifies each
//! issue key as NEW, RESOLVED, or PERSISTENT, and recommends a review gate.
//! Issue keys are deterministic (`dimension:entity`) so classification is a
//! set comparison.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::model::gate::ReasonSeverity;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::shelf::{Shelf, ShelfStatus};
use crate::domain::model::state::{DataQuality, SimulatedState};
use crate::domain::model::suitability::{
    IssueStatus, RecommendedGate, SuitabilityIssue, SuitabilityReport, dimension,
};

/// A BUY instruction on a shelf status that does not allow buying.
#[derive(Debug, Clone)]
pub struct AttemptedBuy {
    pub instrument_id: String,
    pub status: Option<ShelfStatus>,
}

struct Finding {
    dimension: &'static str,
    entity: String,
    severity: ReasonSeverity,
    message: String,
}

pub fn scan(
    before: &SimulatedState,
    after: &SimulatedState,
    shelf: &Shelf,
    options: &EngineOptions,
    attempted_buys: &[AttemptedBuy],
    data_quality: &DataQuality,
) -> SuitabilityReport {
    let before_findings = state_findings(before, shelf, options);
    let mut after_findings = state_findings(after, shelf, options);

    // Governance and data-quality findings attach to the proposal, not to
    // either state: they only exist on the after side.
    for attempted in attempted_buys {
        let status = attempted
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "MISSING_SHELF".to_string());
        after_findings.push(Finding {
            dimension: dimension::GOVERNANCE,
            entity: attempted.instrument_id.clone(),
            severity: ReasonSeverity::High,
            message: format!(
                "Attempted BUY of {} with shelf status {status}",
                attempted.instrument_id
            ),
        });
    }
    if !data_quality.is_clean() {
        let severity = data_quality_severity(options);
        if !data_quality.price_missing.is_empty() {
            after_findings.push(Finding {
                dimension: dimension::DATA_QUALITY,
                entity: "price_missing".to_string(),
                severity,
                message: format!(
                    "Prices missing for: {}",
                    data_quality.price_missing.join(", ")
                ),
            });
        }
        if !data_quality.fx_missing.is_empty() {
            after_findings.push(Finding {
                dimension: dimension::DATA_QUALITY,
                entity: "fx_missing".to_string(),
                severity,
                message: format!("FX missing for: {}", data_quality.fx_missing.join(", ")),
            });
        }
    }

    let before_keys: BTreeMap<String, ()> = before_findings
        .iter()
        .map(|f| (SuitabilityIssue::key(f.dimension, &f.entity), ()))
        .collect();
    let after_keys: BTreeMap<String, ()> = after_findings
        .iter()
        .map(|f| (SuitabilityIssue::key(f.dimension, &f.entity), ()))
        .collect();

    let mut issues: Vec<SuitabilityIssue> = Vec::new();
    for finding in &after_findings {
        let key = SuitabilityIssue::key(finding.dimension, &finding.entity);
        let status = if before_keys.contains_key(&key) {
            IssueStatus::Persistent
        } else {
            IssueStatus::New
        };
        issues.push(issue_from(finding, status));
    }
    for finding in &before_findings {
        let key = SuitabilityIssue::key(finding.dimension, &finding.entity);
        if !after_keys.contains_key(&key) {
            issues.push(issue_from(finding, IssueStatus::Resolved));
        }
    }

    SuitabilityReport::sort_issues(&mut issues);

    let recommended_gate = if issues
        .iter()
        .any(|i| i.status == IssueStatus::New && i.severity == ReasonSeverity::High)
    {
        RecommendedGate::ComplianceReview
    } else if issues
        .iter()
        .any(|i| i.status == IssueStatus::New && i.severity == ReasonSeverity::Medium)
    {
        RecommendedGate::RiskReview
    } else {
        RecommendedGate::None
    };

    SuitabilityReport {
        issues,
        recommended_gate,
    }
}

fn issue_from(finding: &Finding, status: IssueStatus) -> SuitabilityIssue {
    SuitabilityIssue {
        issue_key: SuitabilityIssue::key(finding.dimension, &finding.entity),
        dimension: finding.dimension.to_string(),
        entity: finding.entity.clone(),
        status,
        severity: finding.severity,
        message: finding.message.clone(),
    }
}

/// Threshold checks over one valued state.
fn state_findings(state: &SimulatedState, shelf: &Shelf, options: &EngineOptions) -> Vec<Finding> {
    let mut findings = Vec::new();
    let thresholds = &options.suitability;

    if let Some(limit) = thresholds.single_position_max_weight {
        for position in &state.positions {
            if position.weight > limit {
                findings.push(Finding {
                    dimension: dimension::SINGLE_POSITION,
                    entity: position.instrument_id.clone(),
                    severity: ReasonSeverity::High,
                    message: format!(
                        "{} weight {} exceeds {limit}",
                        position.instrument_id,
                        position.weight.round_dp(6)
                    ),
                });
            }
        }
    }

    if let Some(limit) = thresholds.issuer_max_weight {
        let mut by_issuer: BTreeMap<String, Decimal> = BTreeMap::new();
        for position in &state.positions {
            if let Some(issuer) = shelf.get(&position.instrument_id).and_then(|e| e.issuer_id.clone())
            {
                *by_issuer.entry(issuer).or_default() += position.weight;
            }
        }
        for (issuer, weight) in by_issuer {
            if weight > limit {
                findings.push(Finding {
                    dimension: dimension::ISSUER_CONCENTRATION,
                    entity: issuer.clone(),
                    severity: ReasonSeverity::High,
                    message: format!("Issuer {issuer} weight {} exceeds {limit}", weight.round_dp(6)),
                });
            }
        }
    }

    if !thresholds.liquidity_tier_caps.is_empty() {
        let mut by_tier: BTreeMap<String, Decimal> = BTreeMap::new();
        for position in &state.positions {
            if let Some(tier) = shelf
                .get(&position.instrument_id)
                .and_then(|e| e.liquidity_tier.clone())
            {
                *by_tier.entry(tier).or_default() += position.weight;
            }
        }
        for (tier, cap) in &thresholds.liquidity_tier_caps {
            if let Some(weight) = by_tier.get(tier) {
                if *weight > *cap {
                    findings.push(Finding {
                        dimension: dimension::LIQUIDITY_TIER,
                        entity: tier.clone(),
                        severity: ReasonSeverity::Medium,
                        message: format!(
                            "Liquidity tier {tier} weight {} exceeds {cap}",
                            weight.round_dp(6)
                        ),
                    });
                }
            }
        }
    }

    if options.cash_band_min_weight.is_some() || options.cash_band_max_weight.is_some() {
        let cash_weight = state.cash_weight();
        let min = options.cash_band_min_weight.unwrap_or(Decimal::ZERO);
        let max = options.cash_band_max_weight.unwrap_or(Decimal::ONE);
        if cash_weight < min || cash_weight > max {
            findings.push(Finding {
                dimension: dimension::CASH_BAND,
                entity: "cash".to_string(),
                severity: ReasonSeverity::Low,
                message: format!(
                    "Cash weight {} outside band [{min}, {max}]",
                    cash_weight.round_dp(6)
                ),
            });
        }
    }

    findings
}

fn data_quality_severity(options: &EngineOptions) -> ReasonSeverity {
    match options
        .suitability
        .data_quality_severity
        .as_deref()
        .unwrap_or("MEDIUM")
    {
        "HIGH" => ReasonSeverity::High,
        "LOW" => ReasonSeverity::Low,
        _ => ReasonSeverity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::state::EnrichedPosition;
    use rust_decimal_macros::dec;

    fn state_with_weight(instrument: &str, weight: Decimal) -> SimulatedState {
        SimulatedState {
            base_currency: "USD".to_string(),
            total_value: dec!(100),
            cash_balances: vec![],
            positions: vec![EnrichedPosition {
                instrument_id: instrument.to_string(),
                quantity: dec!(1),
                currency: "USD".to_string(),
                value_instrument: weight * dec!(100),
                value_base: weight * dec!(100),
                weight,
                asset_class: None,
                unpriced: false,
            }],
            allocation_by_asset_class: vec![],
            allocation_by_instrument: vec![],
            allocation_by_attribute: None,
        }
    }

    fn options_with_single_cap(limit: Decimal) -> EngineOptions {
        let mut options = EngineOptions::default();
        options.suitability.single_position_max_weight = Some(limit);
        options
    }

    #[test]
    fn test_new_issue_when_after_breaches() {
        let report = scan(
            &state_with_weight("AAA", dec!(0.10)),
            &state_with_weight("AAA", dec!(0.50)),
            &Shelf::default(),
            &options_with_single_cap(dec!(0.25)),
            &[],
            &DataQuality::default(),
        );
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].status, IssueStatus::New);
        assert_eq!(report.issues[0].issue_key, "SINGLE_POSITION:AAA");
        assert_eq!(report.recommended_gate, RecommendedGate::ComplianceReview);
    }

    #[test]
    fn test_resolved_issue_when_before_breached() {
        let report = scan(
            &state_with_weight("AAA", dec!(0.50)),
            &state_with_weight("AAA", dec!(0.10)),
            &Shelf::default(),
            &options_with_single_cap(dec!(0.25)),
            &[],
            &DataQuality::default(),
        );
        assert_eq!(report.issues[0].status, IssueStatus::Resolved);
        assert_eq!(report.recommended_gate, RecommendedGate::None);
    }

    #[test]
    fn test_persistent_issue() {
        let report = scan(
            &state_with_weight("AAA", dec!(0.60)),
            &state_with_weight("AAA", dec!(0.50)),
            &Shelf::default(),
            &options_with_single_cap(dec!(0.25)),
            &[],
            &DataQuality::default(),
        );
        assert_eq!(report.issues[0].status, IssueStatus::Persistent);
        assert_eq!(report.recommended_gate, RecommendedGate::None);
    }

    #[test]
    fn test_governance_issue_always_new() {
        let report = scan(
            &state_with_weight("AAA", dec!(0.10)),
            &state_with_weight("AAA", dec!(0.10)),
            &Shelf::default(),
            &EngineOptions::default(),
            &[AttemptedBuy {
                instrument_id: "BANNED_FUND".to_string(),
                status: Some(ShelfStatus::Banned),
            }],
            &DataQuality::default(),
        );
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].dimension, dimension::GOVERNANCE);
        assert_eq!(report.issues[0].status, IssueStatus::New);
        assert_eq!(report.recommended_gate, RecommendedGate::ComplianceReview);
    }

    #[test]
    fn test_data_quality_severity_mapping() {
        let mut options = EngineOptions::default();
        options.suitability.data_quality_severity = Some("MEDIUM".to_string());
        let mut dq = DataQuality::default();
        dq.price_missing.push("AAA".to_string());
        let report = scan(
            &state_with_weight("AAA", dec!(0.10)),
            &state_with_weight("AAA", dec!(0.10)),
            &Shelf::default(),
            &options,
            &[],
            &dq,
        );
        assert_eq!(report.issues[0].severity, ReasonSeverity::Medium);
        assert_eq!(report.recommended_gate, RecommendedGate::RiskReview);
    }
}
