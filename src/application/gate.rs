//! Workflow gate derivation.
//!
//! A pure function of the run status, rule results, suitability report,
//! and diagnostics. Evaluation order is fixed: blocked input, compliance
//! triggers, risk triggers, then consent routing.

use crate::domain::model::diagnostics::Diagnostics;
use crate::domain::model::gate::{
    GateDecision, GateNextStep, GateReason, GateStatus, ReasonSeverity,
};
use crate::domain::model::options::EngineOptions;
use crate::domain::model::rules::{RuleResult, RuleSeverity, RunStatus};
use crate::domain::model::suitability::{IssueStatus, SuitabilityReport, dimension};

const SOURCE_RULE: &str = "RULE";
const SOURCE_SUITABILITY: &str = "SUITABILITY";
const SOURCE_DIAGNOSTIC: &str = "DIAGNOSTIC";

pub fn evaluate_gate(
    status: RunStatus,
    rules: &[RuleResult],
    suitability: Option<&SuitabilityReport>,
    diagnostics: &Diagnostics,
    options: &EngineOptions,
) -> Option<GateDecision> {
    if !options.enable_workflow_gates {
        return None;
    }

    let requires_consent =
        options.workflow_requires_client_consent && !options.client_consent_already_obtained;

    // 1. Blocked runs route back to the input.
    if status == RunStatus::Blocked {
        let mut reasons: Vec<GateReason> = rules
            .iter()
            .filter(|r| !r.passed && r.severity == RuleSeverity::Hard)
            .map(|r| GateReason {
                severity: ReasonSeverity::High,
                source: SOURCE_RULE.to_string(),
                reason_code: r.rule_id.clone(),
                message: r.message.clone(),
            })
            .collect();
        for pair in &diagnostics.missing_fx_pairs {
            reasons.push(GateReason {
                severity: ReasonSeverity::High,
                source: SOURCE_DIAGNOSTIC.to_string(),
                reason_code: format!("MISSING_FX_{}", pair.replace('/', "_")),
                message: format!("No FX rate available for {pair}"),
            });
        }
        for breach in &diagnostics.cash_ladder_breaches {
            reasons.push(GateReason {
                severity: ReasonSeverity::High,
                source: SOURCE_DIAGNOSTIC.to_string(),
                reason_code: breach.reason.clone(),
                message: format!(
                    "{} balance {} on T+{} beyond overdraft {}",
                    breach.currency, breach.balance, breach.day, breach.overdraft_limit
                ),
            });
        }
        GateDecision::sort_reasons(&mut reasons);
        return Some(GateDecision {
            gate: GateStatus::Blocked,
            next_step: GateNextStep::FixInput,
            reasons,
            requires_client_consent: requires_consent,
        });
    }

    // 2. Compliance review: new HIGH suitability findings or governance
    // violations.
    if let Some(report) = suitability {
        let governance_violation = report
            .issues
            .iter()
            .any(|i| i.status == IssueStatus::New && i.dimension == dimension::GOVERNANCE);
        if report.has_new_at(ReasonSeverity::High) || governance_violation {
            let mut reasons: Vec<GateReason> = report
                .issues
                .iter()
                .filter(|i| {
                    i.status == IssueStatus::New
                        && (i.severity == ReasonSeverity::High
                            || i.dimension == dimension::GOVERNANCE)
                })
                .map(suitability_reason)
                .collect();
            GateDecision::sort_reasons(&mut reasons);
            return Some(GateDecision {
                gate: GateStatus::ComplianceReviewRequired,
                next_step: GateNextStep::ComplianceReview,
                reasons,
                requires_client_consent: requires_consent,
            });
        }
    }

    // 3. Risk review: soft rule failures or new MEDIUM suitability.
    let soft_fails: Vec<&RuleResult> = rules
        .iter()
        .filter(|r| !r.passed && r.severity == RuleSeverity::Soft)
        .collect();
    let new_medium = suitability
        .map(|r| r.has_new_at(ReasonSeverity::Medium))
        .unwrap_or(false);
    if !soft_fails.is_empty() || new_medium {
        let mut reasons: Vec<GateReason> = soft_fails
            .iter()
            .map(|r| GateReason {
                severity: ReasonSeverity::Medium,
                source: SOURCE_RULE.to_string(),
                reason_code: r.rule_id.clone(),
                message: r.message.clone(),
            })
            .collect();
        if let Some(report) = suitability {
            reasons.extend(
                report
                    .issues
                    .iter()
                    .filter(|i| {
                        i.status == IssueStatus::New && i.severity == ReasonSeverity::Medium
                    })
                    .map(suitability_reason),
            );
        }
        GateDecision::sort_reasons(&mut reasons);
        return Some(GateDecision {
            gate: GateStatus::RiskReviewRequired,
            next_step: GateNextStep::RiskReview,
            reasons,
            requires_client_consent: requires_consent,
        });
    }

    // 4. Clean and feasible: consent routing.
    if requires_consent {
        Some(GateDecision {
            gate: GateStatus::ClientConsentRequired,
            next_step: GateNextStep::ObtainClientConsent,
            reasons: vec![],
            requires_client_consent: true,
        })
    } else {
        Some(GateDecision {
            gate: GateStatus::ExecutionReady,
            next_step: GateNextStep::Execute,
            reasons: vec![],
            requires_client_consent: false,
        })
    }
}

fn suitability_reason(issue: &crate::domain::model::suitability::SuitabilityIssue) -> GateReason {
    GateReason {
        severity: issue.severity,
        source: SOURCE_SUITABILITY.to_string(),
        reason_code: issue.issue_key.clone(),
        message: issue.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::rules::rule_id;
    use crate::domain::model::suitability::{RecommendedGate, SuitabilityIssue};

    fn gated_options() -> EngineOptions {
        let mut options = EngineOptions::default();
        options.enable_workflow_gates = true;
        options
    }

    fn report(issues: Vec<SuitabilityIssue>) -> SuitabilityReport {
        SuitabilityReport {
            issues,
            recommended_gate: RecommendedGate::None,
        }
    }

    fn issue(status: IssueStatus, severity: ReasonSeverity, dim: &str) -> SuitabilityIssue {
        SuitabilityIssue {
            issue_key: SuitabilityIssue::key(dim, "X"),
            dimension: dim.to_string(),
            entity: "X".to_string(),
            status,
            severity,
            message: String::new(),
        }
    }

    #[test]
    fn test_disabled_gates_return_none() {
        let decision = evaluate_gate(
            RunStatus::Ready,
            &[],
            None,
            &Diagnostics::default(),
            &EngineOptions::default(),
        );
        assert!(decision.is_none());
    }

    #[test]
    fn test_blocked_routes_to_fix_input() {
        let rules = vec![RuleResult::fail(
            rule_id::NO_SHORTING,
            RuleSeverity::Hard,
            "short",
            vec![],
        )];
        let decision = evaluate_gate(
            RunStatus::Blocked,
            &rules,
            None,
            &Diagnostics::default(),
            &gated_options(),
        )
        .unwrap();
        assert_eq!(decision.gate, GateStatus::Blocked);
        assert_eq!(decision.next_step, GateNextStep::FixInput);
        assert_eq!(decision.reasons.len(), 1);
    }

    #[test]
    fn test_new_high_suitability_requires_compliance() {
        let suitability = report(vec![issue(
            IssueStatus::New,
            ReasonSeverity::High,
            dimension::ISSUER_CONCENTRATION,
        )]);
        let decision = evaluate_gate(
            RunStatus::Ready,
            &[],
            Some(&suitability),
            &Diagnostics::default(),
            &gated_options(),
        )
        .unwrap();
        assert_eq!(decision.gate, GateStatus::ComplianceReviewRequired);
    }

    #[test]
    fn test_governance_violation_requires_compliance_even_when_low() {
        let suitability = report(vec![issue(
            IssueStatus::New,
            ReasonSeverity::Low,
            dimension::GOVERNANCE,
        )]);
        let decision = evaluate_gate(
            RunStatus::Ready,
            &[],
            Some(&suitability),
            &Diagnostics::default(),
            &gated_options(),
        )
        .unwrap();
        assert_eq!(decision.gate, GateStatus::ComplianceReviewRequired);
    }

    #[test]
    fn test_soft_fail_requires_risk_review() {
        let rules = vec![RuleResult::fail(
            rule_id::CASH_BAND,
            RuleSeverity::Soft,
            "band",
            vec![],
        )];
        let decision = evaluate_gate(
            RunStatus::PendingReview,
            &rules,
            None,
            &Diagnostics::default(),
            &gated_options(),
        )
        .unwrap();
        assert_eq!(decision.gate, GateStatus::RiskReviewRequired);
    }

    #[test]
    fn test_consent_routing() {
        let without_consent = evaluate_gate(
            RunStatus::Ready,
            &[],
            None,
            &Diagnostics::default(),
            &gated_options(),
        )
        .unwrap();
        assert_eq!(without_consent.gate, GateStatus::ClientConsentRequired);

        let mut options = gated_options();
        options.client_consent_already_obtained = true;
        let with_consent = evaluate_gate(
            RunStatus::Ready,
            &[],
            None,
            &Diagnostics::default(),
            &options,
        )
        .unwrap();
        assert_eq!(with_consent.gate, GateStatus::ExecutionReady);
        assert_eq!(with_consent.next_step, GateNextStep::Execute);
    }

    #[test]
    fn test_resolved_issues_do_not_gate() {
        let suitability = report(vec![issue(
            IssueStatus::Resolved,
            ReasonSeverity::High,
            dimension::SINGLE_POSITION,
        )]);
        let mut options = gated_options();
        options.client_consent_already_obtained = true;
        let decision = evaluate_gate(
            RunStatus::Ready,
            &[],
            Some(&suitability),
            &Diagnostics::default(),
            &options,
        )
        .unwrap();
        assert_eq!(decision.gate, GateStatus::ExecutionReady);
    }
}
