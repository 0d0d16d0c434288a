use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::model::options::GroupConstraint;

/// Where the effective policy pack came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicySource {
    Request,
    Tenant,
    Global,
    None,
    Disabled,
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PolicySource::Request => "REQUEST",
            PolicySource::Tenant => "TENANT",
            PolicySource::Global => "GLOBAL",
            PolicySource::None => "NONE",
            PolicySource::Disabled => "DISABLED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnoverPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turnover_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_tax_awareness: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_realized_capital_gains: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_settlement_awareness: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_horizon_days: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_settlement_days: Option<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max_overdraft_by_ccy: BTreeMap<String, Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_buffer_pct: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_position_max_weight: Option<Decimal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub group_constraints: BTreeMap<String, GroupConstraint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_workflow_gates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_requires_client_consent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_consent_already_obtained: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdempotencyPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_enabled: Option<bool>,
}

/// A named bundle of thresholds and toggles that maps onto engine options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPack {
    #[serde(default)]
    pub pack_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub turnover_policy: TurnoverPolicy,
    #[serde(default)]
    pub tax_policy: TaxPolicy,
    #[serde(default)]
    pub settlement_policy: SettlementPolicy,
    #[serde(default)]
    pub constraint_policy: ConstraintPolicy,
    #[serde(default)]
    pub workflow_policy: WorkflowPolicy,
    #[serde(default)]
    pub idempotency_policy: IdempotencyPolicy,
}

/// The resolved pack plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePolicy {
    pub source: PolicySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<PolicyPack>,
}

impl EffectivePolicy {
    pub fn none() -> Self {
        Self {
            source: PolicySource::None,
            pack: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            source: PolicySource::Disabled,
            pack: None,
        }
    }

    pub fn replay_enabled_override(&self) -> Option<bool> {
        self.pack
            .as_ref()
            .and_then(|p| p.idempotency_policy.replay_enabled)
    }
}
