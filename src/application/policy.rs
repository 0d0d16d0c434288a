//! Policy pack resolution and option substitution.
//!
//! Precedence: explicit request header, then tenant default, then global
//! default, then none. A resolved pack overlays its configured fields onto
//! the request options; fields the pack does not set are left alone.

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::errors::PolicyError;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::policy::{EffectivePolicy, PolicyPack, PolicySource};

pub struct PolicyResolver {
    enabled: bool,
    catalog: BTreeMap<String, PolicyPack>,
    default_pack_id: Option<String>,
    tenant_resolution_enabled: bool,
    tenant_map: BTreeMap<String, String>,
}

impl PolicyResolver {
    pub fn new(
        enabled: bool,
        catalog: BTreeMap<String, PolicyPack>,
        default_pack_id: Option<String>,
        tenant_resolution_enabled: bool,
        tenant_map: BTreeMap<String, String>,
    ) -> Self {
        Self {
            enabled,
            catalog,
            default_pack_id,
            tenant_resolution_enabled,
            tenant_map,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, BTreeMap::new(), None, false, BTreeMap::new())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn catalog(&self) -> Vec<&PolicyPack> {
        self.catalog.values().collect()
    }

    /// Parse a catalog from its JSON form: `{pack_id: {..pack..}}`.
    pub fn parse_catalog(json: &str) -> Result<BTreeMap<String, PolicyPack>, PolicyError> {
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| PolicyError::InvalidCatalog {
                reason: e.to_string(),
            })?;
        let mut catalog = BTreeMap::new();
        for (pack_id, mut value) in raw {
            if let Some(map) = value.as_object_mut() {
                map.entry("pack_id".to_string())
                    .or_insert_with(|| serde_json::Value::String(pack_id.clone()));
            }
            let pack: PolicyPack =
                serde_json::from_value(value).map_err(|e| PolicyError::InvalidCatalog {
                    reason: format!("{pack_id}: {e}"),
                })?;
            catalog.insert(pack_id, pack);
        }
        Ok(catalog)
    }

    pub fn resolve(
        &self,
        request_pack_id: Option<&str>,
        tenant_pack_id: Option<&str>,
        tenant_id: Option<&str>,
    ) -> Result<EffectivePolicy, PolicyError> {
        if !self.enabled {
            return Ok(EffectivePolicy::disabled());
        }

        if let Some(pack_id) = request_pack_id {
            return self.lookup(pack_id, PolicySource::Request);
        }

        let tenant_default = tenant_pack_id.map(str::to_string).or_else(|| {
            if self.tenant_resolution_enabled {
                tenant_id.and_then(|t| self.tenant_map.get(t).cloned())
            } else {
                None
            }
        });
        if let Some(pack_id) = tenant_default {
            return self.lookup(&pack_id, PolicySource::Tenant);
        }

        if let Some(pack_id) = &self.default_pack_id {
            return self.lookup(pack_id, PolicySource::Global);
        }

        Ok(EffectivePolicy::none())
    }

    fn lookup(&self, pack_id: &str, source: PolicySource) -> Result<EffectivePolicy, PolicyError> {
        let pack = self
            .catalog
            .get(pack_id)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownPack {
                pack_id: pack_id.to_string(),
            })?;
        debug!("Resolved policy pack {pack_id} from {source}");
        Ok(EffectivePolicy {
            source,
            pack: Some(pack),
        })
    }
}

/// Overlay the pack's configured fields onto the request options.
pub fn apply_policy(options: &EngineOptions, policy: &EffectivePolicy) -> EngineOptions {
    let Some(pack) = &policy.pack else {
        return options.clone();
    };
    let mut effective = options.clone();

    if let Some(value) = pack.turnover_policy.max_turnover_pct {
        effective.max_turnover_pct = Some(value);
    }
    if let Some(value) = pack.tax_policy.enable_tax_awareness {
        effective.enable_tax_awareness = value;
    }
    if let Some(value) = pack.tax_policy.max_realized_capital_gains {
        effective.max_realized_capital_gains = Some(value);
    }
    if let Some(value) = pack.settlement_policy.enable_settlement_awareness {
        effective.enable_settlement_awareness = value;
    }
    if let Some(value) = pack.settlement_policy.settlement_horizon_days {
        effective.settlement_horizon_days = value;
    }
    if let Some(value) = pack.settlement_policy.fx_settlement_days {
        effective.fx_settlement_days = value;
    }
    if !pack.settlement_policy.max_overdraft_by_ccy.is_empty() {
        effective.max_overdraft_by_ccy = pack.settlement_policy.max_overdraft_by_ccy.clone();
    }
    if let Some(value) = pack.settlement_policy.fx_buffer_pct {
        effective.fx_buffer_pct = value;
    }
    if let Some(value) = pack.constraint_policy.single_position_max_weight {
        effective.single_position_max_weight = Some(value);
    }
    if !pack.constraint_policy.group_constraints.is_empty() {
        effective.group_constraints = pack.constraint_policy.group_constraints.clone();
    }
    if let Some(value) = pack.workflow_policy.enable_workflow_gates {
        effective.enable_workflow_gates = value;
    }
    if let Some(value) = pack.workflow_policy.workflow_requires_client_consent {
        effective.workflow_requires_client_consent = value;
    }
    if let Some(value) = pack.workflow_policy.client_consent_already_obtained {
        effective.client_consent_already_obtained = value;
    }

    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn resolver_with(pack_id: &str) -> PolicyResolver {
        let catalog = PolicyResolver::parse_catalog(&format!(
            r#"{{"{pack_id}": {{"turnover_policy": {{"max_turnover_pct": "0.10"}}}}}}"#
        ))
        .unwrap();
        PolicyResolver::new(true, catalog, None, false, BTreeMap::new())
    }

    #[test]
    fn test_disabled_source() {
        let resolver = PolicyResolver::disabled();
        let policy = resolver.resolve(Some("anything"), None, None).unwrap();
        assert_eq!(policy.source, PolicySource::Disabled);
        assert!(policy.pack.is_none());
    }

    #[test]
    fn test_request_header_wins() {
        let resolver = resolver_with("conservative");
        let policy = resolver
            .resolve(Some("conservative"), Some("ignored"), None)
            .unwrap();
        assert_eq!(policy.source, PolicySource::Request);
    }

    #[test]
    fn test_unknown_pack_errors() {
        let resolver = resolver_with("conservative");
        assert!(matches!(
            resolver.resolve(Some("nope"), None, None),
            Err(PolicyError::UnknownPack { .. })
        ));
    }

    #[test]
    fn test_tenant_map_resolution() {
        let catalog = PolicyResolver::parse_catalog(
            r#"{"tenant_pack": {"workflow_policy": {"enable_workflow_gates": true}}}"#,
        )
        .unwrap();
        let resolver = PolicyResolver::new(
            true,
            catalog,
            None,
            true,
            BTreeMap::from([("tenant_a".to_string(), "tenant_pack".to_string())]),
        );
        let policy = resolver.resolve(None, None, Some("tenant_a")).unwrap();
        assert_eq!(policy.source, PolicySource::Tenant);
    }

    #[test]
    fn test_global_default_fallback_and_none() {
        let catalog =
            PolicyResolver::parse_catalog(r#"{"global_pack": {}}"#).unwrap();
        let resolver = PolicyResolver::new(
            true,
            catalog,
            Some("global_pack".to_string()),
            false,
            BTreeMap::new(),
        );
        let policy = resolver.resolve(None, None, None).unwrap();
        assert_eq!(policy.source, PolicySource::Global);

        let resolver = PolicyResolver::new(true, BTreeMap::new(), None, false, BTreeMap::new());
        let policy = resolver.resolve(None, None, None).unwrap();
        assert_eq!(policy.source, PolicySource::None);
    }

    #[test]
    fn test_apply_substitution_table() {
        let resolver = resolver_with("conservative");
        let policy = resolver.resolve(Some("conservative"), None, None).unwrap();
        let options = EngineOptions::default();
        let effective = apply_policy(&options, &policy);
        assert_eq!(effective.max_turnover_pct, Some(dec!(0.10)));
        // Untouched fields keep their request values.
        assert_eq!(effective.valuation_mode, options.valuation_mode);
    }
}
