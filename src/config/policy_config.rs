//! Policy pack configuration.

use anyhow::Result;
use std::env;

use super::supportability_config::parse_bool;

#[derive(Debug, Clone)]
pub struct PolicyPackEnvConfig {
    pub enabled: bool,
    pub default_pack_id: Option<String>,
    /// `ENV` (JSON in `DPM_POLICY_PACK_CATALOG_JSON`) or `POSTGRES`.
    pub catalog_backend: String,
    pub catalog_json: Option<String>,
    pub postgres_dsn: Option<String>,
    pub tenant_resolution_enabled: bool,
    pub tenant_map_json: Option<String>,
}

impl PolicyPackEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_bool("DPM_POLICY_PACKS_ENABLED", false)?,
            default_pack_id: env::var("DPM_DEFAULT_POLICY_PACK_ID").ok(),
            catalog_backend: env::var("DPM_POLICY_PACK_CATALOG_BACKEND")
                .unwrap_or_else(|_| "ENV".to_string())
                .to_uppercase(),
            catalog_json: env::var("DPM_POLICY_PACK_CATALOG_JSON").ok(),
            postgres_dsn: env::var("DPM_POLICY_PACK_POSTGRES_DSN").ok(),
            tenant_resolution_enabled: parse_bool(
                "DPM_TENANT_POLICY_PACK_RESOLUTION_ENABLED",
                false,
            )?,
            tenant_map_json: env::var("DPM_TENANT_POLICY_PACK_MAP_JSON").ok(),
        })
    }
}
