//! Supportability store and idempotency configuration from environment
//! variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Sqlite,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IN_MEMORY" => Ok(StoreBackend::InMemory),
            "SQLITE" => Ok(StoreBackend::Sqlite),
            "POSTGRES" => Ok(StoreBackend::Postgres),
            _ => anyhow::bail!(
                "Invalid store backend: {}. Must be 'IN_MEMORY', 'SQLITE', or 'POSTGRES'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupportabilityEnvConfig {
    pub backend: StoreBackend,
    pub postgres_dsn: Option<String>,
    pub sqlite_path: String,
    pub retention_days: i64,
    pub artifact_mode: String,

    // Idempotency
    pub idempotency_replay_enabled: bool,
    pub idempotency_cache_max_size: usize,

    // Feature gates on the support surface
    pub support_apis_enabled: bool,
    pub summary_apis_enabled: bool,
    pub lineage_apis_enabled: bool,
    pub idempotency_history_apis_enabled: bool,
}

impl SupportabilityEnvConfig {
    pub fn from_env() -> Result<Self> {
        let backend = env::var("DPM_SUPPORTABILITY_STORE_BACKEND")
            .unwrap_or_else(|_| "IN_MEMORY".to_string())
            .parse()
            .context("Failed to parse DPM_SUPPORTABILITY_STORE_BACKEND")?;

        Ok(Self {
            backend,
            postgres_dsn: env::var("DPM_SUPPORTABILITY_POSTGRES_DSN").ok(),
            sqlite_path: env::var("DPM_SUPPORTABILITY_SQLITE_PATH")
                .unwrap_or_else(|_| "data/supportability.db".to_string()),
            retention_days: parse_i64("DPM_SUPPORTABILITY_RETENTION_DAYS", 90)?,
            artifact_mode: env::var("DPM_RUN_ARTIFACT_MODE")
                .unwrap_or_else(|_| "PERSISTED".to_string()),
            idempotency_replay_enabled: parse_bool("DPM_IDEMPOTENCY_REPLAY_ENABLED", true)?,
            idempotency_cache_max_size: parse_usize("DPM_IDEMPOTENCY_CACHE_MAX_SIZE", 1000)?,
            support_apis_enabled: parse_bool("DPM_SUPPORT_APIS_ENABLED", true)?,
            summary_apis_enabled: parse_bool("DPM_SUPPORTABILITY_SUMMARY_APIS_ENABLED", true)?,
            lineage_apis_enabled: parse_bool("DPM_LINEAGE_APIS_ENABLED", true)?,
            idempotency_history_apis_enabled: parse_bool(
                "DPM_IDEMPOTENCY_HISTORY_APIS_ENABLED",
                true,
            )?,
        })
    }
}

pub(crate) fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => anyhow::bail!("Invalid boolean for {key}: {raw}"),
        },
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_i64(key: &str, default: i64) -> Result<i64> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_u16(key: &str, default: u16) -> Result<u16> {
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Failed to parse {key}")),
        Err(_) => Ok(default),
    }
}
