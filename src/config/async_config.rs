//! Async operation configuration.

use anyhow::Result;
use std::env;

use super::supportability_config::{parse_bool, parse_i64, parse_u64};

#[derive(Debug, Clone)]
pub struct AsyncEnvConfig {
    pub enabled: bool,
    pub ttl_seconds: i64,
    pub execution_mode: String,
    pub manual_execution_enabled: bool,
    pub sweep_interval_seconds: u64,
}

impl AsyncEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_bool("DPM_ASYNC_OPERATIONS_ENABLED", true)?,
            ttl_seconds: parse_i64("DPM_ASYNC_OPERATIONS_TTL_SECONDS", 86_400)?,
            execution_mode: env::var("DPM_ASYNC_EXECUTION_MODE")
                .unwrap_or_else(|_| "INLINE".to_string()),
            manual_execution_enabled: parse_bool("DPM_ASYNC_MANUAL_EXECUTION_ENABLED", true)?,
            sweep_interval_seconds: parse_u64("DPM_ASYNC_SWEEP_INTERVAL_SECONDS", 300)?,
        })
    }
}
