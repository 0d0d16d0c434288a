//! HTTP server configuration.

use anyhow::Result;
use std::env;

use super::supportability_config::parse_u16;

#[derive(Debug, Clone)]
pub struct ServerEnvConfig {
    pub bind: String,
    pub port: u16,
}

impl ServerEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind: env::var("SERVER_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_u16("SERVER_PORT", 8080)?,
        })
    }
}
