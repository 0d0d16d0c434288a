//! Configuration module.
//!
//! Structured configuration loading from environment variables, organized
//! by concern: server, supportability store, async operations, workflow,
//! policy packs, and the proposal lifecycle. Production-profile guardrails
//! fail fast with stable reason codes before any listener starts.

mod async_config;
mod policy_config;
mod proposal_config;
mod server_config;
mod supportability_config;
mod workflow_config;

pub use async_config::AsyncEnvConfig;
pub use policy_config::PolicyPackEnvConfig;
pub use proposal_config::{ProposalBackend, ProposalEnvConfig};
pub use server_config::ServerEnvConfig;
pub use supportability_config::{StoreBackend, SupportabilityEnvConfig};
pub use workflow_config::WorkflowEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

/// Deployment profile: LOCAL permits non-persistent adapters, PRODUCTION
/// refuses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceProfile {
    Local,
    Production,
}

impl FromStr for PersistenceProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOCAL" => Ok(PersistenceProfile::Local),
            "PRODUCTION" => Ok(PersistenceProfile::Production),
            _ => anyhow::bail!(
                "Invalid APP_PERSISTENCE_PROFILE: {}. Must be 'LOCAL' or 'PRODUCTION'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub profile: PersistenceProfile,
    pub server: ServerEnvConfig,
    pub supportability: SupportabilityEnvConfig,
    pub async_ops: AsyncEnvConfig,
    pub workflow: WorkflowEnvConfig,
    pub policy: PolicyPackEnvConfig,
    pub proposal: ProposalEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let profile = env::var("APP_PERSISTENCE_PROFILE")
            .unwrap_or_else(|_| "LOCAL".to_string())
            .parse()
            .context("Failed to parse APP_PERSISTENCE_PROFILE")?;

        let config = Self {
            profile,
            server: ServerEnvConfig::from_env()?,
            supportability: SupportabilityEnvConfig::from_env()?,
            async_ops: AsyncEnvConfig::from_env()?,
            workflow: WorkflowEnvConfig::from_env()?,
            policy: PolicyPackEnvConfig::from_env()?,
            proposal: ProposalEnvConfig::from_env()?,
        };
        config.validate_profile()?;
        Ok(config)
    }

    /// PRODUCTION guardrails: only Postgres adapters with DSNs configured.
    /// The reason code strings are stable and grep-able from exit logs.
    fn validate_profile(&self) -> Result<()> {
        if self.profile != PersistenceProfile::Production {
            return Ok(());
        }

        if self.supportability.backend != StoreBackend::Postgres {
            anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_DPM_POSTGRES");
        }
        if self
            .supportability
            .postgres_dsn
            .as_deref()
            .unwrap_or("")
            .is_empty()
        {
            anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_DPM_POSTGRES_DSN");
        }

        if self.proposal.workflow_lifecycle_enabled {
            if self.proposal.backend != ProposalBackend::Postgres {
                anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_ADVISORY_POSTGRES");
            }
            if self.proposal.postgres_dsn.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_ADVISORY_POSTGRES_DSN");
            }
        }

        if self.policy.enabled {
            if self.policy.catalog_backend != "POSTGRES" {
                anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_POLICY_PACK_POSTGRES");
            }
            if self.policy.postgres_dsn.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("PERSISTENCE_PROFILE_REQUIRES_POLICY_PACK_POSTGRES_DSN");
            }
        }

        Ok(())
    }
}
