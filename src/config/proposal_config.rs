//! Proposal store and lifecycle configuration.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use super::supportability_config::parse_bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalBackend {
    InMemory,
    Postgres,
}

impl FromStr for ProposalBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IN_MEMORY" => Ok(ProposalBackend::InMemory),
            "POSTGRES" => Ok(ProposalBackend::Postgres),
            _ => anyhow::bail!(
                "Invalid proposal store backend: {}. Must be 'IN_MEMORY' or 'POSTGRES'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProposalEnvConfig {
    pub backend: ProposalBackend,
    pub postgres_dsn: Option<String>,
    pub workflow_lifecycle_enabled: bool,
    pub store_evidence_bundle: bool,
    pub require_expected_state: bool,
    pub allow_portfolio_change_on_new_version: bool,
    pub require_simulation: bool,
}

impl ProposalEnvConfig {
    pub fn from_env() -> Result<Self> {
        let backend = env::var("PROPOSAL_STORE_BACKEND")
            .unwrap_or_else(|_| "IN_MEMORY".to_string())
            .parse()
            .context("Failed to parse PROPOSAL_STORE_BACKEND")?;
        Ok(Self {
            backend,
            postgres_dsn: env::var("PROPOSAL_POSTGRES_DSN").ok(),
            workflow_lifecycle_enabled: parse_bool("PROPOSAL_WORKFLOW_LIFECYCLE_ENABLED", true)?,
            store_evidence_bundle: parse_bool("PROPOSAL_STORE_EVIDENCE_BUNDLE", true)?,
            require_expected_state: parse_bool("PROPOSAL_REQUIRE_EXPECTED_STATE", false)?,
            allow_portfolio_change_on_new_version: parse_bool(
                "PROPOSAL_ALLOW_PORTFOLIO_CHANGE_ON_NEW_VERSION",
                false,
            )?,
            require_simulation: parse_bool("PROPOSAL_REQUIRE_SIMULATION_FLAG", false)?,
        })
    }
}
