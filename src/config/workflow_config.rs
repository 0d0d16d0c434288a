//! Run-workflow configuration.

use anyhow::Result;
use std::env;

use super::supportability_config::parse_bool;

#[derive(Debug, Clone)]
pub struct WorkflowEnvConfig {
    pub enabled: bool,
    /// Run statuses that require a review before execution.
    pub requires_review_statuses: Vec<String>,
}

impl WorkflowEnvConfig {
    pub fn from_env() -> Result<Self> {
        let statuses = env::var("DPM_WORKFLOW_REQUIRES_REVIEW_FOR_STATUSES")
            .unwrap_or_else(|_| "PENDING_REVIEW".to_string());
        Ok(Self {
            enabled: parse_bool("DPM_WORKFLOW_ENABLED", false)?,
            requires_review_statuses: statuses
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_statuses() {
        // Only meaningful when the env var is unset in the test runner.
        if env::var("DPM_WORKFLOW_REQUIRES_REVIEW_FOR_STATUSES").is_err() {
            let config = WorkflowEnvConfig::from_env().unwrap();
            assert_eq!(config.requires_review_statuses, vec!["PENDING_REVIEW"]);
        }
    }
}
