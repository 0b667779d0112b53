//! Runtime configuration and engine assembly.
//!
//! Credentials travel inside the adapter configs and are handed over at
//! construction; nothing below this module reads the environment. The CLI
//! fills a [`TriageConfig`] from flags and their env fallbacks.

use crate::batch::BatchOptions;
use crate::classify::Classifier;
use crate::oracle::{AnthropicOracle, OracleConfig, OracleError};
use crate::retry::RetryPolicy;
use crate::stats::{DEFAULT_STALE_AFTER_DAYS, STALE_AFTER_DAYS_RANGE};
use crate::store::{GitHubConfig, GitHubStore, RetryingStore, StoreError};
use crate::triage::Triage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build GitHub client: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build classifier client: {0}")]
    Oracle(#[from] OracleError),

    #[error("stale threshold must be between 1 and 36500 days, got {0}")]
    StaleThreshold(i64),
}

/// Everything needed to stand up the triage engine.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub github: GitHubConfig,
    pub oracle: OracleConfig,
    /// Applied to every GitHub and oracle call
    pub retry: RetryPolicy,
    /// Defaults for batch runs; `dry_run` is chosen per run
    pub batch: BatchOptions,
    pub stale_after_days: i64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            oracle: OracleConfig::default(),
            retry: RetryPolicy::default(),
            batch: BatchOptions::default(),
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
        }
    }
}

impl TriageConfig {
    /// GitHub store behind the retry policy, plus the Anthropic-backed
    /// classifier.
    ///
    /// A missing oracle key is not an error here: stats and ranking work
    /// without one, and triage reports it per call.
    pub fn build_engine(&self) -> Result<Triage, ConfigError> {
        if !STALE_AFTER_DAYS_RANGE.contains(&self.stale_after_days) {
            return Err(ConfigError::StaleThreshold(self.stale_after_days));
        }

        let github = GitHubStore::new(&self.github)?;
        let store = RetryingStore::new(Arc::new(github), self.retry);

        let oracle = AnthropicOracle::new(self.oracle.clone())?;
        if !oracle.is_configured() {
            warn!("no classifier API key configured; triage calls will fail until one is set");
        }
        if self.github.token.is_none() {
            warn!("no GitHub token configured; label and comment writes will be rejected");
        }
        let classifier = Classifier::new(Arc::new(oracle), self.retry);

        info!(
            api_base = %self.github.api_base,
            model = %self.oracle.model,
            max_attempts = self.retry.max_attempts,
            "triage engine ready"
        );
        Ok(Triage::new(Arc::new(store), Arc::new(classifier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TriageConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.batch.limit, 100);
        assert_eq!(config.stale_after_days, 30);
        assert!(config.github.token.is_none());
    }

    #[test]
    fn engine_builds_without_credentials() {
        assert!(TriageConfig::default().build_engine().is_ok());
    }

    #[test]
    fn stale_threshold_outside_range_is_rejected() {
        for days in [0, -5, 36_501, 1_000_000_000] {
            let config = TriageConfig {
                stale_after_days: days,
                ..TriageConfig::default()
            };
            assert!(matches!(
                config.build_engine(),
                Err(ConfigError::StaleThreshold(d)) if d == days
            ));
        }
        for days in [1, 36_500] {
            let config = TriageConfig {
                stale_after_days: days,
                ..TriageConfig::default()
            };
            assert!(config.build_engine().is_ok());
        }
    }
}
