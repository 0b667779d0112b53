//! Classification oracle — the external LLM that judges an issue.
//!
//! The oracle is a single opaque call: prompt text in, judgment text out.
//! It carries no retry or validation responsibility; both live in the
//! classifier. Two implementations:
//! - [`AnthropicOracle`]: Anthropic Messages API (production)
//! - [`MockOracle`]: scripted replies that record every prompt (testing)

mod anthropic;

pub use anthropic::{AnthropicOracle, OracleConfig, DEFAULT_ANTHROPIC_API, DEFAULT_MODEL};

use crate::retry::RateLimitSignal;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from invoking the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle credential not configured: {0}")]
    MissingCredential(String),

    #[error("oracle rejected credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("oracle rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle invocation failed ({status}): {message}")]
    InvocationFailed { status: u16, message: String },

    #[error("oracle response envelope malformed: {0}")]
    Envelope(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl RateLimitSignal for OracleError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }
}

/// The classification oracle contract.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send a prompt, get the raw judgment text back.
    async fn infer(&self, prompt: &str) -> Result<String, OracleError>;
}

/// A failure the mock oracle can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    MissingCredential,
    RateLimited,
    Unavailable,
}

impl MockFailure {
    fn into_error(self) -> OracleError {
        match self {
            Self::MissingCredential => {
                OracleError::MissingCredential("mock oracle has no API key".to_string())
            }
            Self::RateLimited => OracleError::RateLimited("mock rate limit".to_string()),
            Self::Unavailable => OracleError::Unavailable("mock oracle is down".to_string()),
        }
    }
}

/// Mock oracle. Returns scripted replies and records every prompt.
///
/// Scripted replies are consumed in order; once exhausted, the fallback
/// reply (if any) is returned for every further call.
#[derive(Default)]
pub struct MockOracle {
    script: Mutex<VecDeque<Result<String, MockFailure>>>,
    fallback: Option<Result<String, MockFailure>>,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    /// Always reply with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(Ok(text.into())),
            ..Self::default()
        }
    }

    /// Always fail with `failure`.
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            fallback: Some(Err(failure)),
            ..Self::default()
        }
    }

    /// Queue a reply ahead of the fallback.
    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure ahead of the fallback.
    pub fn then_fail(self, failure: MockFailure) -> Self {
        self.script.lock().unwrap().push_back(Err(failure));
        self
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn infer(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = self.script.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(Ok(text)) => Ok(text),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Err(OracleError::Unavailable(
                "mock oracle has no scripted reply".to_string(),
            )),
        }
    }
}

/// Render a judgment the way a well-behaved oracle answers.
pub fn judgment_json(issue_type: &str, priority: &str, complexity: &str, rationale: &str) -> String {
    serde_json::json!({
        "type": issue_type,
        "priority": priority,
        "complexity": complexity,
        "rationale": rationale,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_consumes_script_then_falls_back() {
        let oracle = MockOracle::replying("fallback")
            .then_reply("first")
            .then_fail(MockFailure::RateLimited);

        assert_eq!(oracle.infer("a").await.unwrap(), "first");
        assert!(matches!(
            oracle.infer("b").await.unwrap_err(),
            OracleError::RateLimited(_)
        ));
        assert_eq!(oracle.infer("c").await.unwrap(), "fallback");
        assert_eq!(oracle.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unscripted_mock_reports_unavailable() {
        let oracle = MockOracle::default();
        let err = oracle.infer("anything").await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
        assert_eq!(oracle.call_count(), 1);
    }
}
