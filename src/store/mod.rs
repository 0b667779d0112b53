//! Record store: the issue tracker the triage engine reads from and writes to.
//!
//! The engine holds no copy of issue state. Every operation re-fetches through
//! a [`RecordStore`], so the only consistency concern is the race between
//! label removal and label addition (the store has no multi-call transaction).
//!
//! Implementations:
//! - [`GitHubStore`]: GitHub REST v3 (production)
//! - [`MemoryStore`]: in-process issues and comments (testing, demos)
//! - [`RetryingStore`]: wraps any store with a [`RetryPolicy`]

mod github;
mod memory;

pub use github::{GitHubConfig, GitHubStore, DEFAULT_GITHUB_API};
pub use memory::{InjectedFailure, MemoryStore};

use crate::retry::{RateLimitSignal, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RateLimitSignal for StoreError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// An `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// An issue as the engine sees it, after adapter-side validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Number of comments on the issue
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

impl Issue {
    /// Minimal issue for tests and demos. Timestamps are "now".
    pub fn new(number: u64, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            number,
            title: title.into(),
            body: body.into(),
            labels: Vec::new(),
            comments: 0,
            assignee: None,
            created_at: now,
            updated_at: now,
            html_url: String::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_comments(mut self, comments: u64) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_assignee(mut self, login: impl Into<String>) -> Self {
        self.assignee = Some(login.into());
        self
    }

    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee.is_some()
    }

    /// Labels lowercased, for the loose substring lookups used by batch,
    /// ranking and stats.
    pub fn lowercase_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_lowercase()).collect()
    }
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub author: Option<String>,
}

/// Filter for listing open issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    /// Only issues carrying every one of these labels
    pub labels: Vec<String>,
    /// Maximum number of issues returned (the store caps this at one page)
    pub limit: usize,
}

impl Default for IssueQuery {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            limit: 100,
        }
    }
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// The issue tracker contract consumed by the triage engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one issue. Missing issues are `StoreError::NotFound`.
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> StoreResult<Issue>;

    /// All comments on an issue, oldest first.
    async fn list_comments(&self, repo: &RepoRef, number: u64) -> StoreResult<Vec<Comment>>;

    /// Add labels. Labels already present are not an error.
    async fn add_labels(&self, repo: &RepoRef, number: u64, labels: &[String]) -> StoreResult<()>;

    /// Remove a label. A label that is already absent is not an error.
    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> StoreResult<()>;

    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str) -> StoreResult<Comment>;

    /// Open issues matching `query`, most recently updated first.
    async fn search_issues(&self, repo: &RepoRef, query: &IssueQuery) -> StoreResult<Vec<Issue>>;
}

/// Applies a [`RetryPolicy`] to every call of the wrapped store.
pub struct RetryingStore {
    inner: Arc<dyn RecordStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn RecordStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl RecordStore for RetryingStore {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> StoreResult<Issue> {
        self.policy
            .run("get_issue", || self.inner.get_issue(repo, number))
            .await
    }

    async fn list_comments(&self, repo: &RepoRef, number: u64) -> StoreResult<Vec<Comment>> {
        self.policy
            .run("list_comments", || self.inner.list_comments(repo, number))
            .await
    }

    async fn add_labels(&self, repo: &RepoRef, number: u64, labels: &[String]) -> StoreResult<()> {
        self.policy
            .run("add_labels", || self.inner.add_labels(repo, number, labels))
            .await
    }

    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> StoreResult<()> {
        self.policy
            .run("remove_label", || self.inner.remove_label(repo, number, label))
            .await
    }

    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str) -> StoreResult<Comment> {
        self.policy
            .run("create_comment", || self.inner.create_comment(repo, number, body))
            .await
    }

    async fn search_issues(&self, repo: &RepoRef, query: &IssueQuery) -> StoreResult<Vec<Issue>> {
        self.policy
            .run("search_issues", || self.inner.search_issues(repo, query))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn retrying_store_rides_out_transient_rate_limits() {
        let repo = RepoRef::new("acme", "widgets");
        let memory = Arc::new(MemoryStore::new());
        memory.insert_issue(&repo, Issue::new(7, "Button misaligned", ""));
        memory.fail_next(2, InjectedFailure::RateLimited);

        let store = RetryingStore::new(memory.clone(), RetryPolicy::new(3, Duration::from_secs(1)));
        let issue = store.get_issue(&repo, 7).await.unwrap();
        assert_eq!(issue.title, "Button misaligned");
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_store_surfaces_rate_limit_after_budget() {
        let repo = RepoRef::new("acme", "widgets");
        let memory = Arc::new(MemoryStore::new());
        memory.insert_issue(&repo, Issue::new(7, "Button misaligned", ""));
        memory.fail_next(5, InjectedFailure::RateLimited);

        let store = RetryingStore::new(memory.clone(), RetryPolicy::new(3, Duration::from_secs(1)));
        let err = store.get_issue(&repo, 7).await.unwrap_err();
        assert!(matches!(err, StoreError::RateLimited(_)));
        // two injected failures remain unconsumed
        assert_eq!(memory.pending_failures(), 2);
    }

    #[tokio::test]
    async fn retrying_store_does_not_retry_not_found() {
        let repo = RepoRef::new("acme", "widgets");
        let memory = Arc::new(MemoryStore::new());

        let store = RetryingStore::new(memory.clone(), RetryPolicy::default());
        let err = store.get_issue(&repo, 404).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn repo_ref_displays_as_slug() {
        assert_eq!(RepoRef::new("acme", "widgets").to_string(), "acme/widgets");
    }
}
