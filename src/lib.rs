//! Issue Triage: label-driven triage for GitHub issues.
//!
//! Classifies open issues on three dimensions (type, priority, complexity)
//! by asking an LLM oracle, overriding priority with a keyword heuristic when
//! a report reads as urgent, and converges the issue's labels on the result.
//! Each issue gets at most one rationale comment, however often it is
//! re-triaged.
//!
//! # Core Concepts
//!
//! - **Record store**: the issue tracker ([`RecordStore`]), GitHub in production
//! - **Oracle**: the language model judging an issue ([`Oracle`])
//! - **Classifier**: oracle + urgency heuristic + fallback ([`Classifier`])
//! - **Triage**: single-issue and batch orchestration ([`Triage`])
//!
//! # Example
//!
//! ```
//! use issue_triage::{judgment_json, Classifier, MemoryStore, MockOracle, RetryPolicy, Triage};
//! use std::sync::Arc;
//!
//! let oracle = MockOracle::replying(judgment_json("bug", "P2", "Low", "Typo in error text."));
//! let classifier = Classifier::new(Arc::new(oracle), RetryPolicy::default());
//! let engine = Triage::new(Arc::new(MemoryStore::new()), Arc::new(classifier));
//! // Engine is ready for use
//! # let _ = engine;
//! ```

pub mod annotation;
pub mod batch;
pub mod classify;
pub mod config;
pub mod mcp;
pub mod oracle;
pub mod rank;
pub mod reconcile;
pub mod retry;
pub mod stats;
pub mod store;
pub mod triage;

pub use batch::{BatchItem, BatchOptions, BatchSummary, ItemOutcome};
pub use classify::{Classification, Classifier, Complexity, IssueType, Priority, Provenance};
pub use config::{ConfigError, TriageConfig};
pub use oracle::{judgment_json, AnthropicOracle, MockFailure, MockOracle, Oracle, OracleConfig, OracleError};
pub use rank::{find_contributor_issues, RankedIssue};
pub use reconcile::LabelDelta;
pub use retry::RetryPolicy;
pub use stats::{fetch_repo_stats, RepoStats};
pub use store::{
    Comment, GitHubConfig, GitHubStore, InjectedFailure, Issue, IssueQuery, MemoryStore, RecordStore,
    RepoRef, RetryingStore, StoreError, StoreResult,
};
pub use triage::{AnnotationStatus, Triage, TriageError, TriageOutcome, TriageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
