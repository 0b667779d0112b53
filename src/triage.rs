//! Single-issue triage: fetch → check annotation → classify → reconcile
//! labels → annotate once.
//!
//! Running this twice on an unchanged issue leaves the same labels and
//! exactly one rationale comment; the second run reports the comment as
//! preserved.

use crate::annotation::{compose_annotation, has_existing_annotation};
use crate::classify::{Classification, Classifier};
use crate::oracle::OracleError;
use crate::reconcile::{apply_delta, reconcile};
use crate::store::{RecordStore, RepoRef, StoreError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Errors surfaced by the triage operations.
///
/// Controlled failures (see [`TriageError::is_controlled`]) are expected
/// conditions the caller can fix; everything else is unexpected and is
/// logged in full at the outer boundary.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}. Check the owner, repository name and issue number")]
    NotFound(String),

    #[error("GitHub authentication failed ({status}): {message}. Check that the token is set and can read and write issues")]
    Auth { status: u16, message: String },

    #[error("classifier not configured: {0}")]
    OracleCredential(String),

    #[error("rate limit exceeded after retries: {0}")]
    RateLimited(String),

    #[error("classifier call failed: {0}")]
    Oracle(OracleError),

    #[error("GitHub request failed: {0}")]
    Store(StoreError),
}

impl TriageError {
    /// Controlled failures are reported to the caller as-is; the rest are
    /// unexpected.
    pub fn is_controlled(&self) -> bool {
        matches!(
            self,
            TriageError::InvalidInput(_)
                | TriageError::NotFound(_)
                | TriageError::Auth { .. }
                | TriageError::OracleCredential(_)
        )
    }

    /// Stable tag for error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            TriageError::InvalidInput(_) => "invalid_input",
            TriageError::NotFound(_) => "not_found",
            TriageError::Auth { .. } => "auth_failed",
            TriageError::OracleCredential(_) => "classifier_not_configured",
            TriageError::RateLimited(_) => "rate_limited",
            TriageError::Oracle(_) => "classifier_error",
            TriageError::Store(_) => "github_error",
        }
    }
}

impl From<StoreError> for TriageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => TriageError::NotFound(what),
            StoreError::Auth { status, message } => TriageError::Auth { status, message },
            StoreError::RateLimited(msg) => TriageError::RateLimited(format!("GitHub: {msg}")),
            other => TriageError::Store(other),
        }
    }
}

impl From<OracleError> for TriageError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::MissingCredential(msg) => TriageError::OracleCredential(msg),
            OracleError::Auth { status, message } => {
                TriageError::OracleCredential(format!("API key rejected ({status}): {message}"))
            }
            OracleError::RateLimited(msg) => TriageError::RateLimited(format!("classifier: {msg}")),
            other => TriageError::Oracle(other),
        }
    }
}

/// Result type for triage operations
pub type TriageResult<T> = Result<T, TriageError>;

/// What happened to the rationale comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    /// Posted on this run
    Posted,
    /// A previous run already posted one; not duplicated
    Preserved,
}

/// Result of triaging one issue.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    pub repo: RepoRef,
    pub issue_number: u64,
    pub title: String,
    pub html_url: String,
    pub classification: Classification,
    pub labels_removed: Vec<String>,
    pub labels_applied: Vec<String>,
    pub annotation: AnnotationStatus,
    pub summary: String,
}

impl TriageOutcome {
    pub fn annotation_posted(&self) -> bool {
        self.annotation == AnnotationStatus::Posted
    }
}

/// The triage engine: a record store plus the classification policy.
///
/// The store should already carry its retry policy (see
/// [`crate::store::RetryingStore`]).
#[derive(Clone)]
pub struct Triage {
    store: Arc<dyn RecordStore>,
    classifier: Arc<Classifier>,
}

impl Triage {
    pub fn new(store: Arc<dyn RecordStore>, classifier: Arc<Classifier>) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Triage one issue end to end.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn triage_issue(&self, repo: &RepoRef, number: u64) -> TriageResult<TriageOutcome> {
        let issue = self.store.get_issue(repo, number).await?;
        let already_annotated = has_existing_annotation(self.store(), repo, number).await?;

        let classification = self.classifier.classify(&issue.title, &issue.body).await?;

        let delta = reconcile(&issue.labels, &classification);
        apply_delta(self.store(), repo, number, &delta).await?;

        let annotation = if already_annotated {
            AnnotationStatus::Preserved
        } else {
            let body = compose_annotation(&classification, &delta.to_add);
            self.store.create_comment(repo, number, &body).await?;
            AnnotationStatus::Posted
        };

        let summary = match annotation {
            AnnotationStatus::Posted => format!(
                "Triaged {}#{}: applied {} and posted the analysis comment",
                repo,
                number,
                delta.to_add.join(", ")
            ),
            AnnotationStatus::Preserved => format!(
                "Triaged {}#{}: updated labels to {}; existing analysis comment preserved, not duplicated",
                repo,
                number,
                delta.to_add.join(", ")
            ),
        };
        info!(annotation = ?annotation, "{}", summary);

        Ok(TriageOutcome {
            repo: repo.clone(),
            issue_number: number,
            title: issue.title,
            html_url: issue.html_url,
            classification,
            labels_removed: delta.to_remove,
            labels_applied: delta.to_add,
            annotation,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let nf: TriageError = StoreError::NotFound("acme/widgets#9".into()).into();
        assert!(nf.is_controlled());
        assert_eq!(nf.kind(), "not_found");

        let auth: TriageError = StoreError::Auth {
            status: 403,
            message: "nope".into(),
        }
        .into();
        assert!(auth.is_controlled());
        assert!(auth.to_string().contains("403"));

        let limited: TriageError = StoreError::RateLimited("slow down".into()).into();
        assert!(!limited.is_controlled());
        assert_eq!(limited.kind(), "rate_limited");

        let api: TriageError = StoreError::Api {
            status: 500,
            message: "boom".into(),
        }
        .into();
        assert!(!api.is_controlled());
        assert_eq!(api.kind(), "github_error");
    }

    #[test]
    fn oracle_errors_map_to_taxonomy() {
        let missing: TriageError = OracleError::MissingCredential("no key".into()).into();
        assert!(missing.is_controlled());
        assert_eq!(missing.kind(), "classifier_not_configured");

        let down: TriageError = OracleError::Unavailable("503".into()).into();
        assert!(!down.is_controlled());
        assert_eq!(down.kind(), "classifier_error");
    }
}
