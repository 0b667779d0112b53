//! Common test utilities for triage workflow tests
//!
//! Wires a [`Triage`] engine to the in-memory store and the scripted mock
//! oracle, so the orchestrators run end to end without network access.

#![allow(dead_code)]

use issue_triage::annotation::ANNOTATION_SIGNATURE;
use issue_triage::{
    Classifier, Issue, MemoryStore, MockOracle, RecordStore, RepoRef, RetryPolicy, RetryingStore,
    Triage,
};
use std::sync::Arc;

pub fn repo() -> RepoRef {
    RepoRef::new("acme", "widgets")
}

/// An engine over shared handles to its store and oracle.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub oracle: Arc<MockOracle>,
    pub triage: Triage,
}

impl Harness {
    /// No retries anywhere.
    pub fn new(oracle: MockOracle) -> Self {
        Self::with_retry(oracle, RetryPolicy::once())
    }

    /// The store sits behind a [`RetryingStore`] and the classifier uses the
    /// same policy, as in production.
    pub fn with_retry(oracle: MockOracle, policy: RetryPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(oracle);
        let inner: Arc<dyn RecordStore> = store.clone();
        let retrying: Arc<dyn RecordStore> = Arc::new(RetryingStore::new(inner, policy));
        let classifier = Classifier::new(oracle.clone(), policy);
        Self {
            store,
            triage: Triage::new(retrying, Arc::new(classifier)),
            oracle,
        }
    }

    pub fn seed(&self, number: u64, title: &str, body: &str, labels: &[&str]) {
        self.store.insert_issue(
            &repo(),
            Issue::new(number, title, body).with_labels(labels.iter().copied()),
        );
    }

    pub fn labels(&self, number: u64) -> Vec<String> {
        self.store.labels(&repo(), number)
    }

    /// Comments on the issue that carry the annotation signature.
    pub fn annotations(&self, number: u64) -> usize {
        self.store
            .comments(&repo(), number)
            .iter()
            .filter(|c| c.body.contains(ANNOTATION_SIGNATURE))
            .count()
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
