//! In-memory record store.
//!
//! Holds issues and comments in process, with GitHub's semantics for the
//! operations the engine relies on: idempotent label add/remove, case-insensitive
//! label filters, most-recently-updated-first listing. Failures can be queued
//! with [`MemoryStore::fail_next`] to exercise retry and error paths.

use super::{Comment, Issue, IssueQuery, RecordStore, RepoRef, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A failure the memory store returns instead of performing the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    ServerError,
}

impl InjectedFailure {
    fn into_error(self, what: &str) -> StoreError {
        match self {
            Self::NotFound => StoreError::NotFound(what.to_string()),
            Self::Unauthorized => StoreError::Auth {
                status: 401,
                message: "Bad credentials".to_string(),
            },
            Self::Forbidden => StoreError::Auth {
                status: 403,
                message: "Resource not accessible by integration".to_string(),
            },
            Self::RateLimited => {
                StoreError::RateLimited("API rate limit exceeded".to_string())
            }
            Self::ServerError => StoreError::Api {
                status: 502,
                message: "Bad Gateway".to_string(),
            },
        }
    }
}

#[derive(Default)]
struct MemoryState {
    /// Issues per repository in insertion order
    issues: HashMap<RepoRef, Vec<Issue>>,
    comments: HashMap<(RepoRef, u64), Vec<Comment>>,
    next_comment_id: u64,
    failures: VecDeque<InjectedFailure>,
    /// Failures bound to a single issue number, returned on every call for it
    issue_failures: HashMap<(RepoRef, u64), InjectedFailure>,
    calls: Vec<String>,
}

impl MemoryState {
    fn issue_mut(&mut self, repo: &RepoRef, number: u64) -> StoreResult<&mut Issue> {
        self.issues
            .get_mut(repo)
            .and_then(|issues| issues.iter_mut().find(|i| i.number == number))
            .ok_or_else(|| StoreError::NotFound(format!("{}#{}", repo, number)))
    }

    /// Record the call and return any failure queued for it.
    fn enter(&mut self, call: &str, repo: &RepoRef, number: Option<u64>) -> StoreResult<()> {
        self.calls.push(call.to_string());
        let what = match number {
            Some(n) => format!("{}#{}", repo, n),
            None => repo.to_string(),
        };
        if let Some(failure) = self.failures.pop_front() {
            return Err(failure.into_error(&what));
        }
        if let Some(n) = number {
            if let Some(failure) = self.issue_failures.get(&(repo.clone(), n)) {
                return Err(failure.into_error(&what));
            }
        }
        Ok(())
    }
}

/// Record store backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an issue.
    pub fn insert_issue(&self, repo: &RepoRef, issue: Issue) {
        let mut state = self.state.lock().unwrap();
        let issues = state.issues.entry(repo.clone()).or_default();
        match issues.iter_mut().find(|i| i.number == issue.number) {
            Some(existing) => *existing = issue,
            None => issues.push(issue),
        }
    }

    /// Seed a comment without counting it as a call.
    pub fn insert_comment(&self, repo: &RepoRef, number: u64, body: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.next_comment_id += 1;
        let id = state.next_comment_id;
        state
            .comments
            .entry((repo.clone(), number))
            .or_default()
            .push(Comment {
                id,
                body: body.into(),
                author: Some("someone".to_string()),
            });
        if let Ok(issue) = state.issue_mut(repo, number) {
            issue.comments += 1;
        }
    }

    /// Fail the next `count` calls, whatever they are.
    pub fn fail_next(&self, count: usize, failure: InjectedFailure) {
        let mut state = self.state.lock().unwrap();
        state.failures.extend(std::iter::repeat(failure).take(count));
    }

    /// Fail every call that targets this issue.
    pub fn fail_issue(&self, repo: &RepoRef, number: u64, failure: InjectedFailure) {
        let mut state = self.state.lock().unwrap();
        state.issue_failures.insert((repo.clone(), number), failure);
    }

    pub fn pending_failures(&self) -> usize {
        self.state.lock().unwrap().failures.len()
    }

    /// Current labels on an issue.
    pub fn labels(&self, repo: &RepoRef, number: u64) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state
            .issue_mut(repo, number)
            .map(|i| i.labels.clone())
            .unwrap_or_default()
    }

    /// Current comments on an issue.
    pub fn comments(&self, repo: &RepoRef, number: u64) -> Vec<Comment> {
        let state = self.state.lock().unwrap();
        state
            .comments
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default()
    }

    /// Names of the trait methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> StoreResult<Issue> {
        let mut state = self.state.lock().unwrap();
        state.enter("get_issue", repo, Some(number))?;
        state.issue_mut(repo, number).map(|i| i.clone())
    }

    async fn list_comments(&self, repo: &RepoRef, number: u64) -> StoreResult<Vec<Comment>> {
        let mut state = self.state.lock().unwrap();
        state.enter("list_comments", repo, Some(number))?;
        state.issue_mut(repo, number)?;
        Ok(state
            .comments
            .get(&(repo.clone(), number))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_labels(&self, repo: &RepoRef, number: u64, labels: &[String]) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter("add_labels", repo, Some(number))?;
        let issue = state.issue_mut(repo, number)?;
        for label in labels {
            if !issue.labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                issue.labels.push(label.clone());
            }
        }
        issue.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enter("remove_label", repo, Some(number))?;
        let issue = state.issue_mut(repo, number)?;
        issue.labels.retain(|l| !l.eq_ignore_ascii_case(label));
        Ok(())
    }

    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str) -> StoreResult<Comment> {
        let mut state = self.state.lock().unwrap();
        state.enter("create_comment", repo, Some(number))?;
        state.issue_mut(repo, number)?.comments += 1;
        state.next_comment_id += 1;
        let comment = Comment {
            id: state.next_comment_id,
            body: body.to_string(),
            author: Some("issue-triage[bot]".to_string()),
        };
        state
            .comments
            .entry((repo.clone(), number))
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    async fn search_issues(&self, repo: &RepoRef, query: &IssueQuery) -> StoreResult<Vec<Issue>> {
        let mut state = self.state.lock().unwrap();
        state.enter("search_issues", repo, None)?;
        let mut found: Vec<Issue> = state
            .issues
            .get(repo)
            .map(|issues| {
                issues
                    .iter()
                    .filter(|issue| {
                        query.labels.iter().all(|wanted| {
                            issue.labels.iter().any(|l| l.eq_ignore_ascii_case(wanted))
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        // stable: equal timestamps keep insertion order
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found.truncate(query.limit.min(100));
        Ok(found)
    }
}
