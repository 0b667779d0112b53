//! GitHub REST v3 record store.
//!
//! Response shapes are modelled as private DTOs and converted into the
//! engine's [`Issue`]/[`Comment`] types at this boundary. Status handling:
//! 404 → `NotFound`, 401 → `Auth`, 403/429 with a rate-limit signature →
//! `RateLimited`, any other 403 → `Auth`.

use super::{Comment, Issue, IssueQuery, RecordStore, RepoRef, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client as HttpClient, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

/// Connection settings for [`GitHubStore`].
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Personal access or app token. Reads work without one on public repos.
    pub token: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_GITHUB_API.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    assignee: Option<GitHubUser>,
    #[serde(default)]
    assignees: Vec<GitHubUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
    /// Present when the "issue" is actually a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for Issue {
    fn from(gh: GitHubIssue) -> Self {
        let assignee = gh
            .assignee
            .or_else(|| gh.assignees.into_iter().next())
            .map(|u| u.login);
        Issue {
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            comments: gh.comments,
            assignee,
            created_at: gh.created_at,
            updated_at: gh.updated_at,
            html_url: gh.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GitHubUser>,
}

impl From<GitHubComment> for Comment {
    fn from(gh: GitHubComment) -> Self {
        Comment {
            id: gh.id,
            body: gh.body.unwrap_or_default(),
            author: gh.user.map(|u| u.login),
        }
    }
}

/// Record store backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubStore {
    http_client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig) -> StoreResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("issue-triage/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// Build an API URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn issue_url(&self, repo: &RepoRef, number: u64, tail: &[&str]) -> StoreResult<Url> {
        let number = number.to_string();
        let mut segments = vec!["repos", repo.owner.as_str(), repo.repo.as_str(), "issues", number.as_str()];
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .http_client
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Map a non-success response to a [`StoreError`].
    async fn check(response: Response, what: &str) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited_header = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);
        let retry_after = response.headers().contains_key(header::RETRY_AFTER);

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<GitHubError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);

        Err(classify_status(
            status,
            message,
            what,
            rate_limited_header || retry_after,
        ))
    }
}

/// Whether the `Link` header advertises a next page; `None` without a header.
fn next_page_linked(response: &Response) -> Option<bool> {
    let link = response.headers().get(header::LINK)?.to_str().ok()?;
    Some(link.split(',').any(|part| part.contains("rel=\"next\"")))
}

fn classify_status(status: StatusCode, message: String, what: &str, limit_headers: bool) -> StoreError {
    let mentions_limit = message.to_lowercase().contains("rate limit");
    match status.as_u16() {
        404 => StoreError::NotFound(what.to_string()),
        401 => StoreError::Auth {
            status: 401,
            message,
        },
        429 => StoreError::RateLimited(message),
        403 if limit_headers || mentions_limit => StoreError::RateLimited(message),
        403 => StoreError::Auth {
            status: 403,
            message,
        },
        code => StoreError::Api {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl RecordStore for GitHubStore {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn get_issue(&self, repo: &RepoRef, number: u64) -> StoreResult<Issue> {
        let url = self.issue_url(repo, number, &[])?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check(response, &format!("issue {}#{}", repo, number)).await?;
        let issue: GitHubIssue = response.json().await?;
        debug!(labels = issue.labels.len(), "fetched issue");
        Ok(issue.into())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn list_comments(&self, repo: &RepoRef, number: u64) -> StoreResult<Vec<Comment>> {
        let what = format!("issue {}#{}", repo, number);
        let mut comments = Vec::new();

        // Read until a short page or a Link header without rel="next".
        for page in 1u32.. {
            let url = self.issue_url(repo, number, &["comments"])?;
            let response = self
                .request(Method::GET, url)
                .query(&[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())])
                .send()
                .await?;
            let response = Self::check(response, &what).await?;
            let has_next = next_page_linked(&response);
            let batch: Vec<GitHubComment> = response.json().await?;
            let last_page = batch.len() < PAGE_SIZE || has_next == Some(false);
            comments.extend(batch.into_iter().map(Comment::from));
            if last_page {
                debug!(pages = page, "reached last comment page");
                break;
            }
        }

        debug!(count = comments.len(), "listed comments");
        Ok(comments)
    }

    #[instrument(skip(self, repo, labels), fields(repo = %repo, labels = ?labels))]
    async fn add_labels(&self, repo: &RepoRef, number: u64, labels: &[String]) -> StoreResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.issue_url(repo, number, &["labels"])?;
        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await?;
        Self::check(response, &format!("issue {}#{}", repo, number)).await?;
        info!("added {} labels to {}#{}", labels.len(), repo, number);
        Ok(())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn remove_label(&self, repo: &RepoRef, number: u64, label: &str) -> StoreResult<()> {
        let url = self.issue_url(repo, number, &["labels", label])?;
        let response = self.request(Method::DELETE, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            // Label already absent
            debug!("label '{}' not on {}#{}", label, repo, number);
            return Ok(());
        }
        Self::check(response, &format!("issue {}#{}", repo, number)).await?;
        debug!("removed label '{}' from {}#{}", label, repo, number);
        Ok(())
    }

    #[instrument(skip(self, repo, body), fields(repo = %repo, body_len = body.len()))]
    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str) -> StoreResult<Comment> {
        let url = self.issue_url(repo, number, &["comments"])?;
        let response = self
            .request(Method::POST, url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        let response = Self::check(response, &format!("issue {}#{}", repo, number)).await?;
        let comment: GitHubComment = response.json().await?;
        info!("posted comment {} on {}#{}", comment.id, repo, number);
        Ok(comment.into())
    }

    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn search_issues(&self, repo: &RepoRef, query: &IssueQuery) -> StoreResult<Vec<Issue>> {
        let limit = query.limit.clamp(1, PAGE_SIZE);
        let url = self.url(&["repos", repo.owner.as_str(), repo.repo.as_str(), "issues"])?;

        let mut params = vec![
            ("state", "open".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
            ("per_page", limit.to_string()),
        ];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }

        let response = self.request(Method::GET, url).query(&params).send().await?;
        let response = Self::check(response, &format!("repository {}", repo)).await?;
        let raw: Vec<GitHubIssue> = response.json().await?;

        let issues: Vec<Issue> = raw
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .take(limit)
            .map(Issue::from)
            .collect();
        debug!(count = issues.len(), "listed open issues");
        Ok(issues)
    }
}
