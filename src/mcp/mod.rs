//! MCP server for issue triage: exposes the triage engine, batch runs and
//! repository statistics via the Model Context Protocol.
//!
//! Tools: `triage_issue`, `batch_triage`, `get_repo_stats`.
//! Resource template: `triage://stats/{owner}/{repo}`.
//! Prompts: `triage_workflow`, `find_good_first_issue`.

pub mod params;

use params::*;
use crate::batch::BatchOptions;
use crate::config::TriageConfig;
use crate::rank::find_contributor_issues;
use crate::stats::{fetch_repo_stats, DEFAULT_STALE_AFTER_DAYS};
use crate::store::RepoRef;
use crate::triage::{Triage, TriageError, TriageResult};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, GetPromptRequestParam, GetPromptResult,
        ListPromptsResult, ListResourceTemplatesResult, PaginatedRequestParam, Prompt,
        PromptArgument, PromptMessage, PromptMessageRole, ReadResourceRequestParam,
        ReadResourceResult, ResourceContents, ResourceTemplate, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

/// URI prefix of the stats resource; followed by `{owner}/{repo}`.
pub const STATS_URI_PREFIX: &str = "triage://stats/";
/// Issues returned by contributor mode when no limit is given.
pub const DEFAULT_CONTRIBUTOR_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Err(McpError::internal_error(
            format!("failed to serialize result: {e}"),
            None,
        )),
    }
}

/// Tagged error body: `{"error": <kind>, "message": <text>}`.
pub fn error_payload(e: &TriageError) -> serde_json::Value {
    json!({
        "error": e.kind(),
        "message": e.to_string(),
    })
}

/// Controlled failures go back as-is; anything else is logged in full
/// first.
fn err_result(tool: &str, e: TriageError) -> Result<CallToolResult, McpError> {
    if !e.is_controlled() {
        error!(tool, error = ?e, "unexpected failure");
    }
    let text = serde_json::to_string_pretty(&error_payload(&e)).unwrap_or_else(|_| e.to_string());
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

fn respond<T: Serialize>(tool: &str, result: TriageResult<T>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => ok_json(&value),
        Err(e) => err_result(tool, e),
    }
}

/// Validate an owner/repo pair.
pub fn repo_ref(owner: &str, repo: &str) -> TriageResult<RepoRef> {
    let (owner, repo) = (owner.trim(), repo.trim());
    for (field, value) in [("owner", owner), ("repo", repo)] {
        if value.is_empty() {
            return Err(TriageError::InvalidInput(format!("{field} must not be empty")));
        }
        if value.contains('/') || value.chars().any(char::is_whitespace) {
            return Err(TriageError::InvalidInput(format!(
                "{field} '{value}' is not a valid GitHub name"
            )));
        }
    }
    Ok(RepoRef::new(owner, repo))
}

/// Map a failed stats read to the MCP error code a client can act on.
fn resource_error(uri: &str, e: TriageError) -> McpError {
    let data = Some(error_payload(&e));
    match e {
        TriageError::NotFound(_) => McpError::resource_not_found(e.to_string(), data),
        TriageError::InvalidInput(_) | TriageError::Auth { .. } | TriageError::OracleCredential(_) => {
            McpError::invalid_params(e.to_string(), data)
        }
        _ => {
            error!(uri, error = ?e, "unexpected failure reading resource");
            McpError::internal_error(e.to_string(), data)
        }
    }
}

fn resource_templates() -> Vec<ResourceTemplate> {
    serde_json::from_value(json!([{
        "uriTemplate": format!("{STATS_URI_PREFIX}{{owner}}/{{repo}}"),
        "name": "repo_stats",
        "description": "Label distribution, staleness and age statistics for a repository's open issues",
        "mimeType": "application/json",
    }]))
    .unwrap_or_default()
}

/// Parse `triage://stats/{owner}/{repo}`.
pub fn parse_stats_uri(uri: &str) -> TriageResult<RepoRef> {
    let rest = uri.strip_prefix(STATS_URI_PREFIX).ok_or_else(|| {
        TriageError::InvalidInput(format!("unknown resource '{uri}', expected {STATS_URI_PREFIX}{{owner}}/{{repo}}"))
    })?;
    match rest.trim_end_matches('/').split_once('/') {
        Some((owner, repo)) if !repo.contains('/') => repo_ref(owner, repo),
        _ => Err(TriageError::InvalidInput(format!(
            "resource '{uri}' must name exactly one owner and repository"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageMode {
    Maintainer,
    Contributor,
}

impl TriageMode {
    pub fn parse(mode: Option<&str>) -> TriageResult<Self> {
        match mode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("maintainer") => Ok(TriageMode::Maintainer),
            Some("contributor") => Ok(TriageMode::Contributor),
            Some(other) => Err(TriageError::InvalidInput(format!(
                "unknown mode '{other}', expected 'maintainer' or 'contributor'"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct ContributorPicks {
    repo: RepoRef,
    mode: &'static str,
    count: usize,
    issues: Vec<crate::rank::RankedIssue>,
}

fn prompt_arguments(args: serde_json::Value) -> Vec<PromptArgument> {
    serde_json::from_value(args).unwrap_or_default()
}

fn repo_arguments() -> Vec<PromptArgument> {
    prompt_arguments(json!([
        { "name": "owner", "description": "Repository owner", "required": true },
        { "name": "repo", "description": "Repository name", "required": true },
    ]))
}

fn prompt_catalog() -> Vec<Prompt> {
    vec![
        Prompt::new(
            "triage_workflow",
            Some("Walk a maintainer through triaging a repository's open issues"),
            Some(repo_arguments()),
        ),
        Prompt::new(
            "find_good_first_issue",
            Some("Help a new contributor pick an issue to work on"),
            Some(repo_arguments()),
        ),
    ]
}

fn prompt_text(name: &str, repo: &RepoRef) -> Option<String> {
    match name {
        "triage_workflow" => Some(format!(
            "You are helping maintain {repo}.\n\
             1. Call get_repo_stats for {owner}/{repo_name} to see how the open issues are labelled.\n\
             2. Call batch_triage with dry_run=true and review the proposed labels.\n\
             3. If they look right, call batch_triage again with dry_run=false.\n\
             4. For any issue that needs a closer look, call triage_issue in maintainer mode with its number; \
             this also posts a single analysis comment.\n\
             Summarise what changed and flag any P0 issues first.",
            owner = repo.owner,
            repo_name = repo.repo,
        )),
        "find_good_first_issue" => Some(format!(
            "I'd like to start contributing to {repo}.\n\
             Call triage_issue with mode=contributor for {owner}/{repo_name} and recommend two or three of the \
             returned issues. For each, explain the skill area, the expected complexity, and why it suits \
             a first contribution.",
            owner = repo.owner,
            repo_name = repo.repo,
        )),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TriageMcpServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct TriageMcpServer {
    triage: Triage,
    batch: BatchOptions,
    stale_after_days: i64,
    tool_router: ToolRouter<Self>,
}

/// Tool bodies, kept free of protocol types.
impl TriageMcpServer {
    pub async fn triage_issue_json(&self, p: TriageIssueParams) -> TriageResult<serde_json::Value> {
        let repo = repo_ref(&p.owner, &p.repo)?;
        match TriageMode::parse(p.mode.as_deref())? {
            TriageMode::Maintainer => {
                let number = match p.issue_number {
                    Some(0) => {
                        return Err(TriageError::InvalidInput(
                            "issue_number must be a positive integer".to_string(),
                        ))
                    }
                    Some(n) => n,
                    None => {
                        return Err(TriageError::InvalidInput(
                            "issue_number is required in maintainer mode".to_string(),
                        ))
                    }
                };
                let outcome = self.triage.triage_issue(&repo, number).await?;
                Ok(json!(outcome))
            }
            TriageMode::Contributor => {
                let limit = p.limit.unwrap_or(DEFAULT_CONTRIBUTOR_LIMIT).clamp(1, 100);
                let issues = find_contributor_issues(
                    self.triage.store(),
                    &repo,
                    p.labels.unwrap_or_default(),
                    limit,
                )
                .await?;
                Ok(json!(ContributorPicks {
                    repo,
                    mode: "contributor",
                    count: issues.len(),
                    issues,
                }))
            }
        }
    }

    pub async fn batch_triage_json(&self, p: BatchTriageParams) -> TriageResult<serde_json::Value> {
        let repo = repo_ref(&p.owner, &p.repo)?;
        let mut options = self.batch.clone().dry_run(p.dry_run.unwrap_or(false));
        if let Some(limit) = p.limit {
            options = options.with_limit(limit);
        }
        let summary = self.triage.batch_triage(&repo, &options).await?;
        Ok(json!({
            "summary": summary,
            "report": summary.report(),
        }))
    }

    pub async fn repo_stats_json(&self, p: RepoParams) -> TriageResult<serde_json::Value> {
        let repo = repo_ref(&p.owner, &p.repo)?;
        let stats = fetch_repo_stats(self.triage.store(), &repo, self.stale_after_days).await?;
        Ok(json!(stats))
    }

    /// Body of the `triage://stats/{owner}/{repo}` resource.
    pub async fn read_stats_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let repo = parse_stats_uri(uri).map_err(|e| McpError::resource_not_found(e.to_string(), None))?;
        let stats = fetch_repo_stats(self.triage.store(), &repo, self.stale_after_days)
            .await
            .map_err(|e| resource_error(uri, e.into()))?;
        let text = serde_json::to_string_pretty(&stats)
            .map_err(|e| McpError::internal_error(format!("failed to serialize stats: {e}"), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }
}

#[tool_router]
impl TriageMcpServer {
    pub fn new(triage: Triage) -> Self {
        Self {
            triage,
            batch: BatchOptions::default(),
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            tool_router: Self::tool_router(),
        }
    }

    pub fn with_batch_options(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_stale_after_days(mut self, days: i64) -> Self {
        self.stale_after_days = days;
        self
    }

    // ── Triage tools ────────────────────────────────────────────────────

    #[tool(
        description = "Maintainer mode: classify one issue (type, priority, complexity), sync its triage labels and post one analysis comment. Contributor mode: rank unassigned open issues for a newcomer"
    )]
    async fn triage_issue(
        &self,
        Parameters(p): Parameters<TriageIssueParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("triage_issue", self.triage_issue_json(p).await)
    }

    #[tool(
        description = "Classify and label up to 100 open issues in sequence, skipping those already labelled on every dimension. No comments are posted"
    )]
    async fn batch_triage(
        &self,
        Parameters(p): Parameters<BatchTriageParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("batch_triage", self.batch_triage_json(p).await)
    }

    // ── Stats tools ─────────────────────────────────────────────────────

    #[tool(description = "Label distribution, staleness and age statistics for a repository's open issues")]
    async fn get_repo_stats(
        &self,
        Parameters(p): Parameters<RepoParams>,
    ) -> Result<CallToolResult, McpError> {
        respond("get_repo_stats", self.repo_stats_json(p).await)
    }
}

#[tool_handler]
impl ServerHandler for TriageMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Issue triage for GitHub repositories: classify and label issues, batch-triage a repository, \
                 find good first issues, and read stats at triage://stats/{owner}/{repo}"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult::with_all_items(resource_templates()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.read_stats_resource(&request.uri).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        Ok(ListPromptsResult::with_all_items(prompt_catalog()))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        let arg = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let repo = repo_ref(&arg("owner"), &arg("repo"))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let text = prompt_text(&request.name, &repo).ok_or_else(|| {
            McpError::invalid_params(format!("unknown prompt '{}'", request.name), None)
        })?;
        Ok(GetPromptResult {
            description: None,
            messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
        })
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Serve the tools over stdio until the client disconnects. Returns the
/// process exit code.
pub async fn run_mcp_server(triage: Triage, config: &TriageConfig) -> i32 {
    let server = TriageMcpServer::new(triage)
        .with_batch_options(config.batch.clone())
        .with_stale_after_days(config.stale_after_days);

    info!("issue-triage mcp server starting on stdio");

    let service = match server.serve(rmcp::transport::stdio()).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to start MCP server: {}", e);
            return 1;
        }
    };

    if let Err(e) = service.waiting().await {
        error!("MCP server error: {}", e);
        return 1;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::oracle::{judgment_json, MockOracle};
    use crate::retry::RetryPolicy;
    use crate::store::{InjectedFailure, Issue, MemoryStore};
    use rmcp::model::ErrorCode;
    use std::sync::Arc;

    fn server(store: Arc<MemoryStore>, oracle: MockOracle) -> TriageMcpServer {
        let classifier = Classifier::new(Arc::new(oracle), RetryPolicy::once());
        TriageMcpServer::new(Triage::new(store, Arc::new(classifier)))
    }

    fn triage_params(issue_number: Option<u64>, mode: Option<&str>) -> TriageIssueParams {
        TriageIssueParams {
            owner: "acme".into(),
            repo: "widgets".into(),
            issue_number,
            mode: mode.map(String::from),
            labels: None,
            limit: None,
        }
    }

    #[test]
    fn stats_uri_parsing() {
        assert_eq!(
            parse_stats_uri("triage://stats/acme/widgets").unwrap(),
            RepoRef::new("acme", "widgets")
        );
        assert!(parse_stats_uri("triage://stats/acme").is_err());
        assert!(parse_stats_uri("triage://stats/acme/widgets/extra").is_err());
        assert!(parse_stats_uri("file:///etc/passwd").is_err());
    }

    #[test]
    fn mode_parsing_is_case_insensitive() {
        assert_eq!(TriageMode::parse(None).unwrap(), TriageMode::Maintainer);
        assert_eq!(TriageMode::parse(Some(" Contributor ")).unwrap(), TriageMode::Contributor);
        assert_eq!(TriageMode::parse(Some("admin")).unwrap_err().kind(), "invalid_input");
    }

    #[tokio::test]
    async fn maintainer_mode_requires_issue_number() {
        let oracle = MockOracle::replying(judgment_json("bug", "P2", "Low", "r"));
        let server = server(Arc::new(MemoryStore::new()), oracle);

        let err = server.triage_issue_json(triage_params(None, None)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(err.is_controlled());
        assert_eq!(error_payload(&err)["error"], "invalid_input");
    }

    #[tokio::test]
    async fn missing_issue_is_reported_as_not_found() {
        let oracle = MockOracle::replying(judgment_json("bug", "P2", "Low", "r"));
        let server = server(Arc::new(MemoryStore::new()), oracle);

        let err = server
            .triage_issue_json(triage_params(Some(404), Some("maintainer")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let result = server
            .triage_issue(Parameters(triage_params(Some(404), None)))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn contributor_mode_ranks_without_oracle() {
        let store = Arc::new(MemoryStore::new());
        let repo = RepoRef::new("acme", "widgets");
        store.insert_issue(&repo, Issue::new(1, "plain", ""));
        store.insert_issue(&repo, Issue::new(2, "starter", "").with_labels(["good first issue"]));
        let oracle = Arc::new(MockOracle::replying("unused"));
        let classifier = Classifier::new(oracle.clone(), RetryPolicy::once());
        let server = TriageMcpServer::new(Triage::new(store, Arc::new(classifier)));

        let value = server
            .triage_issue_json(triage_params(None, Some("contributor")))
            .await
            .unwrap();

        assert_eq!(value["count"], 2);
        assert_eq!(value["issues"][0]["number"], 2);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn batch_and_stats_tools_return_json() {
        let store = Arc::new(MemoryStore::new());
        let repo = RepoRef::new("acme", "widgets");
        store.insert_issue(&repo, Issue::new(1, "done", "").with_labels(["bug", "P1", "complexity-medium"]));
        let server = server(store, MockOracle::replying(judgment_json("bug", "P2", "Low", "r")));

        let batch = server
            .batch_triage_json(BatchTriageParams {
                owner: "acme".into(),
                repo: "widgets".into(),
                dry_run: Some(true),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(batch["summary"]["skipped"], 1);
        assert!(batch["report"].as_str().unwrap().contains("dry run"));

        let stats = server
            .repo_stats_json(RepoParams {
                owner: "acme".into(),
                repo: "widgets".into(),
            })
            .await
            .unwrap();
        assert_eq!(stats["total_open"], 1);
        assert_eq!(stats["by_type"]["bug"]["count"], 1);
    }

    #[test]
    fn prompts_render_for_known_names() {
        let repo = RepoRef::new("acme", "widgets");
        assert!(prompt_text("triage_workflow", &repo).unwrap().contains("batch_triage"));
        assert!(prompt_text("find_good_first_issue", &repo).unwrap().contains("mode=contributor"));
        assert!(prompt_text("nope", &repo).is_none());
        assert_eq!(prompt_catalog().len(), 2);
        assert_eq!(repo_arguments().len(), 2);
    }

    #[test]
    fn stats_template_is_advertised() {
        let templates = resource_templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].raw.uri_template, "triage://stats/{owner}/{repo}");
        assert_eq!(templates[0].raw.mime_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn stats_resource_reads_and_maps_failures() {
        let store = Arc::new(MemoryStore::new());
        let repo = RepoRef::new("acme", "widgets");
        store.insert_issue(&repo, Issue::new(1, "open", "").with_labels(["bug"]));
        let server = server(store.clone(), MockOracle::default());

        let read = server.read_stats_resource("triage://stats/acme/widgets").await.unwrap();
        assert_eq!(read.contents.len(), 1);

        let err = server.read_stats_resource("triage://stats/acme").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND);

        store.fail_next(1, InjectedFailure::NotFound);
        let err = server.read_stats_resource("triage://stats/acme/gone").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND);
        assert_eq!(err.data.unwrap()["error"], "not_found");

        store.fail_next(1, InjectedFailure::Unauthorized);
        let err = server.read_stats_resource("triage://stats/acme/widgets").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["error"], "auth_failed");

        store.fail_next(1, InjectedFailure::ServerError);
        let err = server.read_stats_resource("triage://stats/acme/widgets").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }
}
