//! MCP tool parameter structs with schemars-derived JSON schemas.

use schemars::JsonSchema;
use serde::Deserialize;

// ── Triage params ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TriageIssueParams {
    #[schemars(description = "Repository owner (user or organization)")]
    pub owner: String,
    #[schemars(description = "Repository name")]
    pub repo: String,
    #[schemars(description = "Issue number; required in maintainer mode")]
    pub issue_number: Option<u64>,
    #[schemars(
        description = "'maintainer' (default) classifies and labels one issue; 'contributor' ranks open issues for a newcomer"
    )]
    pub mode: Option<String>,
    #[schemars(description = "Contributor mode: only issues carrying all of these labels")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "Contributor mode: number of issues returned (default 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchTriageParams {
    #[schemars(description = "Repository owner (user or organization)")]
    pub owner: String,
    #[schemars(description = "Repository name")]
    pub repo: String,
    #[schemars(description = "Classify and report without changing any labels")]
    pub dry_run: Option<bool>,
    #[schemars(description = "Maximum number of open issues to process (1-100)")]
    pub limit: Option<usize>,
}

// ── Stats params ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RepoParams {
    #[schemars(description = "Repository owner (user or organization)")]
    pub owner: String,
    #[schemars(description = "Repository name")]
    pub repo: String,
}
