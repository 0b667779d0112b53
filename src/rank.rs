//! Contributor-facing ranking of unclaimed issues.
//!
//! Scores come from existing labels and comment activity only; the oracle is
//! never consulted. Assigned issues are dropped before scoring, and ties keep
//! their fetch order.

use crate::store::{Issue, IssueQuery, RecordStore, RepoRef, StoreResult};
use serde::Serialize;

const BASE_SCORE: i64 = 100;
const COMMENT_PENALTY: i64 = 5;
const MAX_COMMENT_PENALTY: i64 = 30;

/// (label needles, bonus, reason). A rule applies at most once per issue.
const LABEL_BONUSES: &[(&[&str], i64, &str)] = &[
    (&["good first issue"], 50, "marked as a good first issue"),
    (&["help wanted"], 30, "maintainers asked for help"),
    (&["easy", "beginner"], 40, "labelled beginner-friendly"),
    (&["documentation"], 20, "documentation work"),
];

/// An issue with its contributor-facing score.
#[derive(Debug, Clone, Serialize)]
pub struct RankedIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub score: i64,
    pub complexity: &'static str,
    pub skill_area: &'static str,
    pub labels: Vec<String>,
    pub comments: u64,
    pub reasons: Vec<String>,
}

/// Labels lowercased with separators read as spaces, so `good-first-issue`
/// and `good first issue` match alike.
fn normalized_labels(issue: &Issue) -> Vec<String> {
    issue
        .labels
        .iter()
        .map(|l| l.to_lowercase().replace(['-', '_', ':', '/'], " "))
        .collect()
}

fn has_any(labels: &[String], needles: &[&str]) -> bool {
    labels.iter().any(|l| needles.iter().any(|n| l.contains(n)))
}

/// Whole-word match, for needles too short to use as substrings.
fn has_word(labels: &[String], words: &[&str]) -> bool {
    labels
        .iter()
        .any(|l| l.split_whitespace().any(|w| words.contains(&w)))
}

/// Score one issue, with a human-readable reason per adjustment.
pub fn score_issue(issue: &Issue) -> (i64, Vec<String>) {
    let labels = normalized_labels(issue);
    let mut score = BASE_SCORE;
    let mut reasons = Vec::new();

    let penalty = i64::try_from(issue.comments)
        .unwrap_or(i64::MAX)
        .saturating_mul(COMMENT_PENALTY)
        .min(MAX_COMMENT_PENALTY);
    if penalty > 0 {
        score -= penalty;
        reasons.push(format!("{} comments of prior discussion", issue.comments));
    }

    for (needles, bonus, reason) in LABEL_BONUSES {
        if has_any(&labels, needles) {
            score += bonus;
            reasons.push((*reason).to_string());
        }
    }

    (score, reasons)
}

/// Complexity estimate from labels; "Medium" when nothing matches.
pub fn estimate_complexity(issue: &Issue) -> &'static str {
    let labels = normalized_labels(issue);
    if has_any(&labels, &["complexity low", "good first issue", "easy", "beginner", "trivial"]) {
        "Low"
    } else if has_any(&labels, &["complexity medium"]) {
        "Medium"
    } else if has_any(&labels, &["complexity high", "hard", "difficult"]) {
        "High"
    } else {
        "Medium"
    }
}

/// Skill area from labels; "general" when nothing matches.
pub fn skill_area(issue: &Issue) -> &'static str {
    let labels = normalized_labels(issue);
    let areas: [(&'static str, &[&str]); 5] = [
        ("documentation", &["documentation", "docs", "doc"]),
        ("testing", &["test", "tests", "testing", "ci"]),
        ("frontend", &["frontend", "ui", "ux", "css"]),
        ("backend", &["backend", "api", "server", "database", "db"]),
        ("performance", &["performance", "perf"]),
    ];
    areas
        .into_iter()
        .find(|(_, words)| has_word(&labels, words))
        .map(|(area, _)| area)
        .unwrap_or("general")
}

/// Rank unassigned issues, highest score first, ties in input order.
pub fn rank(issues: Vec<Issue>) -> Vec<RankedIssue> {
    let mut ranked: Vec<RankedIssue> = issues
        .into_iter()
        .filter(|i| !i.is_assigned())
        .map(|issue| {
            let (score, reasons) = score_issue(&issue);
            RankedIssue {
                complexity: estimate_complexity(&issue),
                skill_area: skill_area(&issue),
                number: issue.number,
                title: issue.title,
                html_url: issue.html_url,
                score,
                labels: issue.labels,
                comments: issue.comments,
                reasons,
            }
        })
        .collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked
}

/// Fetch open issues (optionally filtered by labels) and return the top
/// `limit` for a new contributor.
pub async fn find_contributor_issues(
    store: &dyn RecordStore,
    repo: &RepoRef,
    labels: Vec<String>,
    limit: usize,
) -> StoreResult<Vec<RankedIssue>> {
    let issues = store
        .search_issues(repo, &IssueQuery::new().with_labels(labels))
        .await?;
    let mut ranked = rank(issues);
    ranked.truncate(limit);
    Ok(ranked)
}
