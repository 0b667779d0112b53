//! Repository health from the existing label taxonomy.
//!
//! Matching here is deliberately loose: organically applied labels such as
//! `bug`, `P1` or `critical` count alongside the `type-`/`priority-`/
//! `complexity-` labels the reconciler manages. The batch skip rule uses the
//! same loose matchers.

use crate::store::{Issue, IssueQuery, RecordStore, RepoRef, StoreResult};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Issues not updated for this many days count as stale, unless configured
/// otherwise.
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 30;
/// Accepted staleness thresholds, in days.
pub const STALE_AFTER_DAYS_RANGE: std::ops::RangeInclusive<i64> = 1..=36_500;
/// Bucket for issues with no match on a dimension.
pub const UNCLASSIFIED: &str = "unclassified";

/// Loose type lookup over lowercased labels.
pub fn loose_type(labels: &[String]) -> Option<&'static str> {
    ["bug", "feature", "enhancement", "question"]
        .into_iter()
        .find(|kind| labels.iter().any(|l| l.contains(kind)))
}

/// Loose priority lookup over lowercased labels, most urgent first.
pub fn loose_priority(labels: &[String]) -> Option<&'static str> {
    let tiers: [(&'static str, &[&str]); 4] = [
        ("P0", &["p0", "critical"]),
        ("P1", &["p1", "priority-high", "high priority"]),
        ("P2", &["p2", "priority-medium", "medium priority"]),
        ("P3", &["p3", "priority-low", "low priority"]),
    ];
    tiers.into_iter().find_map(|(tier, needles)| {
        labels
            .iter()
            .any(|l| needles.iter().any(|n| l.contains(n)))
            .then_some(tier)
    })
}

/// Loose complexity lookup over lowercased labels.
pub fn loose_complexity(labels: &[String]) -> Option<&'static str> {
    let tiers: [(&'static str, &[&str]); 3] = [
        ("Low", &["complexity-low", "easy", "good first issue", "beginner"]),
        ("Medium", &["complexity-medium"]),
        ("High", &["complexity-high", "hard", "complex feature"]),
    ];
    tiers.into_iter().find_map(|(tier, needles)| {
        labels
            .iter()
            .any(|l| needles.iter().any(|n| l.contains(n)))
            .then_some(tier)
    })
}

/// A count and its share of the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Share {
    pub count: usize,
    /// Percentage of all issues, rounded to one decimal
    pub percent: f64,
}

/// Point-in-time label statistics for a repository's open issues.
#[derive(Debug, Clone, Serialize)]
pub struct RepoStats {
    pub repo: RepoRef,
    pub generated_at: DateTime<Utc>,
    pub total_open: usize,
    pub by_type: BTreeMap<String, Share>,
    pub by_priority: BTreeMap<String, Share>,
    pub by_complexity: BTreeMap<String, Share>,
    pub stale: usize,
    pub stale_after_days: i64,
    pub average_age_days: f64,
    pub unassigned: usize,
    pub good_first_issues: usize,
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

fn shares(counts: BTreeMap<String, usize>, total: usize) -> BTreeMap<String, Share> {
    counts
        .into_iter()
        .map(|(k, count)| {
            (
                k,
                Share {
                    count,
                    percent: percent(count, total),
                },
            )
        })
        .collect()
}

/// Aggregate `issues` as of `now`. Pure.
pub fn compute_stats(
    repo: &RepoRef,
    issues: &[Issue],
    now: DateTime<Utc>,
    stale_after_days: i64,
) -> RepoStats {
    let total = issues.len();
    // Outside the accepted range nothing counts as stale.
    let stale_cutoff = STALE_AFTER_DAYS_RANGE
        .contains(&stale_after_days)
        .then(|| Duration::try_days(stale_after_days))
        .flatten()
        .and_then(|days| now.checked_sub_signed(days));

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_priority: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_complexity: BTreeMap<String, usize> = BTreeMap::new();
    let mut stale = 0;
    let mut unassigned = 0;
    let mut good_first_issues = 0;
    let mut age_days_sum = 0.0;

    for issue in issues {
        let labels = issue.lowercase_labels();

        *by_type
            .entry(loose_type(&labels).unwrap_or(UNCLASSIFIED).to_string())
            .or_default() += 1;
        *by_priority
            .entry(loose_priority(&labels).unwrap_or(UNCLASSIFIED).to_string())
            .or_default() += 1;
        *by_complexity
            .entry(loose_complexity(&labels).unwrap_or(UNCLASSIFIED).to_string())
            .or_default() += 1;

        if stale_cutoff.is_some_and(|cutoff| issue.updated_at < cutoff) {
            stale += 1;
        }
        if !issue.is_assigned() {
            unassigned += 1;
        }
        if labels.iter().any(|l| l.contains("good first issue")) {
            good_first_issues += 1;
        }
        age_days_sum += (now - issue.created_at).num_seconds().max(0) as f64 / 86_400.0;
    }

    let average_age_days = if total == 0 {
        0.0
    } else {
        (age_days_sum / total as f64 * 10.0).round() / 10.0
    };

    RepoStats {
        repo: repo.clone(),
        generated_at: now,
        total_open: total,
        by_type: shares(by_type, total),
        by_priority: shares(by_priority, total),
        by_complexity: shares(by_complexity, total),
        stale,
        stale_after_days,
        average_age_days,
        unassigned,
        good_first_issues,
    }
}

/// Fetch up to one page of open issues and aggregate them.
pub async fn fetch_repo_stats(
    store: &dyn RecordStore,
    repo: &RepoRef,
    stale_after_days: i64,
) -> StoreResult<RepoStats> {
    let issues = store.search_issues(repo, &IssueQuery::default()).await?;
    Ok(compute_stats(repo, &issues, Utc::now(), stale_after_days))
}
