//! Batch triage over a repository's open issues.
//!
//! One bounded page is fetched, then issues are processed strictly in
//! sequence with a fixed pause between oracle calls. A failing issue is
//! counted and skipped over; only the initial fetch can fail the batch.
//! Batch mode never posts comments, and there is no rollback.

use crate::classify::Classification;
use crate::reconcile::{apply_delta, reconcile};
use crate::stats::{loose_complexity, loose_priority, loose_type};
use crate::store::{Issue, IssueQuery, RepoRef};
use crate::triage::{Triage, TriageError, TriageResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Largest page the store hands back.
pub const MAX_BATCH_LIMIT: usize = 100;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Knobs for one batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Classify and count, but leave labels untouched
    pub dry_run: bool,
    /// Issues fetched, clamped to `1..=MAX_BATCH_LIMIT`
    pub limit: usize,
    /// Pause between consecutive oracle calls
    pub delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            limit: MAX_BATCH_LIMIT,
            delay: DEFAULT_BATCH_DELAY,
        }
    }
}

impl BatchOptions {
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_BATCH_LIMIT);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// How one issue fared.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Triaged {
        classification: Classification,
        labels: Vec<String>,
        /// False in a dry run
        applied: bool,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub number: u64,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl BatchItem {
    /// One-line human summary.
    pub fn line(&self) -> String {
        match &self.outcome {
            ItemOutcome::Triaged {
                labels, applied, ..
            } => {
                let verb = if *applied { "labelled" } else { "would label" };
                format!("#{} {}: {} {}", self.number, self.title, verb, labels.join(", "))
            }
            ItemOutcome::Skipped { reason } => {
                format!("#{} {}: skipped ({})", self.number, self.title, reason)
            }
            ItemOutcome::Failed { error } => {
                format!("#{} {}: failed ({})", self.number, self.title, error)
            }
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub repo: RepoRef,
    pub dry_run: bool,
    pub total: usize,
    pub triaged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_complexity: BTreeMap<String, usize>,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    fn new(repo: &RepoRef, dry_run: bool, total: usize) -> Self {
        Self {
            repo: repo.clone(),
            dry_run,
            total,
            triaged: 0,
            skipped: 0,
            failed: 0,
            by_type: BTreeMap::new(),
            by_priority: BTreeMap::new(),
            by_complexity: BTreeMap::new(),
            items: Vec::with_capacity(total),
        }
    }

    fn count(&mut self, c: &Classification) {
        *self.by_type.entry(c.issue_type.to_string()).or_default() += 1;
        *self.by_priority.entry(c.priority.to_string()).or_default() += 1;
        *self.by_complexity.entry(c.complexity.to_string()).or_default() += 1;
    }

    /// Multi-line report: headline counts, histograms, then one line per issue.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Batch triage of {}{}: {} issues, {} triaged, {} skipped, {} failed\n",
            self.repo,
            if self.dry_run { " (dry run)" } else { "" },
            self.total,
            self.triaged,
            self.skipped,
            self.failed
        );
        for (name, hist) in [
            ("type", &self.by_type),
            ("priority", &self.by_priority),
            ("complexity", &self.by_complexity),
        ] {
            if hist.is_empty() {
                continue;
            }
            let parts: Vec<String> = hist.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            out.push_str(&format!("  by {name}: {}\n", parts.join(", ")));
        }
        for item in &self.items {
            out.push_str(&format!("  {}\n", item.line()));
        }
        out
    }
}

/// The skip rule: an issue already labelled on all three dimensions, by
/// loose match, is left alone.
///
/// This is looser than the reconciler's `type-`/`priority-`/`complexity-`
/// convention, so `bug` + `P1` + `complexity-medium` counts as triaged.
pub fn already_triaged(issue: &Issue) -> bool {
    let labels = issue.lowercase_labels();
    let has_type = loose_type(&labels).is_some() || labels.iter().any(|l| l.contains("type-"));
    let has_priority =
        loose_priority(&labels).is_some() || labels.iter().any(|l| l.contains("priority"));
    let has_complexity = loose_complexity(&labels).is_some();
    has_type && has_priority && has_complexity
}

impl Triage {
    /// Triage up to `options.limit` open issues in sequence.
    #[instrument(skip(self, repo), fields(repo = %repo, dry_run = options.dry_run, limit = options.limit))]
    pub async fn batch_triage(
        &self,
        repo: &RepoRef,
        options: &BatchOptions,
    ) -> TriageResult<BatchSummary> {
        let limit = options.limit.clamp(1, MAX_BATCH_LIMIT);
        let issues = self
            .store()
            .search_issues(repo, &IssueQuery::new().with_limit(limit))
            .await?;

        let mut summary = BatchSummary::new(repo, options.dry_run, issues.len());
        let mut oracle_called = false;

        for issue in issues {
            if already_triaged(&issue) {
                summary.skipped += 1;
                summary.items.push(BatchItem {
                    number: issue.number,
                    title: issue.title,
                    outcome: ItemOutcome::Skipped {
                        reason: "already labelled on every dimension".to_string(),
                    },
                });
                continue;
            }

            if oracle_called && !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
            oracle_called = true;

            let outcome = match self.triage_one(repo, &issue, options.dry_run, &mut summary).await {
                Ok(outcome) => {
                    summary.triaged += 1;
                    outcome
                }
                Err(e) => {
                    warn!(number = issue.number, error = %e, "batch item failed");
                    summary.failed += 1;
                    ItemOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summary.items.push(BatchItem {
                number: issue.number,
                title: issue.title,
                outcome,
            });
        }

        info!(
            total = summary.total,
            triaged = summary.triaged,
            skipped = summary.skipped,
            failed = summary.failed,
            "batch finished"
        );
        Ok(summary)
    }

    async fn triage_one(
        &self,
        repo: &RepoRef,
        issue: &Issue,
        dry_run: bool,
        summary: &mut BatchSummary,
    ) -> Result<ItemOutcome, TriageError> {
        let classification = self.classifier().classify(&issue.title, &issue.body).await?;
        // counted once classified, whether or not the labels land
        summary.count(&classification);

        let delta = reconcile(&issue.labels, &classification);
        if !dry_run {
            apply_delta(self.store(), repo, issue.number, &delta).await?;
        }
        Ok(ItemOutcome::Triaged {
            classification,
            labels: delta.to_add,
            applied: !dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(labels: &[&str]) -> Issue {
        Issue::new(1, "t", "").with_labels(labels.iter().copied())
    }

    #[test]
    fn skip_rule_accepts_loose_labels() {
        assert!(already_triaged(&issue(&["bug", "P1", "complexity-medium"])));
        assert!(already_triaged(&issue(&[
            "type-feature",
            "priority-p2",
            "complexity-high"
        ])));
        assert!(already_triaged(&issue(&["enhancement", "critical", "good first issue"])));
    }

    #[test]
    fn skip_rule_needs_every_dimension() {
        assert!(!already_triaged(&issue(&[])));
        assert!(!already_triaged(&issue(&["bug", "P1"])));
        assert!(!already_triaged(&issue(&["bug", "complexity-low"])));
        assert!(!already_triaged(&issue(&["P1", "complexity-low"])));
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(BatchOptions::default().with_limit(0).limit, 1);
        assert_eq!(BatchOptions::default().with_limit(500).limit, MAX_BATCH_LIMIT);
        assert_eq!(BatchOptions::default().with_limit(25).limit, 25);
    }

    #[test]
    fn report_lists_every_item() {
        let mut summary = BatchSummary::new(&RepoRef::new("acme", "widgets"), true, 2);
        summary.skipped = 1;
        summary.failed = 1;
        summary.items.push(BatchItem {
            number: 1,
            title: "a".into(),
            outcome: ItemOutcome::Skipped {
                reason: "done".into(),
            },
        });
        summary.items.push(BatchItem {
            number: 2,
            title: "b".into(),
            outcome: ItemOutcome::Failed {
                error: "boom".into(),
            },
        });

        let report = summary.report();
        assert!(report.contains("(dry run)"));
        assert!(report.contains("#1 a: skipped (done)"));
        assert!(report.contains("#2 b: failed (boom)"));
    }
}
