//! Label reconciliation: converge an issue's triage labels on a classification.
//!
//! Triage labels follow the `type-`/`priority-`/`complexity-` naming
//! convention. Reconciliation is a full replace of those labels: every
//! convention label currently on the issue is removed, whatever its value,
//! and the three canonical labels are added. Organic labels are never touched.

use crate::classify::Classification;
use crate::store::{RecordStore, RepoRef, StoreResult};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

static TRIAGE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(type|priority|complexity)-").expect("triage label pattern is valid"));

/// Does `label` follow the triage naming convention?
pub fn is_triage_label(label: &str) -> bool {
    TRIAGE_LABEL_RE.is_match(label)
}

/// Labels to remove and labels to add, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelDelta {
    pub to_remove: Vec<String>,
    pub to_add: Vec<String>,
}

impl LabelDelta {
    /// The label set that results from applying this delta to `current`.
    pub fn apply_to(&self, current: &[String]) -> Vec<String> {
        let mut result: Vec<String> = current
            .iter()
            .filter(|l| !self.to_remove.contains(*l))
            .cloned()
            .collect();
        for label in &self.to_add {
            if !result.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                result.push(label.clone());
            }
        }
        result
    }
}

/// Compute the delta that moves `current` onto `classification`.
pub fn reconcile(current: &[String], classification: &Classification) -> LabelDelta {
    let to_remove: Vec<String> = current
        .iter()
        .filter(|l| is_triage_label(l))
        .cloned()
        .collect();

    let mut to_add: Vec<String> = Vec::with_capacity(3);
    for label in classification.labels() {
        if !to_add.iter().any(|l| l.eq_ignore_ascii_case(&label)) {
            to_add.push(label);
        }
    }

    LabelDelta { to_remove, to_add }
}

/// Apply a delta to an issue: removals first, then one add call.
///
/// Between the two steps another reader can see the issue without triage
/// labels; the store offers no transaction to close that window.
pub async fn apply_delta(
    store: &dyn RecordStore,
    repo: &RepoRef,
    number: u64,
    delta: &LabelDelta,
) -> StoreResult<()> {
    for label in &delta.to_remove {
        store.remove_label(repo, number, label).await?;
    }
    store.add_labels(repo, number, &delta.to_add).await?;
    debug!(
        removed = delta.to_remove.len(),
        added = delta.to_add.len(),
        "applied label delta to {}#{}",
        repo,
        number
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Complexity, IssueType, Priority, Provenance};
    use crate::store::{Issue, MemoryStore};

    fn classification(t: IssueType, p: Priority, c: Complexity) -> Classification {
        Classification {
            issue_type: t,
            priority: p,
            complexity: c,
            rationale: "r".to_string(),
            provenance: Provenance::Oracle,
        }
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaces_convention_labels_and_keeps_organic_ones() {
        let current = labels(&["type-bug", "priority-p3", "good first issue"]);
        let delta = reconcile(
            &current,
            &classification(IssueType::Feature, Priority::P1, Complexity::High),
        );

        assert_eq!(delta.to_remove, labels(&["type-bug", "priority-p3"]));
        assert_eq!(
            delta.to_add,
            labels(&["type-feature", "priority-p1", "complexity-high"])
        );
        assert!(!delta.to_remove.contains(&"good first issue".to_string()));
        assert!(!delta.to_add.contains(&"good first issue".to_string()));
    }

    #[test]
    fn removes_matching_labels_too() {
        // full replace: an unchanged value is still removed and re-added
        let current = labels(&["type-bug", "priority-p2", "complexity-medium"]);
        let delta = reconcile(
            &current,
            &classification(IssueType::Bug, Priority::P2, Complexity::Medium),
        );
        assert_eq!(delta.to_remove, current);
        assert_eq!(delta.apply_to(&current), current);
    }

    #[test]
    fn convention_match_is_strict_prefix() {
        assert!(is_triage_label("type-bug"));
        assert!(is_triage_label("complexity-high"));
        assert!(!is_triage_label("bug"));
        assert!(!is_triage_label("P1"));
        assert!(!is_triage_label("high-priority"));
        assert!(!is_triage_label("Type-Bug"));
    }

    #[test]
    fn second_application_does_not_drift() {
        let c = classification(IssueType::Question, Priority::P3, Complexity::Low);
        let start = labels(&["type-bug", "priority-p0", "priority-p1", "docs"]);

        let first = reconcile(&start, &c).apply_to(&start);
        let second = reconcile(&first, &c).apply_to(&first);

        assert_eq!(first, second);
        assert_eq!(
            first,
            labels(&["docs", "type-question", "priority-p3", "complexity-low"])
        );
    }

    #[tokio::test]
    async fn apply_delta_converges_store_state() {
        let repo = RepoRef::new("acme", "widgets");
        let store = MemoryStore::new();
        store.insert_issue(
            &repo,
            Issue::new(3, "t", "b").with_labels(["type-bug", "priority-p3", "good first issue"]),
        );
        let c = classification(IssueType::Feature, Priority::P1, Complexity::High);

        for _ in 0..2 {
            let current = store.labels(&repo, 3);
            apply_delta(&store, &repo, 3, &reconcile(&current, &c)).await.unwrap();
        }

        assert_eq!(
            store.labels(&repo, 3),
            labels(&["good first issue", "type-feature", "priority-p1", "complexity-high"])
        );
        let calls = store.calls();
        let first_add = calls.iter().position(|c| c == "add_labels").unwrap();
        assert!(calls[..first_add].iter().all(|c| c == "remove_label"));
    }
}
