//! Rationale comments and the guard that keeps them to one per issue.
//!
//! There is no uniqueness constraint on the tracker side. Every triage
//! comment starts with [`ANNOTATION_SIGNATURE`], and the guard scans existing
//! comments for it before a new one is posted.

use crate::classify::{Classification, Provenance};
use crate::store::{Comment, RecordStore, RepoRef, StoreResult};

/// Marker carried by every rationale comment this crate posts.
pub const ANNOTATION_SIGNATURE: &str = "🤖 AI Triage Analysis";

/// Does any comment carry the signature?
pub fn contains_annotation(comments: &[Comment]) -> bool {
    comments.iter().any(|c| c.body.contains(ANNOTATION_SIGNATURE))
}

/// Has a rationale comment already been posted on this issue?
pub async fn has_existing_annotation(
    store: &dyn RecordStore,
    repo: &RepoRef,
    number: u64,
) -> StoreResult<bool> {
    let comments = store.list_comments(repo, number).await?;
    Ok(contains_annotation(&comments))
}

/// Render the rationale comment for a classification.
pub fn compose_annotation(classification: &Classification, labels: &[String]) -> String {
    let mut body = format!(
        "## {ANNOTATION_SIGNATURE}\n\n\
         | Dimension | Assessment |\n\
         |-----------|------------|\n\
         | **Type** | {} |\n\
         | **Priority** | {} |\n\
         | **Complexity** | {} |\n\n\
         ### Rationale\n\n{}\n",
        classification.issue_type,
        classification.priority,
        classification.complexity,
        classification.rationale,
    );

    match &classification.provenance {
        Provenance::HeuristicOverride { pattern, .. }
        | Provenance::FallbackWithOverride { pattern, .. } => {
            body.push_str(&format!(
                "\n> **Note:** priority was raised to P0 because the report matches the `{pattern}` urgency rule.\n"
            ));
        }
        Provenance::Fallback { .. } | Provenance::Oracle => {}
    }
    if classification.is_fallback() {
        body.push_str(
            "\n> **Note:** the automated classifier could not produce a usable answer; default values were applied. Please review manually.\n",
        );
    }

    if !labels.is_empty() {
        let rendered: Vec<String> = labels.iter().map(|l| format!("`{l}`")).collect();
        body.push_str(&format!("\n**Labels applied:** {}\n", rendered.join(", ")));
    }

    body.push_str(
        "\n---\n*This analysis was generated automatically. Labels are kept in sync on re-triage; this comment is posted once.*\n",
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Complexity, IssueType, Priority};
    use crate::store::{Issue, MemoryStore};

    fn comment(body: &str) -> Comment {
        Comment {
            id: 1,
            body: body.to_string(),
            author: None,
        }
    }

    #[test]
    fn guard_matches_signature_anywhere_in_body() {
        assert!(!contains_annotation(&[]));
        assert!(!contains_annotation(&[comment("Thanks for the report!")]));
        assert!(contains_annotation(&[
            comment("first"),
            comment(&format!("Edited.\n## {ANNOTATION_SIGNATURE}\n..."))
        ]));
    }

    #[test]
    fn composed_comment_is_recognised_by_guard() {
        let c = Classification {
            issue_type: IssueType::Bug,
            priority: Priority::P0,
            complexity: Complexity::Medium,
            rationale: "Crash on save.".to_string(),
            provenance: Provenance::HeuristicOverride {
                pattern: "crash".to_string(),
                oracle_priority: Priority::P2,
            },
        };
        let body = compose_annotation(&c, &c.labels());

        assert!(contains_annotation(&[comment(&body)]));
        assert!(body.contains("| **Priority** | P0 |"));
        assert!(body.contains("`crash` urgency rule"));
        assert!(body.contains("`type-bug`, `priority-p0`, `complexity-medium`"));
    }

    #[test]
    fn fallback_comment_asks_for_review() {
        let body = compose_annotation(&Classification::fallback("no json"), &[]);
        assert!(body.contains("default values were applied"));
        assert!(!body.contains("Labels applied"));
    }

    #[tokio::test]
    async fn has_existing_annotation_reads_store() {
        let repo = RepoRef::new("acme", "widgets");
        let store = MemoryStore::new();
        store.insert_issue(&repo, Issue::new(1, "t", "b"));
        assert!(!has_existing_annotation(&store, &repo, 1).await.unwrap());

        store.insert_comment(&repo, 1, format!("## {ANNOTATION_SIGNATURE}\nold run"));
        assert!(has_existing_annotation(&store, &repo, 1).await.unwrap());
    }
}
