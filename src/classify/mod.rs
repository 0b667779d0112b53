//! Classification policy — heuristic override composed with the oracle.
//!
//! 1. Scan title + body for P0 patterns (see [`heuristic`]).
//! 2. Always ask the oracle, with the body truncated to [`MAX_BODY_CHARS`].
//! 3. Validate the oracle's answer; anything unusable becomes
//!    [`Classification::fallback`] instead of an error.
//! 4. If the heuristic fired, force P0 and prefix the rationale.
//!
//! The only error `classify` returns is a failed oracle invocation.

pub mod heuristic;
mod types;

pub use heuristic::{detect_p0, HeuristicMatch};
pub use types::{
    Classification, Complexity, InvalidValue, IssueType, Priority, Provenance, FALLBACK_RATIONALE,
};

use crate::oracle::{Oracle, OracleError};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Body characters sent to the oracle at most.
pub const MAX_BODY_CHARS: usize = 2000;
/// Appended to a body that was cut.
pub const TRUNCATION_MARKER: &str = "\n\n[... body truncated]";
/// Prefix of the rationale when the heuristic forced P0.
pub const OVERRIDE_NOTICE: &str = "⚠️ Priority overridden to P0 by urgency heuristic";

/// Cut `body` to [`MAX_BODY_CHARS`] characters, marking the cut.
pub fn truncate_body(body: &str) -> Cow<'_, str> {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        None => Cow::Borrowed(body),
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &body[..byte_idx], TRUNCATION_MARKER)),
    }
}

/// The prompt sent to the oracle for one issue.
pub fn build_prompt(title: &str, body: &str) -> String {
    let body = truncate_body(body);
    let body = if body.trim().is_empty() {
        Cow::Borrowed("(no description provided)")
    } else {
        body
    };
    format!(
        r#"You are triaging a GitHub issue. Classify it and explain your reasoning.

Title: {title}

Body:
{body}

Respond with a single JSON object and nothing else:
{{
  "type": one of "bug", "feature", "enhancement", "question",
  "priority": one of "P0" (critical, production broken or security), "P1" (high, major feature broken), "P2" (medium, minor bug or useful improvement), "P3" (low, nice to have),
  "complexity": one of "Low", "Medium", "High",
  "rationale": two or three sentences explaining the classification
}}"#
    )
}

/// Extract a JSON object from oracle reply text.
///
/// Tries, in order: the whole reply, a fenced ```json block, then the span
/// from the first `{` to the last `}`.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    if let Some(block) = fenced {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(block.trim()) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// The oracle's answer before validation. Every field is optional here so
/// that a missing field is a validation failure, not a decode failure.
#[derive(Debug, Deserialize)]
struct OracleJudgment {
    #[serde(rename = "type")]
    issue_type: Option<String>,
    priority: Option<String>,
    complexity: Option<String>,
    rationale: Option<String>,
}

/// Validate an oracle reply. `Err` carries the reason it was rejected.
pub fn parse_judgment(reply: &str) -> Result<Classification, String> {
    let value = extract_json(reply).ok_or_else(|| "no JSON object in oracle reply".to_string())?;
    let judgment: OracleJudgment =
        serde_json::from_value(value).map_err(|e| format!("unexpected field shape: {e}"))?;

    let missing = |field: &str| format!("oracle reply missing '{field}'");
    let issue_type = judgment.issue_type.ok_or_else(|| missing("type"))?;
    let priority = judgment.priority.ok_or_else(|| missing("priority"))?;
    let complexity = judgment.complexity.ok_or_else(|| missing("complexity"))?;
    let rationale = judgment
        .rationale
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| missing("rationale"))?;

    Ok(Classification {
        issue_type: issue_type.parse().map_err(|e: InvalidValue| e.to_string())?,
        priority: priority.parse().map_err(|e: InvalidValue| e.to_string())?,
        complexity: complexity.parse().map_err(|e: InvalidValue| e.to_string())?,
        rationale: rationale.trim().to_string(),
        provenance: Provenance::Oracle,
    })
}

/// Force P0 when the heuristic fired. Type and complexity are untouched.
pub fn apply_override(classification: Classification, hit: Option<HeuristicMatch>) -> Classification {
    let Some(hit) = hit else {
        return classification;
    };

    let provenance = match classification.provenance {
        Provenance::Fallback { reason } | Provenance::FallbackWithOverride { reason, .. } => {
            Provenance::FallbackWithOverride {
                reason,
                pattern: hit.pattern.to_string(),
            }
        }
        Provenance::Oracle | Provenance::HeuristicOverride { .. } => {
            Provenance::HeuristicOverride {
                pattern: hit.pattern.to_string(),
                oracle_priority: classification.priority,
            }
        }
    };

    Classification {
        priority: Priority::P0,
        rationale: format!(
            "{OVERRIDE_NOTICE} (matched \"{}\"; assessed as {}). {}",
            hit.matched, classification.priority, classification.rationale
        ),
        provenance,
        ..classification
    }
}

/// The classification policy.
pub struct Classifier {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// Classify one issue. Fails only when the oracle cannot be invoked.
    #[instrument(skip_all, fields(title = %title, body_chars = body.chars().count()))]
    pub async fn classify(&self, title: &str, body: &str) -> Result<Classification, OracleError> {
        let hit = heuristic::detect_p0(title, body);
        if let Some(h) = &hit {
            debug!(pattern = h.pattern, matched = %h.matched, "urgency heuristic matched");
        }

        let prompt = build_prompt(title, body);
        let reply = self
            .retry
            .run("oracle.infer", || self.oracle.infer(&prompt))
            .await?;

        let classification = match parse_judgment(&reply) {
            Ok(c) => c,
            Err(reason) => {
                warn!(%reason, "oracle reply rejected, using fallback classification");
                Classification::fallback(reason)
            }
        };

        let classification = apply_override(classification, hit);
        info!(
            issue_type = %classification.issue_type,
            priority = %classification.priority,
            complexity = %classification.complexity,
            overridden = classification.is_overridden(),
            fallback = classification.is_fallback(),
            "classified"
        );
        Ok(classification)
    }
}
