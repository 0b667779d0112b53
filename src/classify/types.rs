//! Classification value types and the triage label naming convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rationale used when the oracle's answer cannot be validated.
pub const FALLBACK_RATIONALE: &str = "classification failed, using default values";

/// Error for a value outside one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a valid {dimension}")]
pub struct InvalidValue {
    pub dimension: &'static str,
    pub value: String,
}

macro_rules! closed_enum {
    ($(#[$meta:meta])* $name:ident, $dimension:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical spelling, as the oracle is asked to answer.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// The triage label for this value, e.g. `priority-p1`.
            pub fn label(&self) -> String {
                format!("{}-{}", $dimension, self.as_str().to_lowercase())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        /// Case-insensitive, surrounding whitespace ignored.
        impl FromStr for $name {
            type Err = InvalidValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| InvalidValue {
                        dimension: $dimension,
                        value: s.to_string(),
                    })
            }
        }
    };
}

closed_enum!(
    /// What kind of request the issue is.
    IssueType, "type", {
        Bug => "bug",
        Feature => "feature",
        Enhancement => "enhancement",
        Question => "question",
    }
);

closed_enum!(
    /// Urgency, P0 most urgent.
    Priority, "priority", {
        P0 => "P0",
        P1 => "P1",
        P2 => "P2",
        P3 => "P3",
    }
);

closed_enum!(
    /// Estimated effort to resolve.
    Complexity, "complexity", {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
);

/// How a classification was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// The oracle's answer was used as given
    Oracle,
    /// The oracle's answer was used but a heuristic pattern forced P0
    HeuristicOverride { pattern: String, oracle_priority: Priority },
    /// The oracle's answer was unusable; defaults were applied
    Fallback { reason: String },
    /// Fallback defaults, then a heuristic pattern forced P0
    FallbackWithOverride { reason: String, pattern: String },
}

/// A complete judgment on one issue. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub priority: Priority,
    pub complexity: Complexity,
    pub rationale: String,
    pub provenance: Provenance,
}

impl Classification {
    /// The fixed judgment used when the oracle's answer is unusable.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            issue_type: IssueType::Bug,
            priority: Priority::P2,
            complexity: Complexity::Medium,
            rationale: FALLBACK_RATIONALE.to_string(),
            provenance: Provenance::Fallback {
                reason: reason.into(),
            },
        }
    }

    /// The three canonical triage labels, in type/priority/complexity order.
    pub fn labels(&self) -> [String; 3] {
        [
            self.issue_type.label(),
            self.priority.label(),
            self.complexity.label(),
        ]
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self.provenance,
            Provenance::Fallback { .. } | Provenance::FallbackWithOverride { .. }
        )
    }

    pub fn is_overridden(&self) -> bool {
        matches!(
            self.provenance,
            Provenance::HeuristicOverride { .. } | Provenance::FallbackWithOverride { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_naming_convention() {
        let c = Classification {
            issue_type: IssueType::Feature,
            priority: Priority::P1,
            complexity: Complexity::High,
            rationale: String::new(),
            provenance: Provenance::Oracle,
        };
        assert_eq!(
            c.labels(),
            [
                "type-feature".to_string(),
                "priority-p1".to_string(),
                "complexity-high".to_string()
            ]
        );
    }

    #[test]
    fn parsing_is_case_insensitive_but_closed() {
        assert_eq!(" p1 ".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("MEDIUM".parse::<Complexity>().unwrap(), Complexity::Medium);
        assert_eq!("Enhancement".parse::<IssueType>().unwrap(), IssueType::Enhancement);

        let err = "P4".parse::<Priority>().unwrap_err();
        assert_eq!(err.dimension, "priority");
        assert!("chore".parse::<IssueType>().is_err());
        assert!("critical".parse::<Complexity>().is_err());
    }

    #[test]
    fn fallback_is_bug_p2_medium() {
        let c = Classification::fallback("no json");
        assert_eq!(c.issue_type, IssueType::Bug);
        assert_eq!(c.priority, Priority::P2);
        assert_eq!(c.complexity, Complexity::Medium);
        assert_eq!(c.rationale, FALLBACK_RATIONALE);
        assert!(c.is_fallback());
        assert!(!c.is_overridden());
    }

    #[test]
    fn serializes_with_type_key() {
        let json = serde_json::to_value(Classification::fallback("x")).unwrap();
        assert_eq!(json["type"], "bug");
        assert_eq!(json["priority"], "P2");
        assert_eq!(json["complexity"], "Medium");
        assert_eq!(json["provenance"]["kind"], "fallback");
    }
}
