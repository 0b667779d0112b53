//! Keyword heuristic that forces P0 on issues signalling maximal urgency.
//!
//! The heuristic never replaces the oracle call. It only overrides the
//! priority of whatever the oracle (or the fallback) decided.

use regex::Regex;
use std::sync::LazyLock;

/// (name, pattern). Patterns are matched case-insensitively against
/// `title + "\n" + body`.
const P0_PATTERNS: &[(&str, &str)] = &[
    ("crash", r"\bcrash(?:es|ed|ing)?\b"),
    ("security", r"\bsecurity\s+(?:vulnerability|issue|bug|flaw)\b"),
    ("data loss", r"\bdata\s+loss\b"),
    ("production down", r"\bproduction\s+(?:is\s+)?down\b"),
    ("critical", r"\bcritical\s+(?:bug|issue)\b"),
    ("severe", r"\bsevere\b"),
    ("urgent", r"\burgent\b"),
    ("exploit", r"\bexploit(?:s|ed|able)?\b"),
    ("cve", r"\bcve-\d{4}-\d{4,}\b"),
    ("vulnerability", r"\bvulnerabilit(?:y|ies)\b"),
];

static P0_REGEXES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    P0_PATTERNS
        .iter()
        .map(|(name, pattern)| {
            let re = Regex::new(&format!("(?i){pattern}")).expect("P0 pattern is valid");
            (*name, re)
        })
        .collect()
});

/// A heuristic hit: which rule fired and the text it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicMatch {
    pub pattern: &'static str,
    pub matched: String,
}

/// First P0 rule matching the issue text, in rule order.
pub fn detect_p0(title: &str, body: &str) -> Option<HeuristicMatch> {
    let text = format!("{title}\n{body}");
    P0_REGEXES.iter().find_map(|(name, re)| {
        re.find(&text).map(|m| HeuristicMatch {
            pattern: *name,
            matched: m.as_str().to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, body: &str) -> Option<&'static str> {
        detect_p0(title, body).map(|m| m.pattern)
    }

    #[test]
    fn matches_each_rule() {
        assert_eq!(hit("App crashed on launch", ""), Some("crash"));
        assert_eq!(hit("", "it keeps CRASHING"), Some("crash"));
        assert_eq!(hit("Security flaw in login", ""), Some("security"));
        assert_eq!(hit("", "we saw data  loss after upgrade"), Some("data loss"));
        assert_eq!(hit("Production is down", ""), Some("production down"));
        assert_eq!(hit("critical issue with billing", ""), Some("critical"));
        assert_eq!(hit("Severe slowdown", ""), Some("severe"));
        assert_eq!(hit("URGENT: fix header", ""), Some("urgent"));
        assert_eq!(hit("", "this can be exploited remotely"), Some("exploit"));
        assert_eq!(hit("", "tracked as CVE-2024-12345"), Some("cve"));
        assert_eq!(hit("Possible vulnerability", ""), Some("vulnerability"));
    }

    #[test]
    fn reports_matched_text() {
        let m = detect_p0("Data Loss when saving", "").unwrap();
        assert_eq!(m.matched, "Data Loss");
    }

    #[test]
    fn ordinary_text_does_not_match() {
        assert_eq!(hit("Add dark mode", "It would be nice to have a dark theme."), None);
        assert_eq!(hit("Typo in README", "critically acclaimed docs have a typo"), None);
        assert_eq!(hit("Cover CVE parsing", "CVE-99 is not a real id"), None);
    }
}
