//! Query Classification
//!
//! Ordered regex families map a query string onto one of six classes.
//! Temporal keywords outrank factual WH-words ("what was discussed
//! yesterday" is TEMPORAL), and anything unmatched falls through to
//! COMPLEX. Matching is case-insensitive.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Query classes in dispatch order of the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryClass {
    Factual,
    Preference,
    Project,
    Temporal,
    Skill,
    Complex,
}

impl QueryClass {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryClass::Factual => "FACTUAL",
            QueryClass::Preference => "PREFERENCE",
            QueryClass::Project => "PROJECT",
            QueryClass::Temporal => "TEMPORAL",
            QueryClass::Skill => "SKILL",
            QueryClass::Complex => "COMPLEX",
        }
    }
}

/// Classification outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(rename = "type")]
    pub query_class: QueryClass,
    /// In (0, 1]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
}

struct PatternFamily {
    class: QueryClass,
    confidence: f64,
    patterns: &'static LazyLock<Vec<Regex>>,
}

macro_rules! regex_family {
    ($name:ident, [$($pattern:expr),+ $(,)?]) => {
        static $name: LazyLock<Vec<Regex>> = LazyLock::new(|| {
            vec![$(Regex::new($pattern).expect("valid regex")),+]
        });
    };
}

// Temporal first: "what was discussed yesterday" must not fall to FACTUAL
regex_family!(TEMPORAL_PATTERNS, [
    r"(?i)\b(yesterday|today|tonight|this (morning|afternoon|week|month))\b",
    r"(?i)\blast (time we|week|month|night|session|conversation)\b",
    r"(?i)\b(recently|earlier|lately|previously)\b",
    r"(?i)\bwhen (did|was|were)\b",
    r"(?i)\b(discussed|talked about|mentioned)\b",
]);

regex_family!(SKILL_PATTERNS, [
    r"(?i)\blike (before|last time)\b",
    r"(?i)\bsame as (before|last time)\b",
    r"(?i)\bthe usual way\b",
    r"(?i)\bskills?\b",
    r"(?i)\bhow (do|would) (i|we|you)\b",
    r"(?i)\brun the\b",
]);

regex_family!(PREFERENCE_PATTERNS, [
    r"(?i)\bmy (coding|writing|communication)? ?(style|preferences?|setup|workflow)\b",
    r"(?i)\bfavou?rite\b",
    r"(?i)\bprefer(s|red|ence)?\b",
    r"(?i)\b(do|what does) (i|the user) (like|want)\b",
    r"(?i)\blike my\b",
]);

regex_family!(PROJECT_PATTERNS, [
    r"(?i)\bprojects?\b",
    r"(?i)\bworking on\b",
    r"(?i)\bstatus of\b",
    r"(?i)\b(related|connected) to\b",
    r"(?i)\bwhat do (i|we|you) know about\b",
]);

regex_family!(FACTUAL_PATTERNS, [
    r"(?i)^(what|who|where|which|whose)\b",
    r"(?i)^(is|are|was|were|does|did|do|has|have|can)\b",
    r"(?i)\btell me about\b",
    r"(?i)\b(define|explain|describe)\b",
]);

static FAMILIES: LazyLock<Vec<PatternFamily>> = LazyLock::new(|| {
    vec![
        PatternFamily { class: QueryClass::Temporal, confidence: 0.9, patterns: &TEMPORAL_PATTERNS },
        PatternFamily { class: QueryClass::Skill, confidence: 0.85, patterns: &SKILL_PATTERNS },
        PatternFamily { class: QueryClass::Preference, confidence: 0.85, patterns: &PREFERENCE_PATTERNS },
        PatternFamily { class: QueryClass::Project, confidence: 0.8, patterns: &PROJECT_PATTERNS },
        PatternFamily { class: QueryClass::Factual, confidence: 0.7, patterns: &FACTUAL_PATTERNS },
    ]
});

/// Classify a query into the cheapest sufficient retrieval class
pub fn classify(query: &str) -> Classification {
    for family in FAMILIES.iter() {
        for pattern in family.patterns.iter() {
            if pattern.is_match(query) {
                return Classification {
                    query_class: family.class,
                    confidence: family.confidence,
                    matched_pattern: Some(pattern.as_str().to_string()),
                };
            }
        }
    }
    Classification {
        query_class: QueryClass::Complex,
        confidence: 0.5,
        matched_pattern: None,
    }
}

// ============================================================================
// EXTRACTORS
// ============================================================================

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:like my|my|prefer(?:red)?|favou?rite)\b(?:\s+favou?rite)?\s+([a-z0-9_-]+)")
        .expect("valid regex")
});

const DOMAIN_STOPWORDS: &[&str] = &[
    "own", "the", "a", "an", "is", "are", "was", "to", "for", "of", "in", "on",
];

/// Preference domain: first noun token after "my / favorite / prefer /
/// like my". Covers the documented cases (coffee, coding, language,
/// reports, typescript); multi-noun queries take the first match.
pub fn extract_domain(query: &str) -> Option<String> {
    for capture in DOMAIN_RE.captures_iter(query) {
        let word = capture.get(1)?.as_str().to_lowercase();
        if !DOMAIN_STOPWORDS.contains(&word.as_str()) {
            return Some(word);
        }
    }
    None
}

static STOPWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(what|who|where|which|whose|is|are|was|were|the|a|an|my|about|tell|me|status|of|do|we|i|you|know)$")
        .expect("valid regex")
});

/// Best-effort entity name from a query: the first capitalised mid-sentence
/// word, else the first non-stopword token.
pub fn extract_entity_name(query: &str) -> Option<String> {
    let words: Vec<&str> = query
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|w| !w.is_empty())
        .collect();

    for (i, word) in words.iter().enumerate() {
        if i > 0 && word.chars().next().is_some_and(char::is_uppercase) {
            return Some((*word).to_string());
        }
    }
    words
        .iter()
        .find(|w| !STOPWORD_RE.is_match(w))
        .map(|w| (*w).to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_over_factual() {
        let result = classify("What's my coding style?");
        assert_eq!(result.query_class, QueryClass::Preference);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        assert!(result.matched_pattern.is_some());
    }

    #[test]
    fn test_temporal_over_factual() {
        let result = classify("What was discussed yesterday?");
        assert_eq!(result.query_class, QueryClass::Temporal);
    }

    #[test]
    fn test_skill_reference() {
        let result = classify("Analyze this like before");
        assert_eq!(result.query_class, QueryClass::Skill);
    }

    #[test]
    fn test_factual() {
        assert_eq!(classify("Who is Alice?").query_class, QueryClass::Factual);
        assert_eq!(
            classify("Tell me about the migration").query_class,
            QueryClass::Factual
        );
    }

    #[test]
    fn test_project() {
        assert_eq!(
            classify("Everything related to Apollo").query_class,
            QueryClass::Project
        );
    }

    #[test]
    fn test_complex_default() {
        let result = classify("zebra umbrella cascade");
        assert_eq!(result.query_class, QueryClass::Complex);
        assert!(result.matched_pattern.is_none());
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("WHAT WAS DISCUSSED YESTERDAY").query_class, QueryClass::Temporal);
        assert_eq!(classify("my FAVORITE coffee").query_class, QueryClass::Preference);
    }

    #[test]
    fn test_extract_domain_documented_examples() {
        assert_eq!(extract_domain("What's my coffee order?"), Some("coffee".into()));
        assert_eq!(extract_domain("my coding style"), Some("coding".into()));
        assert_eq!(extract_domain("my favorite language"), Some("language".into()));
        assert_eq!(extract_domain("how do I like my reports"), Some("reports".into()));
        assert_eq!(extract_domain("do I prefer typescript"), Some("typescript".into()));
    }

    #[test]
    fn test_extract_domain_none() {
        assert_eq!(extract_domain("no markers here"), None);
    }

    #[test]
    fn test_extract_entity_name() {
        assert_eq!(extract_entity_name("What is the status of Apollo"), Some("Apollo".into()));
        assert_eq!(extract_entity_name("who is Alice?"), Some("Alice".into()));
        assert_eq!(extract_entity_name("what about kubernetes"), Some("kubernetes".into()));
        assert_eq!(extract_entity_name(""), None);
    }
}
