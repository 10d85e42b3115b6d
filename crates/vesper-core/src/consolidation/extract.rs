//! Deterministic Extraction Rules
//!
//! Turns working-tier conversation records into graph writes: proper-noun
//! tokenisation for entities, a topic whitelist, verb patterns for
//! relationships and facts, and a procedural-intent pattern for skill
//! proposals. No model calls; the same record always extracts the same way.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::WorkingRecord;

/// Topics promoted to entities when they appear in a record
const TOPIC_WHITELIST: &[&str] = &[
    "rust",
    "python",
    "typescript",
    "javascript",
    "docker",
    "kubernetes",
    "database",
    "testing",
    "deployment",
    "security",
    "performance",
    "architecture",
    "api",
    "frontend",
    "backend",
];

static PROPER_NOUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:\s+[A-Z][a-z0-9]+)?\b").expect("valid regex"));

static RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b([A-Za-z][\w-]*)\s+(uses|works on|depends on|prefers|manages|owns|maintains)\s+([A-Za-z][\w-]*)\b",
    )
    .expect("valid regex")
});

static FACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z][\w-]*)'s\s+([a-z][\w-]*)\s+is\s+([\w.-]+)").expect("valid regex")
});

static PROCEDURAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(how to|steps? (to|for)|procedure|workflow|set ?up|configure|deploy|automate|generate)\b")
        .expect("valid regex")
});

/// An extracted entity candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: String,
}

/// An extracted relationship candidate, by entity name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    pub relation_type: String,
}

/// An extracted fact candidate, by entity name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub entity: String,
    pub property: String,
    pub value: String,
}

/// Everything one record contributes to the semantic graph
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub facts: Vec<ExtractedFact>,
}

fn is_sentence_start(text: &str, index: usize) -> bool {
    let before = text[..index].trim_end();
    before.is_empty() || before.ends_with(['.', '!', '?'])
}

/// Run the full rule set against one record
pub fn extract(record: &WorkingRecord) -> Extraction {
    let mut extraction = Extraction::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push_entity = |extraction: &mut Extraction, name: &str, entity_type: &str| {
        let key = name.to_lowercase();
        if seen.insert(key) {
            extraction.entities.push(ExtractedEntity {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            });
        }
    };

    // Key entities named on the record come first
    for name in &record.key_entities {
        if !name.trim().is_empty() {
            push_entity(&mut extraction, name.trim(), "concept");
        }
    }

    // Proper nouns that do not open a sentence
    for m in PROPER_NOUN_RE.find_iter(&record.full_text) {
        if !is_sentence_start(&record.full_text, m.start()) {
            push_entity(&mut extraction, m.as_str(), "concept");
        }
    }

    // Whitelisted topics, from the record's topic set or the text itself
    let lowered = record.full_text.to_lowercase();
    for topic in TOPIC_WHITELIST {
        let tagged = record.topics.iter().any(|t| t.to_lowercase() == *topic);
        if tagged || lowered.split(|c: char| !c.is_alphanumeric()).any(|w| w == *topic) {
            push_entity(&mut extraction, topic, "concept");
        }
    }

    // Verb patterns: relationships between named things
    for capture in RELATION_RE.captures_iter(&record.full_text) {
        let source = capture[1].to_string();
        let target = capture[3].to_string();
        let relation_type = capture[2].to_lowercase().replace(' ', "_");
        push_entity(&mut extraction, &source, "concept");
        push_entity(&mut extraction, &target, "concept");
        if relation_type == "prefers" {
            // A stated preference also lands as a preference entity
            push_entity(&mut extraction, &format!("{source} preference"), "preference");
            extraction.facts.push(ExtractedFact {
                entity: source.clone(),
                property: "preference".into(),
                value: target.clone(),
            });
        }
        extraction.relationships.push(ExtractedRelationship {
            source,
            target,
            relation_type,
        });
    }

    // Possessive facts: "Alice's editor is vim"
    for capture in FACT_RE.captures_iter(&record.full_text) {
        let entity = capture[1].to_string();
        push_entity(&mut extraction, &entity, "concept");
        extraction.facts.push(ExtractedFact {
            entity,
            property: capture[2].to_lowercase(),
            value: capture[3].to_string(),
        });
    }

    extraction
}

/// Whether a record's intent reads as procedural know-how worth a skill
pub fn has_procedural_intent(record: &WorkingRecord) -> bool {
    PROCEDURAL_RE.is_match(&record.user_intent) || PROCEDURAL_RE.is_match(&record.full_text)
}

/// Skill name proposed from a procedural record
pub fn propose_skill_name(record: &WorkingRecord) -> String {
    let source = if record.user_intent.trim().is_empty() {
        &record.full_text
    } else {
        &record.user_intent
    };
    let words: Vec<&str> = source.split_whitespace().take(6).collect();
    words.join(" ").trim_end_matches(['.', '!', '?']).to_lowercase()
}

/// Token-overlap novelty check against existing skill names. Returns true
/// when the proposal is distinct enough to store.
pub fn is_novel_skill(proposed: &str, existing_names: &[String], threshold: f64) -> bool {
    let proposed_tokens: HashSet<String> = proposed
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if proposed_tokens.is_empty() {
        return false;
    }

    for name in existing_names {
        let name_tokens: HashSet<String> = name
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if name_tokens.is_empty() {
            continue;
        }
        let overlap = proposed_tokens.intersection(&name_tokens).count() as f64;
        let smaller = proposed_tokens.len().min(name_tokens.len()) as f64;
        if overlap / smaller >= threshold {
            return false;
        }
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
