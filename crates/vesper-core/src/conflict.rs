//! Conflict Detector
//!
//! Finds contradictions, temporal overlaps, and preference shifts across
//! facts, entities, and decision rows within one namespace. Detected
//! conflicts are persisted (once per pair) and returned as data; they never
//! block the write that surfaced them.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    ConflictKind, ConflictRecord, Fact, MemoryRecord, ResolutionStatus,
};
use crate::storage::MemoryStore;

/// Minimum age gap for a re-asserted preference to count as a shift
const PREFERENCE_SHIFT_DAYS: i64 = 7;

/// Mutually exclusive topic groups for decision-content contradictions.
/// Two decisions conflict when one mentions a term from the left group and
/// the other a term from the right group.
const EXCLUSIVE_TOPICS: &[(&[&str], &[&str])] = &[
    (&["javascript", "js"], &["typescript", "ts"]),
    (&["rest"], &["graphql", "grpc"]),
    (&["postgres", "postgresql"], &["mysql", "mongodb"]),
    (&["tabs"], &["spaces"]),
    (&["monolith"], &["microservices"]),
    (&["synchronous"], &["asynchronous"]),
];

/// Detector over the relational store
pub struct ConflictDetector {
    store: Arc<MemoryStore>,
}

fn lowercase_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn mentions_any(tokens: &[String], terms: &[&str]) -> bool {
    tokens.iter().any(|t| terms.contains(&t.as_str()))
}

/// Order a pair so `(a, b)` and `(b, a)` persist as the same conflict
fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

impl ConflictDetector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    fn build(
        &self,
        id_1: &str,
        id_2: &str,
        kind: ConflictKind,
        description: String,
        namespace: &str,
    ) -> ConflictRecord {
        let (first, second) = ordered_pair(id_1, id_2);
        ConflictRecord {
            id: Uuid::new_v4().to_string(),
            fact_id_1: first.to_string(),
            fact_id_2: second.to_string(),
            conflict_type: kind,
            description,
            severity: kind.severity(),
            resolution_status: ResolutionStatus::Flagged,
            namespace: namespace.to_string(),
        }
    }

    /// Conflict between two facts on the same `(entity, property)`.
    /// Identical values never conflict; two open-ended assertions are a
    /// contradiction; otherwise overlapping validity is a temporal overlap.
    /// Historic vs current (disjoint intervals) is neither.
    fn fact_pair_conflict(&self, a: &Fact, b: &Fact) -> Option<ConflictKind> {
        if a.property != b.property || a.value == b.value {
            return None;
        }
        if a.is_open() && b.is_open() {
            return Some(ConflictKind::Contradiction);
        }
        if a.overlaps(b) {
            return Some(ConflictKind::TemporalOverlap);
        }
        None
    }

    /// Pairwise scan of every entity's facts in the namespace
    pub fn detect_fact_conflicts(&self, namespace: &str) -> Result<Vec<ConflictRecord>> {
        let mut found = Vec::new();
        for entity in self.store.entities(namespace)? {
            let facts = self.store.facts_for_entity(&entity.id, namespace)?;
            for (i, a) in facts.iter().enumerate() {
                for b in facts.iter().skip(i + 1) {
                    if let Some(kind) = self.fact_pair_conflict(a, b) {
                        found.push(self.build(
                            &a.id,
                            &b.id,
                            kind,
                            format!(
                                "{}.{}: '{}' vs '{}'",
                                entity.name, a.property, a.value, b.value
                            ),
                            namespace,
                        ));
                    }
                }
            }
        }
        Ok(found)
    }

    /// Preference entities with identical descriptions created more than a
    /// week apart
    pub fn detect_preference_shifts(&self, namespace: &str) -> Result<Vec<ConflictRecord>> {
        let preferences = self.store.preferences(namespace)?;
        let mut found = Vec::new();
        for (i, a) in preferences.iter().enumerate() {
            for b in preferences.iter().skip(i + 1) {
                let same_description = match (&a.description, &b.description) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                };
                if !same_description {
                    continue;
                }
                let gap = (a.created_at - b.created_at).abs();
                if gap > Duration::days(PREFERENCE_SHIFT_DAYS) {
                    found.push(self.build(
                        &a.id,
                        &b.id,
                        ConflictKind::PreferenceShift,
                        format!("preference '{}' re-asserted {} days apart", a.name, gap.num_days()),
                        namespace,
                    ));
                }
            }
        }
        Ok(found)
    }

    /// Content-level contradiction between two live decisions, via the
    /// exclusive-topic table
    fn decision_pair_conflict(&self, a: &MemoryRecord, b: &MemoryRecord) -> bool {
        let tokens_a = lowercase_tokens(&a.content);
        let tokens_b = lowercase_tokens(&b.content);
        EXCLUSIVE_TOPICS.iter().any(|(left, right)| {
            (mentions_any(&tokens_a, left) && mentions_any(&tokens_b, right))
                || (mentions_any(&tokens_a, right) && mentions_any(&tokens_b, left))
        })
    }

    /// Pairwise scan of live (non-superseded) decisions in the namespace
    pub fn detect_decision_conflicts(&self, namespace: &str) -> Result<Vec<ConflictRecord>> {
        let decisions = self.store.live_decisions(namespace)?;
        let mut found = Vec::new();
        for (i, a) in decisions.iter().enumerate() {
            for b in decisions.iter().skip(i + 1) {
                if self.decision_pair_conflict(a, b) {
                    found.push(self.build(
                        &a.id,
                        &b.id,
                        ConflictKind::Contradiction,
                        format!("decisions disagree: '{}' vs '{}'", a.content, b.content),
                        namespace,
                    ));
                }
            }
        }
        Ok(found)
    }

    /// Conflicts between one new decision and the existing live decisions
    pub fn conflicts_against_decision(
        &self,
        decision: &MemoryRecord,
        namespace: &str,
    ) -> Result<Vec<ConflictRecord>> {
        let decisions = self.store.live_decisions(namespace)?;
        let mut found = Vec::new();
        for other in decisions.iter().filter(|d| d.id != decision.id) {
            if self.decision_pair_conflict(decision, other) {
                found.push(self.build(
                    &decision.id,
                    &other.id,
                    ConflictKind::Contradiction,
                    format!(
                        "decisions disagree: '{}' vs '{}'",
                        decision.content, other.content
                    ),
                    namespace,
                ));
            }
        }
        Ok(found)
    }

    /// Persist candidates, returning how many were newly stored. Storage
    /// drops both involved facts to confidence 0.5 and flags the pair, once.
    pub fn store_conflicts(&self, conflicts: &[ConflictRecord]) -> Result<usize> {
        let mut stored = 0;
        for conflict in conflicts {
            if self.store.store_conflict(conflict)? {
                stored += 1;
                tracing::info!(
                    kind = conflict.conflict_type.as_str(),
                    severity = conflict.severity.as_str(),
                    namespace = %conflict.namespace,
                    "conflict detected"
                );
            }
        }
        Ok(stored)
    }

    /// Full sweep for one namespace: facts, preferences, decisions
    pub fn run(&self, namespace: &str) -> Result<usize> {
        let mut candidates = self.detect_fact_conflicts(namespace)?;
        candidates.extend(self.detect_preference_shifts(namespace)?);
        candidates.extend(self.detect_decision_conflicts(namespace)?);
        self.store_conflicts(&candidates)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityInput, MemoryType, Severity};
    use chrono::Utc;

    fn detector() -> (ConflictDetector, Arc<MemoryStore>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open(&dir.path().join("test.db")).unwrap());
        (ConflictDetector::new(Arc::clone(&store)), store, dir)
    }

    fn fact(entity_id: &str, property: &str, value: &str, namespace: &str) -> Fact {
        Fact {
            id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            property: property.into(),
            value: value.into(),
            confidence: 0.9,
            valid_from: None,
            valid_until: None,
            source_conversation: None,
            namespace: namespace.into(),
        }
    }

    #[test]
    fn test_contradiction_between_open_facts() {
        let (detector, store, _dir) = detector();
        let entity = store
            .upsert_entity(
                &EntityInput {
                    name: "User".into(),
                    entity_type: "person".into(),
                    ..Default::default()
                },
                "c",
            )
            .unwrap();
        store.insert_fact(&fact(&entity.id, "editor", "vim", "c")).unwrap();
        store.insert_fact(&fact(&entity.id, "editor", "emacs", "c")).unwrap();

        let found = detector.detect_fact_conflicts("c").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictKind::Contradiction);
        assert_eq!(found[0].severity, Severity::Medium);
    }

    #[test]
    fn test_same_value_never_conflicts() {
        let (detector, store, _dir) = detector();
        let entity = store
            .upsert_entity(
                &EntityInput {
                    name: "User".into(),
                    entity_type: "person".into(),
                    ..Default::default()
                },
                "c",
            )
            .unwrap();
        store.insert_fact(&fact(&entity.id, "editor", "vim", "c")).unwrap();
        store.insert_fact(&fact(&entity.id, "editor", "vim", "c")).unwrap();

        assert!(detector.detect_fact_conflicts("c").unwrap().is_empty());
    }

    #[test]
    fn test_historic_vs_current_is_not_a_contradiction() {
        let (detector, store, _dir) = detector();
        let entity = store
            .upsert_entity(
                &EntityInput {
                    name: "User".into(),
                    entity_type: "person".into(),
                    ..Default::default()
                },
                "c",
            )
            .unwrap();
        let now = Utc::now();

        let mut historic = fact(&entity.id, "city", "Berlin", "c");
        historic.valid_from = Some(now - Duration::days(400));
        historic.valid_until = Some(now - Duration::days(100));
        let mut current = fact(&entity.id, "city", "Lisbon", "c");
        current.valid_from = Some(now - Duration::days(99));
        store.insert_fact(&historic).unwrap();
        store.insert_fact(&current).unwrap();

        assert!(detector.detect_fact_conflicts("c").unwrap().is_empty());
    }

    #[test]
    fn test_temporal_overlap_is_high_severity() {
        let (detector, store, _dir) = detector();
        let entity = store
            .upsert_entity(
                &EntityInput {
                    name: "User".into(),
                    entity_type: "person".into(),
                    ..Default::default()
                },
                "c",
            )
            .unwrap();
        let now = Utc::now();

        let mut a = fact(&entity.id, "city", "Berlin", "c");
        a.valid_from = Some(now - Duration::days(200));
        a.valid_until = Some(now - Duration::days(50));
        // Open-ended fact starting inside a's interval
        let mut b = fact(&entity.id, "city", "Lisbon", "c");
        b.valid_from = Some(now - Duration::days(100));
        store.insert_fact(&a).unwrap();
        store.insert_fact(&b).unwrap();

        let found = detector.detect_fact_conflicts("c").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictKind::TemporalOverlap);
        assert_eq!(found[0].severity, Severity::High);
    }

    #[test]
    fn test_preference_shift_requires_week_gap() {
        let (detector, store, _dir) = detector();
        store
            .upsert_entity(
                &EntityInput {
                    name: "indentation old".into(),
                    entity_type: "preference".into(),
                    description: Some("two-space indent".into()),
                    ..Default::default()
                },
                "p",
            )
            .unwrap();
        store
            .upsert_entity(
                &EntityInput {
                    name: "indentation new".into(),
                    entity_type: "preference".into(),
                    description: Some("two-space indent".into()),
                    ..Default::default()
                },
                "p",
            )
            .unwrap();

        // Created moments apart: no shift
        assert!(detector.detect_preference_shifts("p").unwrap().is_empty());

        // Age one of them past the gap
        let past = (Utc::now() - Duration::days(10)).to_rfc3339();
        store
            .execute_raw(
                "UPDATE entities SET created_at = ?1 WHERE name = 'indentation old'",
                rusqlite::params![past],
            )
            .unwrap();
        let found = detector.detect_preference_shifts("p").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictKind::PreferenceShift);
        assert_eq!(found[0].severity, Severity::Low);
    }

    #[test]
    fn test_decision_conflict_js_vs_ts() {
        let (detector, store, _dir) = detector();
        let a = MemoryRecord::new("Use JS for the frontend", MemoryType::Decision, "d");
        let b = MemoryRecord::new("Use TS everywhere", MemoryType::Decision, "d");
        store.insert_memory(&a).unwrap();
        store.insert_memory(&b).unwrap();

        let found = detector.detect_decision_conflicts("d").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].conflict_type, ConflictKind::Contradiction);

        let against = detector.conflicts_against_decision(&b, "d").unwrap();
        assert_eq!(against.len(), 1);
    }

    #[test]
    fn test_superseded_decisions_do_not_conflict() {
        let (detector, store, _dir) = detector();
        let a = MemoryRecord::new("Use JS", MemoryType::Decision, "d");
        store.insert_memory(&a).unwrap();
        let b = MemoryRecord::new("Use TS", MemoryType::Decision, "d");
        store.insert_decision(&b, Some(&a.id)).unwrap();

        assert!(detector.detect_decision_conflicts("d").unwrap().is_empty());
    }

    #[test]
    fn test_run_stores_each_pair_once() {
        let (detector, store, _dir) = detector();
        let entity = store
            .upsert_entity(
                &EntityInput {
                    name: "User".into(),
                    entity_type: "person".into(),
                    ..Default::default()
                },
                "c",
            )
            .unwrap();
        let f1 = fact(&entity.id, "editor", "vim", "c");
        let f2 = fact(&entity.id, "editor", "emacs", "c");
        store.insert_fact(&f1).unwrap();
        store.insert_fact(&f2).unwrap();

        assert_eq!(detector.run("c").unwrap(), 1);
        // Re-running finds the same pair but stores nothing new
        assert_eq!(detector.run("c").unwrap(), 0);

        // Both facts dropped to confidence 0.5 exactly once
        for fact in store.facts_for_entity(&entity.id, "c").unwrap() {
            assert_eq!(fact.confidence, 0.5);
        }
    }
}
