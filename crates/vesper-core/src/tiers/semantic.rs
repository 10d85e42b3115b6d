//! Semantic Memory Tier
//!
//! Durable entity-relationship-fact graph scoped by namespace. Graph rows
//! live in the relational store; this tier adds traversal (personalized
//! PageRank), temporal decay, and preference scoring on top.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Entity, EntityInput, Fact, MemoryRecord, Relationship, RelationshipInput};
use crate::storage::MemoryStore;

/// Nodes scoring below this are not returned by traversal
pub const PAGERANK_PRUNE_THRESHOLD: f64 = 0.1;

/// Relationship decay time constant, in days
const RELATIONSHIP_TAU_DAYS: f64 = 30.0;

/// Preference recency time constant, in days
const PREFERENCE_TAU_DAYS: f64 = 30.0;

/// A graph node with its traversal relevance score
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedNode {
    pub entity: Entity,
    /// Seed is 1.0; attenuates as the product of edge strengths
    pub score: f64,
}

/// Entity-relationship-fact graph with PageRank traversal and decay
pub struct SemanticMemory {
    store: Arc<MemoryStore>,
}

impl SemanticMemory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Insert or refresh an entity (see `MemoryStore::upsert_entity`)
    pub fn upsert_entity(&self, input: &EntityInput, namespace: &str) -> Result<Entity> {
        self.store.upsert_entity(input, namespace)
    }

    /// Entity by name within the namespace, access-counted
    pub fn get_entity(&self, name: &str, namespace: &str) -> Result<Option<Entity>> {
        self.store.get_entity(name, namespace)
    }

    /// Insert or reinforce a relationship (see `MemoryStore::upsert_relationship`)
    pub fn upsert_relationship(
        &self,
        input: &RelationshipInput,
        namespace: &str,
    ) -> Result<Relationship> {
        self.store.upsert_relationship(input, namespace)
    }

    /// Facts asserted about an entity
    pub fn facts_for_entity(&self, entity_id: &str, namespace: &str) -> Result<Vec<Fact>> {
        self.store.facts_for_entity(entity_id, namespace)
    }

    /// Bounded traversal from `seed_id`. The seed scores 1.0; each hop
    /// multiplies by the edge strength (edges are followed in both
    /// directions). Nodes below the prune threshold are dropped; cycles and
    /// self-loops terminate because a node is only re-expanded when its
    /// score improves, and scores cannot grow along a path.
    pub fn personalized_page_rank(
        &self,
        seed_id: &str,
        depth: usize,
        namespace: &str,
    ) -> Result<Vec<RankedNode>> {
        let Some(seed) = self.store.entity_by_id(seed_id, namespace)? else {
            return Ok(vec![]);
        };

        // Undirected adjacency over the namespace's edges
        let relationships = self.store.relationships(namespace)?;
        let mut adjacency: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
        for rel in &relationships {
            let strength = rel.strength.clamp(0.0, 1.0);
            adjacency
                .entry(rel.source_id.as_str())
                .or_default()
                .push((rel.target_id.as_str(), strength));
            adjacency
                .entry(rel.target_id.as_str())
                .or_default()
                .push((rel.source_id.as_str(), strength));
        }

        let mut scores: HashMap<String, f64> = HashMap::new();
        scores.insert(seed.id.clone(), 1.0);
        let mut frontier: Vec<(String, f64)> = vec![(seed.id.clone(), 1.0)];

        for _ in 0..depth {
            let mut next = Vec::new();
            for (node, score) in frontier {
                let Some(neighbors) = adjacency.get(node.as_str()) else {
                    continue;
                };
                for (neighbor, strength) in neighbors {
                    if *neighbor == node {
                        continue; // self-loop
                    }
                    let propagated = score * strength;
                    if propagated < PAGERANK_PRUNE_THRESHOLD {
                        continue;
                    }
                    let best = scores.entry((*neighbor).to_string()).or_insert(0.0);
                    if propagated > *best {
                        *best = propagated;
                        next.push(((*neighbor).to_string(), propagated));
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut ranked = Vec::new();
        for (id, score) in scores {
            if score < PAGERANK_PRUNE_THRESHOLD {
                continue;
            }
            // entity_by_id is namespace-scoped, so a foreign edge endpoint
            // can never leak into the result
            if let Some(entity) = self.store.entity_by_id(&id, namespace)? {
                ranked.push(RankedNode { entity, score });
            }
        }
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }

    /// Exponential decay of every relationship strength in the namespace,
    /// keyed on `last_reinforced`. Returns rows updated.
    pub fn apply_temporal_decay(&self, namespace: &str) -> Result<usize> {
        self.store.apply_temporal_decay(namespace, RELATIONSHIP_TAU_DAYS)
    }

    /// Preference entities scored by `confidence x exp(-age / tau)`,
    /// optionally filtered by token overlap with `domain`
    pub fn get_preferences(
        &self,
        domain: Option<&str>,
        namespace: &str,
    ) -> Result<Vec<(Entity, f64)>> {
        let now = Utc::now();
        let preferences = self.store.preferences(namespace)?;

        let domain_tokens: Vec<String> = domain
            .map(|d| {
                d.to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| t.len() > 1)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut scored: Vec<(Entity, f64)> = preferences
            .into_iter()
            .filter(|entity| {
                if domain_tokens.is_empty() {
                    return true;
                }
                let haystack = format!(
                    "{} {}",
                    entity.name.to_lowercase(),
                    entity.description.as_deref().unwrap_or("").to_lowercase()
                );
                domain_tokens.iter().any(|t| haystack.contains(t.as_str()))
            })
            .map(|entity| {
                let age_days =
                    (now - entity.last_accessed).num_seconds().max(0) as f64 / 86_400.0;
                let score = entity.confidence * (-age_days / PREFERENCE_TAU_DAYS).exp();
                (entity, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    /// Recent durable rows by creation time, newest first, capped at 20
    pub fn get_by_time_range(
        &self,
        namespace: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<MemoryRecord>> {
        self.store.memories_by_time_range(namespace, start, end)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tier() -> (SemanticMemory, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open(&dir.path().join("test.db")).unwrap());
        (SemanticMemory::new(store), dir)
    }

    fn entity(tier: &SemanticMemory, name: &str, namespace: &str) -> Entity {
        tier.upsert_entity(
            &EntityInput {
                name: name.into(),
                entity_type: "concept".into(),
                ..Default::default()
            },
            namespace,
        )
        .unwrap()
    }

    fn link(tier: &SemanticMemory, from: &Entity, to: &Entity, strength: f64, namespace: &str) {
        tier.upsert_relationship(
            &RelationshipInput {
                source_id: from.id.clone(),
                target_id: to.id.clone(),
                relation_type: "related_to".into(),
                strength: Some(strength),
                evidence: None,
            },
            namespace,
        )
        .unwrap();
    }

    #[test]
    fn test_pagerank_seed_scores_one() {
        let (tier, _dir) = tier();
        let a = entity(&tier, "A", "g");
        let b = entity(&tier, "B", "g");
        link(&tier, &a, &b, 0.8, "g");

        let ranked = tier.personalized_page_rank(&a.id, 2, "g").unwrap();
        assert_eq!(ranked[0].entity.id, a.id);
        assert_eq!(ranked[0].score, 1.0);
        assert_eq!(ranked[1].entity.id, b.id);
        assert!((ranked[1].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_pagerank_attenuates_and_prunes() {
        let (tier, _dir) = tier();
        let a = entity(&tier, "A", "g");
        let b = entity(&tier, "B", "g");
        let c = entity(&tier, "C", "g");
        let d = entity(&tier, "D", "g");
        link(&tier, &a, &b, 0.5, "g");
        link(&tier, &b, &c, 0.5, "g");
        // 1.0 * 0.5 * 0.5 = 0.25 survives; one more 0.3 hop would not
        link(&tier, &c, &d, 0.3, "g");

        let ranked = tier.personalized_page_rank(&a.id, 3, "g").unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.entity.id.as_str()).collect();
        assert!(ids.contains(&c.id.as_str()));
        // 0.25 * 0.3 = 0.075 < 0.1, pruned
        assert!(!ids.contains(&d.id.as_str()));

        // Descending score order
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_pagerank_depth_bound() {
        let (tier, _dir) = tier();
        let a = entity(&tier, "A", "g");
        let b = entity(&tier, "B", "g");
        let c = entity(&tier, "C", "g");
        link(&tier, &a, &b, 0.9, "g");
        link(&tier, &b, &c, 0.9, "g");

        let ranked = tier.personalized_page_rank(&a.id, 1, "g").unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.entity.id.as_str()).collect();
        assert!(ids.contains(&b.id.as_str()));
        assert!(!ids.contains(&c.id.as_str()));
    }

    #[test]
    fn test_pagerank_terminates_on_cycles() {
        let (tier, _dir) = tier();
        let a = entity(&tier, "A", "g");
        let b = entity(&tier, "B", "g");
        link(&tier, &a, &b, 0.9, "g");
        link(&tier, &b, &a, 0.9, "g");

        // A cycle with a generous depth must terminate and keep scores <= 1
        let ranked = tier.personalized_page_rank(&a.id, 50, "g").unwrap();
        assert_eq!(ranked.len(), 2);
        for node in &ranked {
            assert!(node.score <= 1.0);
        }
    }

    #[test]
    fn test_pagerank_never_crosses_namespaces() {
        let (tier, _dir) = tier();
        let a = entity(&tier, "A", "one");
        let b = entity(&tier, "B", "one");
        link(&tier, &a, &b, 0.9, "one");
        entity(&tier, "Foreign", "two");

        let ranked = tier.personalized_page_rank(&a.id, 3, "one").unwrap();
        for node in &ranked {
            assert_eq!(node.entity.namespace, "one");
        }

        // Seeding from a namespace the entity is not in yields nothing
        assert!(tier.personalized_page_rank(&a.id, 3, "two").unwrap().is_empty());
    }

    #[test]
    fn test_preferences_scored_and_filtered() {
        let (tier, _dir) = tier();
        tier.upsert_entity(
            &EntityInput {
                name: "coffee preference".into(),
                entity_type: "preference".into(),
                description: Some("prefers dark roast coffee".into()),
                confidence: Some(0.9),
            },
            "p",
        )
        .unwrap();
        tier.upsert_entity(
            &EntityInput {
                name: "coding style".into(),
                entity_type: "preference".into(),
                description: Some("prefers functional style".into()),
                confidence: Some(0.8),
            },
            "p",
        )
        .unwrap();
        entity(&tier, "not a preference", "p");

        let all = tier.get_preferences(None, "p").unwrap();
        assert_eq!(all.len(), 2);
        // Fresh rows: score is approximately the confidence
        assert!(all[0].1 <= all[0].0.confidence + 1e-9);

        let coffee = tier.get_preferences(Some("coffee"), "p").unwrap();
        assert_eq!(coffee.len(), 1);
        assert_eq!(coffee[0].0.name, "coffee preference");
    }

    #[test]
    fn test_time_range_capped() {
        let (tier, _dir) = tier();
        let store = Arc::clone(&tier.store);
        for i in 0..25 {
            let record = MemoryRecord::new(format!("m{i}"), Default::default(), "t");
            store.insert_memory(&record).unwrap();
        }
        let rows = tier.get_by_time_range("t", None, None).unwrap();
        assert_eq!(rows.len(), 20);
    }
}
