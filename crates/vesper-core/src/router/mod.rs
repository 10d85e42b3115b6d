//! Smart Router
//!
//! Classifies a query and dispatches to the cheapest sufficient retrieval
//! path. Preference and factual lookups never touch the embedder; only
//! COMPLEX queries (and factual misses) pay for hybrid search.

mod classify;

pub use classify::{classify, extract_domain, extract_entity_name, Classification, QueryClass};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;
use crate::model::{MemoryRecord, MemoryType, PassageSource, ScoredPassage};
use crate::search::HybridSearch;
use crate::tiers::{SemanticMemory, SkillLibrary, WorkingMemory};

/// TTL for skills cached on invocation
const INVOKED_SKILL_TTL: Duration = Duration::from_secs(300);

/// Traversal depth for project queries
const PROJECT_PAGERANK_DEPTH: usize = 2;

/// Query dispatcher over the three tiers and the hybrid engine
pub struct SmartRouter {
    working: Arc<WorkingMemory>,
    semantic: Arc<SemanticMemory>,
    skills: Arc<SkillLibrary>,
    hybrid: Arc<HybridSearch>,
}

fn memory_source(memory_type: MemoryType) -> PassageSource {
    match memory_type {
        MemoryType::Episodic => PassageSource::Episodic,
        MemoryType::Procedural => PassageSource::Procedural,
        MemoryType::Semantic | MemoryType::Decision => PassageSource::Semantic,
    }
}

fn memory_passage(record: &MemoryRecord, rank: usize) -> ScoredPassage {
    ScoredPassage {
        id: record.id.clone(),
        content: record.content.clone(),
        similarity: 1.0 / (rank as f64 + 1.0),
        source: memory_source(record.memory_type),
        timestamp: record.created_at,
    }
}

impl SmartRouter {
    pub fn new(
        working: Arc<WorkingMemory>,
        semantic: Arc<SemanticMemory>,
        skills: Arc<SkillLibrary>,
        hybrid: Arc<HybridSearch>,
    ) -> Self {
        Self {
            working,
            semantic,
            skills,
            hybrid,
        }
    }

    /// Classify and dispatch a retrieval query within `namespace`
    pub async fn retrieve(
        &self,
        namespace: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let classification = classify(query);
        tracing::debug!(
            class = classification.query_class.as_str(),
            confidence = classification.confidence,
            "query classified"
        );

        let mut passages = match classification.query_class {
            QueryClass::Factual => self.retrieve_factual(namespace, query, max_results).await?,
            QueryClass::Preference => self.retrieve_preference(namespace, query)?,
            QueryClass::Project => self.retrieve_project(namespace, query, max_results).await?,
            QueryClass::Temporal => self.retrieve_temporal(namespace, max_results).await?,
            QueryClass::Skill => self.retrieve_skill(namespace, query, max_results).await?,
            QueryClass::Complex => {
                self.hybrid.search(namespace, query, Some(max_results)).await?
            }
        };

        passages.truncate(max_results);
        Ok(passages)
    }

    /// Entity lookup; hybrid search on a miss
    async fn retrieve_factual(
        &self,
        namespace: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ScoredPassage>> {
        if let Some(name) = extract_entity_name(query) {
            if let Some(entity) = self.semantic.get_entity(&name, namespace)? {
                let facts = self.semantic.facts_for_entity(&entity.id, namespace)?;
                let mut content = entity.name.clone();
                if let Some(description) = &entity.description {
                    content.push_str(": ");
                    content.push_str(description);
                }
                for fact in &facts {
                    content.push_str(&format!("; {} = {}", fact.property, fact.value));
                }
                return Ok(vec![ScoredPassage {
                    id: entity.id.clone(),
                    content,
                    similarity: entity.confidence.clamp(f64::MIN_POSITIVE, 1.0),
                    source: PassageSource::Semantic,
                    timestamp: entity.last_accessed,
                }]);
            }
        }
        self.hybrid.search(namespace, query, Some(max_results)).await
    }

    /// Direct indexed scan of preference entities; no embedding calls
    fn retrieve_preference(&self, namespace: &str, query: &str) -> Result<Vec<ScoredPassage>> {
        let domain = extract_domain(query);
        let preferences = self
            .semantic
            .get_preferences(domain.as_deref(), namespace)?;
        let top = preferences.first().map(|(_, s)| *s).unwrap_or(1.0).max(f64::MIN_POSITIVE);

        Ok(preferences
            .into_iter()
            .map(|(entity, score)| ScoredPassage {
                content: match &entity.description {
                    Some(description) => format!("{}: {}", entity.name, description),
                    None => entity.name.clone(),
                },
                similarity: (score / top).clamp(f64::MIN_POSITIVE, 1.0),
                source: PassageSource::Semantic,
                timestamp: entity.last_accessed,
                id: entity.id,
            })
            .collect())
    }

    /// Personalized PageRank seeded at the entity named in the query
    async fn retrieve_project(
        &self,
        namespace: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let Some(name) = extract_entity_name(query) else {
            return self.hybrid.search(namespace, query, Some(max_results)).await;
        };
        let Some(seed) = self.semantic.get_entity(&name, namespace)? else {
            return self.hybrid.search(namespace, query, Some(max_results)).await;
        };

        let ranked = self
            .semantic
            .personalized_page_rank(&seed.id, PROJECT_PAGERANK_DEPTH, namespace)?;
        Ok(ranked
            .into_iter()
            .map(|node| ScoredPassage {
                content: match &node.entity.description {
                    Some(description) => format!("{}: {}", node.entity.name, description),
                    None => node.entity.name.clone(),
                },
                similarity: node.score.clamp(f64::MIN_POSITIVE, 1.0),
                source: PassageSource::Semantic,
                timestamp: node.entity.last_accessed,
                id: node.entity.id,
            })
            .collect())
    }

    /// Recent working-tier records plus recent durable rows
    async fn retrieve_temporal(
        &self,
        namespace: &str,
        max_results: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let mut passages = Vec::new();

        let recent = self.working.get_recent(namespace, max_results).await?;
        for (rank, record) in recent.iter().enumerate() {
            passages.push(ScoredPassage {
                id: record.conversation_id.clone(),
                content: record.full_text.clone(),
                similarity: 1.0 / (rank as f64 + 1.0),
                source: PassageSource::Working,
                timestamp: record.timestamp,
            });
        }

        let offset = passages.len();
        let rows = self.semantic.get_by_time_range(namespace, None, None)?;
        for (rank, record) in rows.iter().enumerate() {
            passages.push(memory_passage(record, offset + rank));
        }
        Ok(passages)
    }

    /// Invocation detection; catalog search with summaries otherwise
    async fn retrieve_skill(
        &self,
        namespace: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let detected = self.skills.detect_invocation(query, namespace)?;
        if detected.is_invocation {
            if let Some(skill_id) = &detected.skill_id {
                if let Some(skill) = self.skills.load_full(skill_id, namespace)? {
                    self.working.cache_skill(&skill, INVOKED_SKILL_TTL).await?;
                    return Ok(vec![ScoredPassage {
                        id: skill.id.clone(),
                        content: format!("{}: {}", skill.name, skill.description),
                        similarity: detected.confidence.clamp(f64::MIN_POSITIVE, 1.0),
                        source: PassageSource::Procedural,
                        timestamp: skill.last_used.unwrap_or_else(Utc::now),
                    }]);
                }
            }
        }

        // Catalog-style query: summaries only, never the full rows
        let summaries = self.skills.search(query, max_results, namespace)?;
        Ok(summaries
            .into_iter()
            .enumerate()
            .map(|(rank, summary)| ScoredPassage {
                content: format!("{}: {}", summary.name, summary.summary),
                similarity: 1.0 / (rank as f64 + 1.0),
                source: PassageSource::Procedural,
                timestamp: Utc::now(),
                id: summary.id,
            })
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::embed::LocalEmbedder;
    use crate::model::{EntityInput, SkillSpec};
    use crate::storage::MemoryStore;
    use crate::vector::MemoryVectorStore;

    struct Fixture {
        router: SmartRouter,
        semantic: Arc<SemanticMemory>,
        skills: Arc<SkillLibrary>,
        working: Arc<WorkingMemory>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::open(&dir.path().join("test.db")).unwrap());
        let semantic = Arc::new(SemanticMemory::new(Arc::clone(&store)));
        let skills = Arc::new(SkillLibrary::new(Arc::clone(&store)));
        let working = Arc::new(WorkingMemory::new(
            Arc::new(MemoryCache::new()),
            Arc::new(MemoryCache::new()),
            5,
        ));
        let hybrid = Arc::new(HybridSearch::new(
            Arc::new(MemoryVectorStore::new(1024)),
            Arc::new(LocalEmbedder::default()),
            Arc::new(MemoryCache::new()),
        ));
        let router = SmartRouter::new(
            Arc::clone(&working),
            Arc::clone(&semantic),
            Arc::clone(&skills),
            hybrid,
        );
        Fixture {
            router,
            semantic,
            skills,
            working,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_factual_entity_lookup() {
        let f = fixture();
        f.semantic
            .upsert_entity(
                &EntityInput {
                    name: "Alice".into(),
                    entity_type: "person".into(),
                    description: Some("team lead".into()),
                    confidence: Some(0.9),
                },
                "default",
            )
            .unwrap();

        let passages = f.router.retrieve("default", "Who is Alice?", 5).await.unwrap();
        assert_eq!(passages.len(), 1);
        assert!(passages[0].content.contains("team lead"));
        assert_eq!(passages[0].source, PassageSource::Semantic);
    }

    #[tokio::test]
    async fn test_factual_miss_falls_back_to_hybrid() {
        let f = fixture();
        // No entities, no vectors: hybrid returns empty rather than erroring
        let passages = f.router.retrieve("default", "Who is Zorblax?", 5).await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn test_preference_dispatch() {
        let f = fixture();
        f.semantic
            .upsert_entity(
                &EntityInput {
                    name: "coding style".into(),
                    entity_type: "preference".into(),
                    description: Some("functional, heavy on iterators".into()),
                    confidence: Some(0.9),
                },
                "default",
            )
            .unwrap();

        let passages = f
            .router
            .retrieve("default", "What's my coding style?", 5)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert!(passages[0].content.contains("functional"));
        assert!(passages[0].similarity > 0.0 && passages[0].similarity <= 1.0);
    }

    #[tokio::test]
    async fn test_temporal_includes_working_records() {
        let f = fixture();
        f.working
            .store("default", &crate::model::WorkingRecord::new("c1", "Discussed the launch"))
            .await
            .unwrap();

        let passages = f
            .router
            .retrieve("default", "What was discussed yesterday?", 5)
            .await
            .unwrap();
        assert!(!passages.is_empty());
        assert_eq!(passages[0].source, PassageSource::Working);
        assert_eq!(passages[0].content, "Discussed the launch");
    }

    #[tokio::test]
    async fn test_skill_invocation_loads_and_caches() {
        let f = fixture();
        let id = f
            .skills
            .add_skill(
                &SkillSpec {
                    name: "quarterly analysis".into(),
                    description: "Run the quarterly analysis.".into(),
                    ..Default::default()
                },
                "default",
            )
            .unwrap();
        f.skills.load_full(&id, "default").unwrap();

        let passages = f
            .router
            .retrieve("default", "Analyze this like before", 5)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].id, id);
        assert_eq!(passages[0].source, PassageSource::Procedural);

        // Invocation populated the skill sub-cache
        let cached = f.working.get_cached_skill(&id).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_skill_catalog_returns_summaries() {
        let f = fixture();
        f.skills
            .add_skill(
                &SkillSpec {
                    name: "report builder".into(),
                    description: "Builds reports. Many details here that stay out of the catalog.".into(),
                    ..Default::default()
                },
                "default",
            )
            .unwrap();

        let passages = f
            .router
            .retrieve("default", "what skills can build a report", 5)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert!(passages[0].content.contains("Builds reports."));
        assert!(!passages[0].content.contains("stay out of the catalog"));
    }

    #[tokio::test]
    async fn test_max_results_cap() {
        let f = fixture();
        for i in 0..10 {
            f.working
                .store(
                    "default",
                    &crate::model::WorkingRecord::new(format!("c{i}"), "Discussed things"),
                )
                .await
                .unwrap();
        }
        let passages = f
            .router
            .retrieve("default", "what did we discuss recently", 3)
            .await
            .unwrap();
        assert!(passages.len() <= 3);
    }
}
