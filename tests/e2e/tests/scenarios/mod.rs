//! Scenario Tests
//!
//! Literal end-to-end checks: wait-for-commit reads, namespace isolation,
//! decision supersede chains, classifier dispatch, context sharing, and
//! limiter fail-closed behaviour.

use std::time::Duration;

use serde_json::json;
use vesper_core::{
    classify, Config, EntityInput, MemoryVectorStore, QueryClass, RateLimiter, RedisCache,
    VectorStore, VesperError, EMBEDDING_DIM,
};
use vesper_e2e::{scenario_vector, TestEngine};

// ============================================================================
// S1: WAIT-FOR-COMMIT
// ============================================================================

#[tokio::test]
async fn s1_upsert_is_immediately_searchable() {
    let store = MemoryVectorStore::new(EMBEDDING_DIM);
    store.initialize_collection(EMBEDDING_DIM).await.unwrap();

    let v = scenario_vector(EMBEDDING_DIM);
    store
        .upsert("u1", &v, json!({"content": "hi", "namespace": "default"}))
        .await
        .unwrap();

    let hits = store.dense_search(&v, 5, "default").await.unwrap();
    assert_eq!(hits[0].id, "u1");
    assert!(hits[0].score >= 0.99);
    assert_eq!(hits[0].payload["content"], "hi");
}

// ============================================================================
// S2: NAMESPACE ISOLATION
// ============================================================================

#[tokio::test]
async fn s2_entities_and_traversal_stay_in_namespace() {
    let engine = TestEngine::new().await;
    let semantic = engine.vesper.semantic();

    semantic
        .upsert_entity(
            &EntityInput {
                name: "Python".into(),
                entity_type: "concept".into(),
                ..Default::default()
            },
            "A",
        )
        .unwrap();
    semantic
        .upsert_entity(
            &EntityInput {
                name: "Python".into(),
                entity_type: "concept".into(),
                description: Some("snake".into()),
                ..Default::default()
            },
            "B",
        )
        .unwrap();

    let b = semantic.get_entity("Python", "B").unwrap().unwrap();
    assert_eq!(b.description.as_deref(), Some("snake"));
    let a = semantic.get_entity("Python", "A").unwrap().unwrap();
    assert_ne!(a.description.as_deref(), Some("snake"));

    // Seed a graph in A and verify the traversal never yields a B node
    let seed = semantic
        .upsert_entity(
            &EntityInput {
                name: "Seed".into(),
                entity_type: "project".into(),
                ..Default::default()
            },
            "A",
        )
        .unwrap();
    semantic
        .upsert_relationship(
            &vesper_core::RelationshipInput {
                source_id: seed.id.clone(),
                target_id: a.id.clone(),
                relation_type: "related_to".into(),
                strength: Some(0.9),
                evidence: None,
            },
            "A",
        )
        .unwrap();

    let ranked = semantic.personalized_page_rank(&seed.id, 3, "A").unwrap();
    assert!(!ranked.is_empty());
    for node in ranked {
        assert_eq!(node.entity.namespace, "A");
    }
}

// ============================================================================
// S3: DECISION SUPERSEDE
// ============================================================================

#[tokio::test]
async fn s3_decision_supersede_chain() {
    let engine = TestEngine::new().await;

    let first = engine
        .vesper
        .store_decision(
            vesper_core::parse_store_decision(json!({"content": "Use JS", "namespace": "d"}))
                .unwrap(),
        )
        .await
        .unwrap();

    let second = engine
        .vesper
        .store_decision(
            vesper_core::parse_store_decision(json!({
                "content": "Use TS",
                "supersedes": first.decision_id,
                "namespace": "d",
            }))
            .unwrap(),
        )
        .await
        .unwrap();

    let old = engine
        .vesper
        .store()
        .get_memory(&first.decision_id, "d")
        .unwrap()
        .unwrap();
    assert_eq!(old.metadata["superseded_by"], json!(second.decision_id));

    let new = engine
        .vesper
        .store()
        .get_memory(&second.decision_id, "d")
        .unwrap()
        .unwrap();
    assert_eq!(new.metadata["supersedes"], json!(first.decision_id));

    // JS decision is superseded, so the exclusive-topic table does not fire
    assert_eq!(second.conflicts_detected, 0);
}

// ============================================================================
// S4: CLASSIFIER
// ============================================================================

#[test]
fn s4_classifier_dispatch() {
    assert_eq!(classify("What's my coding style?").query_class, QueryClass::Preference);
    assert_eq!(
        classify("What was discussed yesterday?").query_class,
        QueryClass::Temporal
    );
    assert_eq!(classify("Analyze this like before").query_class, QueryClass::Skill);
}

// ============================================================================
// S5: SHARE CONTEXT
// ============================================================================

#[tokio::test]
async fn s5_share_context_handoff() {
    let engine = TestEngine::new().await;
    engine.store("first note", "episodic", "a").await.unwrap();
    engine.store("second note", "semantic", "a").await.unwrap();
    engine
        .vesper
        .semantic()
        .upsert_entity(
            &EntityInput {
                name: "Apollo".into(),
                entity_type: "project".into(),
                ..Default::default()
            },
            "a",
        )
        .unwrap();

    let outcome = engine
        .vesper
        .share_context(
            vesper_core::parse_share_context(json!({
                "source_namespace": "a",
                "target_namespace": "b",
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.memories, 2);
    assert_eq!(outcome.entities, 1);

    // Exactly one new episodic row in b carrying the provenance metadata
    let rows = engine.vesper.store().list_recent("b", 10, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].memory_type, vesper_core::MemoryType::Episodic);
    assert_eq!(rows[0].metadata["source_namespace"], json!("a"));
    assert_eq!(rows[0].metadata["memories_shared"], json!(2));

    // a unchanged
    assert_eq!(engine.vesper.store().memory_count("a").unwrap(), 2);
}

// ============================================================================
// S6: RATE LIMITER FAIL-CLOSED
// ============================================================================

fn unreachable_cache() -> std::sync::Arc<RedisCache> {
    // Port 1 refuses connections; the limiter's control store is down
    std::sync::Arc::new(RedisCache::new(
        "127.0.0.1",
        1,
        None,
        0,
        Duration::from_millis(200),
    ))
}

#[tokio::test]
async fn s6_fail_closed_raises_503() {
    let config = Config::default();
    let limiter = RateLimiter::new(unreachable_cache(), &config);

    let err = limiter.check_limit("u", "store_memory").await.unwrap_err();
    match err {
        VesperError::RateLimited {
            status_code,
            retry_after,
            ..
        } => {
            assert_eq!(status_code, 503);
            assert!(retry_after > Duration::ZERO);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_fail_open_bypasses() {
    let config = Config {
        rate_limit_fail_open: true,
        ..Config::default()
    };
    let limiter = RateLimiter::new(unreachable_cache(), &config);

    let decision = limiter.check_limit("u", "store_memory").await.unwrap();
    assert!(decision.allowed);
    assert!(decision
        .headers
        .iter()
        .any(|(name, value)| name == "X-RateLimit-Bypass" && value == "true"));
}
