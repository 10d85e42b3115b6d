//! Invariant Tests
//!
//! Properties that must hold for every reachable state: namespace
//! isolation everywhere, working-tier bounds, reinforcement monotonicity,
//! traversal score bounds, delete idempotence, conflict store-once, and
//! exact sliding-window limits.

use serde_json::json;
use vesper_core::{
    Config, EntityInput, MemoryCache, RateLimiter, RelationshipInput, WorkingRecord,
};
use vesper_e2e::TestEngine;

// ============================================================================
// 1: NAMESPACE ISOLATION ACROSS EVERY READ PATH
// ============================================================================

#[tokio::test]
async fn namespace_isolation_holds_across_stores() {
    let engine = TestEngine::new().await;
    let id = engine.store("secret plans", "semantic", "private").await.unwrap();
    engine
        .vesper
        .semantic()
        .upsert_entity(
            &EntityInput {
                name: "Secret".into(),
                entity_type: "project".into(),
                ..Default::default()
            },
            "private",
        )
        .unwrap();
    engine
        .vesper
        .skills()
        .add_skill(
            &vesper_core::SkillSpec {
                name: "secret skill".into(),
                description: "Hidden procedure.".into(),
                ..Default::default()
            },
            "private",
        )
        .unwrap();

    // Every read in another namespace comes back empty
    let passages = engine.retrieve("secret plans project", "other").await.unwrap();
    assert!(passages.iter().all(|p| p.id != id));
    assert!(engine.vesper.store().get_memory(&id, "other").unwrap().is_none());
    assert!(engine.vesper.semantic().get_entity("Secret", "other").unwrap().is_none());
    assert!(engine.vesper.store().skills("other").unwrap().is_empty());
    assert_eq!(engine.vesper.store().list_recent("other", 10, None).unwrap().len(), 0);

    // The owning namespace sees everything
    assert!(engine.vesper.store().get_memory(&id, "private").unwrap().is_some());
}

// ============================================================================
// 2: WORKING TIER BOUNDS
// ============================================================================

#[tokio::test]
async fn working_tier_never_exceeds_capacity_and_evicts_oldest() {
    let engine = TestEngine::new().await;
    let working = engine.vesper.working();
    let capacity = working.capacity();

    let mut timestamps = Vec::new();
    for i in 0..capacity + 3 {
        let mut record = WorkingRecord::new(format!("c{i}"), format!("conversation {i}"));
        record.timestamp = chrono::Utc::now() + chrono::Duration::milliseconds(i as i64);
        timestamps.push((record.conversation_id.clone(), record.timestamp));
        working.store("wm", &record).await.unwrap();

        let held = working.get_recent("wm", capacity + 10).await.unwrap();
        assert!(held.len() <= capacity);
    }

    // Survivors are exactly the newest `capacity` records
    let held = working.get_recent("wm", capacity + 10).await.unwrap();
    let held_ids: Vec<&str> = held.iter().map(|r| r.conversation_id.as_str()).collect();
    timestamps.sort_by_key(|(_, ts)| *ts);
    for (id, _) in timestamps.iter().rev().take(capacity) {
        assert!(held_ids.contains(&id.as_str()));
    }
    for (id, _) in timestamps.iter().take(timestamps.len() - capacity) {
        assert!(!held_ids.contains(&id.as_str()));
    }
}

// ============================================================================
// 3: REINFORCEMENT STAYS IN [PRIOR, 1]
// ============================================================================

#[tokio::test]
async fn reinforcement_is_monotone_and_bounded() {
    let engine = TestEngine::new().await;
    let semantic = engine.vesper.semantic();
    let a = semantic
        .upsert_entity(
            &EntityInput {
                name: "A".into(),
                entity_type: "concept".into(),
                ..Default::default()
            },
            "g",
        )
        .unwrap();
    let b = semantic
        .upsert_entity(
            &EntityInput {
                name: "B".into(),
                entity_type: "concept".into(),
                ..Default::default()
            },
            "g",
        )
        .unwrap();

    let input = RelationshipInput {
        source_id: a.id,
        target_id: b.id,
        relation_type: "related_to".into(),
        strength: Some(0.3),
        evidence: None,
    };
    let mut prior = semantic.upsert_relationship(&input, "g").unwrap().strength;
    for _ in 0..100 {
        let strength = semantic.upsert_relationship(&input, "g").unwrap().strength;
        assert!(strength >= prior && strength <= 1.0);
        prior = strength;
    }
}

// ============================================================================
// 4: TRAVERSAL SCORES
// ============================================================================

#[tokio::test]
async fn pagerank_seed_is_one_and_results_pruned() {
    let engine = TestEngine::new().await;
    let semantic = engine.vesper.semantic();

    let seed = semantic
        .upsert_entity(
            &EntityInput {
                name: "Hub".into(),
                entity_type: "project".into(),
                ..Default::default()
            },
            "g",
        )
        .unwrap();
    let mut previous = seed.clone();
    for i in 0..5 {
        let next = semantic
            .upsert_entity(
                &EntityInput {
                    name: format!("Node{i}"),
                    entity_type: "concept".into(),
                    ..Default::default()
                },
                "g",
            )
            .unwrap();
        semantic
            .upsert_relationship(
                &RelationshipInput {
                    source_id: previous.id.clone(),
                    target_id: next.id.clone(),
                    relation_type: "chain".into(),
                    strength: Some(0.5),
                    evidence: None,
                },
                "g",
            )
            .unwrap();
        previous = next;
    }

    let ranked = semantic.personalized_page_rank(&seed.id, 10, "g").unwrap();
    assert_eq!(ranked[0].entity.id, seed.id);
    assert_eq!(ranked[0].score, 1.0);
    for node in &ranked {
        assert!(node.score >= 0.1);
        assert!(node.score <= 1.0);
    }
    // 0.5^3 = 0.125 survives, 0.5^4 = 0.0625 is pruned
    assert_eq!(ranked.len(), 4);
}

// ============================================================================
// 6: DELETE IDEMPOTENCE
// ============================================================================

#[tokio::test]
async fn delete_twice_reports_not_found() {
    let engine = TestEngine::new().await;
    let id = engine.store("temporary", "episodic", "default").await.unwrap();

    let first = engine.delete(&id, "default").await.unwrap();
    assert_eq!(first["success"], true);

    let second = engine.delete(&id, "default").await.unwrap();
    assert_eq!(second["success"], false);
    assert_eq!(second["message"], "Memory not found");
}

// ============================================================================
// 7: CONFLICTS STORED EXACTLY ONCE PER PAIR
// ============================================================================

#[tokio::test]
async fn conflict_pair_flagged_once_with_halved_confidence() {
    let engine = TestEngine::new().await;
    let store = engine.vesper.store();
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

    for value in ["vim", "emacs"] {
        store
            .insert_fact(&vesper_core::Fact {
                id: uuid::Uuid::new_v4().to_string(),
                entity_id: entity.id.clone(),
                property: "editor".into(),
                value: value.into(),
                confidence: 0.9,
                valid_from: None,
                valid_until: None,
                source_conversation: None,
                namespace: "c".into(),
            })
            .unwrap();
    }

    let detector = engine.vesper.conflicts();
    assert_eq!(detector.run("c").unwrap(), 1);
    assert_eq!(detector.run("c").unwrap(), 0);
    assert_eq!(detector.run("c").unwrap(), 0);

    for fact in store.facts_for_entity(&entity.id, "c").unwrap() {
        assert_eq!(fact.confidence, 0.5);
    }
    assert_eq!(store.conflicts("c").unwrap().len(), 1);
}

// ============================================================================
// 8: EXACT SLIDING-WINDOW LIMITS
// ============================================================================

#[tokio::test]
async fn exactly_limit_requests_succeed_within_window() {
    let config = Config::default();
    let limiter = RateLimiter::new(std::sync::Arc::new(MemoryCache::new()), &config);
    let limit = limiter.limit_for("store_memory");

    for _ in 0..limit {
        assert!(limiter.check_limit("u", "store_memory").await.unwrap().allowed);
    }
    let denied = limiter.check_limit("u", "store_memory").await.unwrap();
    assert!(!denied.allowed);

    let retry_after: u64 = denied
        .headers
        .iter()
        .find(|(name, _)| name == "Retry-After")
        .map(|(_, value)| value.parse().unwrap())
        .unwrap();
    assert!(retry_after <= 60);
}

// ============================================================================
// METADATA SANITY (share + decision payloads survive validation)
// ============================================================================

#[tokio::test]
async fn validation_rejects_oversized_metadata_before_any_tier() {
    let engine = TestEngine::new().await;
    let result = vesper_core::parse_store_memory(json!({
        "content": "x",
        "memory_type": "episodic",
        "metadata": {"blob": "y".repeat(11 * 1024)},
    }));
    assert!(result.is_err());
    // Nothing was written
    assert_eq!(engine.vesper.store().memory_count("default").unwrap(), 0);
}
