//! Journey Tests
//!
//! Complete workflows across tiers: conversations consolidating into the
//! graph and then answering queries, and the full skill lifecycle from
//! proposal through invocation and feedback.

use serde_json::json;
use vesper_core::{PassageSource, QueryClass, WorkingRecord};
use vesper_e2e::TestEngine;

#[tokio::test]
async fn conversations_consolidate_and_answer_queries() {
    let engine = TestEngine::new().await;
    let working = engine.vesper.working();

    // A few conversations land in the working tier
    let mut r1 = WorkingRecord::new("conv-1", "Alice works on Apollo. Apollo uses Postgres.");
    r1.key_entities = vec!["Alice".into(), "Apollo".into()];
    working.store("team", &r1).await.unwrap();

    let mut r2 = WorkingRecord::new("conv-2", "Alice's editor is vim");
    r2.user_intent = "note a preference".into();
    working.store("team", &r2).await.unwrap();

    // Nightly consolidation promotes them into the graph
    let stats = engine.vesper.consolidate_now().await.unwrap();
    assert_eq!(stats.memories_processed, 2);
    assert!(stats.entities_created >= 3);
    assert!(stats.relationships_created >= 2);

    // A factual query now answers from the entity graph, no hybrid call
    let passages = engine.retrieve("Who is Alice?", "team").await.unwrap();
    assert!(!passages.is_empty());
    assert_eq!(passages[0].source, PassageSource::Semantic);
    assert!(passages[0].content.contains("editor = vim"));

    // A project query walks the graph from the named entity
    let passages = engine.retrieve("What is the status of Apollo", "team").await.unwrap();
    assert!(!passages.is_empty());
    assert!(passages.iter().any(|p| p.content.contains("Postgres")));

    // Consolidation again is idempotent enough not to duplicate entities
    let entity_count = engine.vesper.store().entity_count("team").unwrap();
    engine.vesper.consolidate_now().await.unwrap();
    assert_eq!(engine.vesper.store().entity_count("team").unwrap(), entity_count);
}

#[tokio::test]
async fn skill_lifecycle_from_proposal_to_feedback() {
    let engine = TestEngine::new().await;
    let working = engine.vesper.working();

    // A procedural conversation proposes a skill
    let mut record = WorkingRecord::new("conv-1", "How to deploy the staging stack: build, push, roll.");
    record.user_intent = "how to deploy the staging stack".into();
    working.store("ops", &record).await.unwrap();

    let stats = engine.vesper.consolidate_now().await.unwrap();
    assert_eq!(stats.skills_proposed, 1);

    // Catalog query returns the summary projection
    let summaries = engine.vesper.skills().get_summaries(10, None, "ops").unwrap();
    assert_eq!(summaries.len(), 1);
    let skill_id = summaries[0].id.clone();

    // Invocation loads the full row and caches it
    let loaded = engine.vesper.load_skill(&skill_id, "ops").await.unwrap().unwrap();
    assert!(loaded.skill.description.contains("build, push, roll"));
    let cached = engine.vesper.load_skill(&skill_id, "ops").await.unwrap().unwrap();
    assert!(cached.access_count >= 1);

    // Feedback moves the quality score
    let before = engine.vesper.store().get_skill(&skill_id, "ops").unwrap().unwrap();
    let input = vesper_core::parse_record_skill_outcome(json!({
        "skill_id": skill_id,
        "outcome": "success",
        "satisfaction": 1.0,
    }))
    .unwrap();
    assert!(engine.vesper.record_skill_outcome(input).await.unwrap());
    let after = engine.vesper.store().get_skill(&skill_id, "ops").unwrap().unwrap();
    assert_eq!(after.success_count, before.success_count + 1);
    assert!(after.quality_score() > before.quality_score());

    // "like before" now resolves to the skill we just used
    let detected = engine
        .vesper
        .skills()
        .detect_invocation("do it like before", "ops")
        .unwrap();
    assert!(detected.is_invocation);
    assert_eq!(detected.skill_id.as_deref(), Some(skill_id.as_str()));
}

#[tokio::test]
async fn temporal_query_spans_working_and_durable_tiers() {
    let engine = TestEngine::new().await;

    engine.store("Shipped the beta", "episodic", "t").await.unwrap();
    engine
        .vesper
        .working()
        .store("t", &WorkingRecord::new("conv-1", "Discussed launch timing"))
        .await
        .unwrap();

    assert_eq!(
        vesper_core::classify("What was discussed yesterday?").query_class,
        QueryClass::Temporal
    );
    let passages = engine.retrieve("What was discussed yesterday?", "t").await.unwrap();

    let sources: Vec<PassageSource> = passages.iter().map(|p| p.source).collect();
    assert!(sources.contains(&PassageSource::Working));
    assert!(sources.contains(&PassageSource::Episodic));
}
