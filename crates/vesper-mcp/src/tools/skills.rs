//! Skill Tools: record_skill_outcome, load_skill

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{disabled_response, rate_gate, subject_from_args};

/// Input schema for `record_skill_outcome`
pub fn outcome_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "skill_id": {
                "type": "string",
                "description": "UUID of the skill"
            },
            "outcome": {
                "type": "string",
                "enum": ["success", "failure"],
                "description": "How the invocation went"
            },
            "satisfaction": {
                "type": "number",
                "minimum": 0,
                "maximum": 1,
                "description": "User satisfaction; required with outcome 'success'"
            }
        },
        "required": ["skill_id", "outcome"]
    })
}

/// Input schema for `load_skill`
pub fn load_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "skill_id": {
                "type": "string",
                "description": "UUID of the skill to load in full"
            },
            "namespace": { "type": "string" }
        },
        "required": ["skill_id"]
    })
}

/// Execute `record_skill_outcome`
pub async fn execute_outcome(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_record_skill_outcome(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "record_skill_outcome").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(disabled_response());
    }

    let skill_id = input.skill_id.clone();
    let outcome = if input.success { "success" } else { "failure" };
    let updated = vesper
        .record_skill_outcome(input)
        .await
        .map_err(|e| e.to_string())?;

    if updated {
        Ok(json!({"success": true, "skillId": skill_id, "outcome": outcome}))
    } else {
        Ok(json!({
            "success": false,
            "skillId": skill_id,
            "message": "Skill not found",
        }))
    }
}

/// Execute `load_skill`. Two-phase loading: this is the full-row phase,
/// served from the sub-cache when warm.
pub async fn execute_load(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_load_skill(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "load_skill").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(json!({"success": false, "message": "Vesper is disabled. Enable it with vesper_enable."}));
    }

    match vesper
        .load_skill(&input.skill_id, &input.namespace)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(cached) => Ok(json!({
            "success": true,
            "cacheHits": cached.access_count,
            "skill": cached.skill,
        })),
        None => Ok(json!({
            "success": false,
            "skillId": input.skill_id,
            "message": "Skill not found",
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_vesper;
    use vesper_core::SkillSpec;

    async fn seeded_skill(vesper: &Arc<Vesper>) -> String {
        vesper
            .skills()
            .add_skill(
                &SkillSpec {
                    name: "weekly report".into(),
                    description: "Generate the weekly report. Fetch data, render, send.".into(),
                    triggers: vec!["weekly report".into()],
                    ..Default::default()
                },
                "default",
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_load_skill_full_row() {
        let (vesper, _dir) = test_vesper().await;
        let id = seeded_skill(&vesper).await;

        let result = execute_load(&vesper, Some(json!({"skill_id": id}))).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["skill"]["name"], "weekly report");
        assert!(result["skill"]["description"].as_str().unwrap().contains("Fetch data"));

        // Second load is a cache hit
        let again = execute_load(&vesper, Some(json!({"skill_id": id}))).await.unwrap();
        assert!(again["cacheHits"].as_i64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_load_skill_not_found() {
        let (vesper, _dir) = test_vesper().await;
        let result = execute_load(&vesper, Some(json!({"skill_id": "nope"}))).await.unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["message"], "Skill not found");
    }

    #[tokio::test]
    async fn test_outcome_success_and_failure() {
        let (vesper, _dir) = test_vesper().await;
        let id = seeded_skill(&vesper).await;

        let result = execute_outcome(
            &vesper,
            Some(json!({"skill_id": id, "outcome": "success", "satisfaction": 0.9})),
        )
        .await
        .unwrap();
        assert_eq!(result["success"], true);

        let result = execute_outcome(
            &vesper,
            Some(json!({"skill_id": id, "outcome": "failure"})),
        )
        .await
        .unwrap();
        assert_eq!(result["success"], true);

        let skill = vesper.store().get_skill(&id, "default").unwrap().unwrap();
        assert_eq!(skill.success_count, 1);
        assert_eq!(skill.failure_count, 1);
    }

    #[tokio::test]
    async fn test_outcome_validation() {
        let (vesper, _dir) = test_vesper().await;
        // Satisfaction required with success
        assert!(execute_outcome(
            &vesper,
            Some(json!({"skill_id": "s", "outcome": "success"}))
        )
        .await
        .is_err());
        // ...and rejected with failure
        assert!(execute_outcome(
            &vesper,
            Some(json!({"skill_id": "s", "outcome": "failure", "satisfaction": 0.5}))
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn test_outcome_unknown_skill() {
        let (vesper, _dir) = test_vesper().await;
        let result = execute_outcome(
            &vesper,
            Some(json!({"skill_id": "missing", "outcome": "failure"})),
        )
        .await
        .unwrap();
        assert_eq!(result["success"], false);
    }
}
