//! Skill Library Tier
//!
//! Two-phase catalog of procedural know-how. Summary projections satisfy
//! catalog queries; the full row (long description, code) is loaded only on
//! invocation, which also stamps `last_used`. Outcome counters feed the
//! quality score used for ranking.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::{Result, VesperError};
use crate::model::{InvocationMatch, Skill, SkillSpec, SkillSummary};
use crate::storage::MemoryStore;

/// Upper bound for a derived summary blurb
const SUMMARY_MAX_CHARS: usize = 200;

static REFERENCE_PREVIOUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(like before|like last time|same as (before|last time)|the usual way|as we did (before|last time))\b")
        .expect("valid regex")
});

/// Catalog of procedural skills with lazy full-row loading
pub struct SkillLibrary {
    store: Arc<MemoryStore>,
}

/// First sentence of the description, bounded, as a catalog blurb
fn derive_summary(description: &str) -> String {
    let first_sentence = description
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(description)
        .trim();
    if first_sentence.chars().count() <= SUMMARY_MAX_CHARS {
        first_sentence.to_string()
    } else {
        let truncated: String = first_sentence.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        format!("{truncated}...")
    }
}

/// Fraction of query tokens matched against a skill's name, triggers,
/// and category
fn match_score(query: &str, skill: &Skill) -> f64 {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let mut haystack = skill.name.to_lowercase();
    haystack.push(' ');
    haystack.push_str(&skill.category.to_lowercase());
    for trigger in &skill.triggers {
        haystack.push(' ');
        haystack.push_str(&trigger.to_lowercase());
    }

    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / tokens.len() as f64
}

impl SkillLibrary {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Add a skill to the namespace's catalog, deriving the summary from
    /// the description when none is given. Names are unique per namespace.
    pub fn add_skill(&self, spec: &SkillSpec, namespace: &str) -> Result<String> {
        if spec.name.trim().is_empty() {
            return Err(VesperError::Validation("skill name must not be empty".into()));
        }
        if self.find_by_name(&spec.name, namespace)?.is_some() {
            return Err(VesperError::Validation(format!(
                "skill '{}' already exists in this namespace",
                spec.name
            )));
        }

        let skill = Skill {
            id: Uuid::new_v4().to_string(),
            name: spec.name.trim().to_string(),
            description: spec.description.clone(),
            summary: spec
                .summary
                .clone()
                .unwrap_or_else(|| derive_summary(&spec.description)),
            category: spec.category.clone().unwrap_or_else(|| "general".to_string()),
            triggers: spec.triggers.clone(),
            success_count: 0,
            failure_count: 0,
            avg_user_satisfaction: 0.5,
            is_archived: false,
            last_used: None,
            code: spec.code.clone(),
            code_type: spec.code_type,
            prerequisites: spec.prerequisites.clone(),
            uses_skills: spec.uses_skills.clone(),
            version: 1,
            namespace: namespace.to_string(),
        };
        self.store.insert_skill(&skill)?;
        Ok(skill.id)
    }

    fn find_by_name(&self, name: &str, namespace: &str) -> Result<Option<Skill>> {
        let lowered = name.trim().to_lowercase();
        Ok(self
            .store
            .skills(namespace)?
            .into_iter()
            .find(|s| s.name.to_lowercase() == lowered))
    }

    /// Catalog projections in descending quality, archived rows excluded
    pub fn get_summaries(
        &self,
        limit: usize,
        category: Option<&str>,
        namespace: &str,
    ) -> Result<Vec<SkillSummary>> {
        let skills = self.store.skill_summaries(namespace, limit, category)?;
        Ok(skills.iter().map(Skill::summary_view).collect())
    }

    /// Full row for invocation; stamps `last_used`. Absent or archived
    /// skills return `None`.
    pub fn load_full(&self, id: &str, namespace: &str) -> Result<Option<Skill>> {
        let Some(skill) = self.store.get_skill(id, namespace)? else {
            return Ok(None);
        };
        if skill.is_archived {
            return Ok(None);
        }
        self.store.mark_skill_used(id, namespace)?;
        Ok(self.store.get_skill(id, namespace)?)
    }

    /// Keyword search over name, triggers, and category, ranked by
    /// `match_score x quality_score`
    pub fn search(&self, query: &str, limit: usize, namespace: &str) -> Result<Vec<SkillSummary>> {
        let skills = self.store.skills(namespace)?;
        let mut scored: Vec<(f64, &Skill)> = skills
            .iter()
            .filter_map(|skill| {
                let score = match_score(query, skill) * skill.quality_score();
                (score > 0.0).then_some((score, skill))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, skill)| skill.summary_view())
            .collect())
    }

    /// Detect whether free text invokes a known skill. Tries, in order:
    /// a literal skill name, a trigger phrase, then a generic reference to
    /// previous work ("like before") resolved to the most recently used
    /// skill in the namespace.
    pub fn detect_invocation(&self, text: &str, namespace: &str) -> Result<InvocationMatch> {
        let skills = self.store.skills(namespace)?;
        let lowered = text.to_lowercase();

        // 1. Literal skill name (longest match wins)
        let mut name_match: Option<&Skill> = None;
        for skill in &skills {
            let name = skill.name.to_lowercase();
            if !name.is_empty() && lowered.contains(&name) {
                let better = name_match
                    .map(|current| skill.name.len() > current.name.len())
                    .unwrap_or(true);
                if better {
                    name_match = Some(skill);
                }
            }
        }
        if let Some(skill) = name_match {
            return Ok(InvocationMatch {
                is_invocation: true,
                skill_id: Some(skill.id.clone()),
                confidence: 0.95,
                matched_pattern: Some("explicit_name".to_string()),
            });
        }

        // 2. Trigger phrase (longest trigger over any skill wins)
        let mut trigger_match: Option<(&Skill, &String)> = None;
        for skill in &skills {
            for trigger in &skill.triggers {
                let lowered_trigger = trigger.to_lowercase();
                if lowered_trigger.is_empty() || !lowered.contains(&lowered_trigger) {
                    continue;
                }
                let better = trigger_match
                    .map(|(_, current)| trigger.len() > current.len())
                    .unwrap_or(true);
                if better {
                    trigger_match = Some((skill, trigger));
                }
            }
        }
        if let Some((skill, trigger)) = trigger_match {
            return Ok(InvocationMatch {
                is_invocation: true,
                skill_id: Some(skill.id.clone()),
                confidence: 0.8,
                matched_pattern: Some(format!("trigger:{trigger}")),
            });
        }

        // 3. Generic reference to previous work
        if REFERENCE_PREVIOUS_RE.is_match(text) {
            let most_recent = skills
                .iter()
                .filter(|s| s.last_used.is_some())
                .max_by_key(|s| s.last_used);
            if let Some(skill) = most_recent {
                return Ok(InvocationMatch {
                    is_invocation: true,
                    skill_id: Some(skill.id.clone()),
                    confidence: 0.6,
                    matched_pattern: Some("reference_previous".to_string()),
                });
            }
        }

        Ok(InvocationMatch::none())
    }

    /// Record a successful outcome with user satisfaction in [0, 1]
    pub fn record_success(&self, id: &str, satisfaction: f64) -> Result<bool> {
        self.store.record_skill_success(id, satisfaction.clamp(0.0, 1.0))
    }

    /// Record a failed outcome
    pub fn record_failure(&self, id: &str) -> Result<bool> {
        self.store.record_skill_failure(id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
