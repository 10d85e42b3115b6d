//! Memory Tiers
//!
//! Three layers with distinct consistency and retention policies:
//! a bounded ephemeral working tier, a durable semantic graph, and a
//! durable skill library with two-phase loading.

mod semantic;
mod skills;
mod working;

pub use semantic::{RankedNode, SemanticMemory, PAGERANK_PRUNE_THRESHOLD};
pub use skills::SkillLibrary;
pub use working::{CachedSkill, WorkingMemory, DEFAULT_WORKING_TTL};
