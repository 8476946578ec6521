//! 'skill-pipeline' - Fault-tolerant orchestration of retrieval and
//! transformation skills.
//!
//! A request flows through a small graph of skills (refine, transform,
//! compress, cross-reference, retrieval). Each skill sits behind its own
//! circuit breaker and timeout, independent skills run concurrently, and the
//! whole run is bounded by a deadline. Whatever happens, the caller receives
//! one [`MergedResult`] with a status and an output for every skill.
//!
//! ```ignore
//! use skill_pipeline::{DependencyPlan, SkillMap, SkillOrchestrator};
//!
//! let skills = SkillMap::new().with("refine", Arc::new(Refine)) /* ... */;
//! let orchestrator = SkillOrchestrator::new(DependencyPlan::standard(), &skills);
//! let merged = orchestrator.execute(json!("user question")).await;
//! ```

pub mod observability;
pub mod pipeline;
pub mod skill;
pub mod trace;

pub use pipeline::{
    CircuitBreakerConfig, CircuitBreakerRegistry, DependencyPlan, MergedResult, PipelineConfig,
    PipelineRun, RunStatus, SkillNode, SkillOrchestrator, SkillOutcome, SkillStatus,
};
pub use skill::{Skill, SkillError, SkillInput, SkillMap, SkillRegistry};
pub use trace::{MemoryEmitter, TraceEmitter, TracingEmitter};
