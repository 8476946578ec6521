//! Skill pipeline execution.
//!
//! This module runs a [`DependencyPlan`] of skills with per-skill circuit
//! breakers, per-skill timeouts and an overall deadline, then merges the
//! outcomes into a single [`MergedResult`].

pub mod aggregator;
pub mod breaker;
pub mod config;
pub mod invoker;
pub mod orchestrator;
pub mod outcome;
pub mod plan;

pub use aggregator::{MergedResult, ResultAggregator, SkillResult};
pub use breaker::{
    Admission, BreakerSnapshot, BreakerState, CircuitBreakerConfig, CircuitBreakerRegistry,
};
pub use config::PipelineConfig;
pub use invoker::SkillInvoker;
pub use orchestrator::SkillOrchestrator;
pub use outcome::{PipelineRun, RunStatus, SkillOutcome, SkillStatus};
pub use plan::{DependencyPlan, OutputShape, PlanError, SkillNode};
