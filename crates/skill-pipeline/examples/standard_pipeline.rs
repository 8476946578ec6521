//! Runs the standard five-skill plan against mock skills.
//!
//! The retrieval skill is flaky and the cross-reference skill is slow, so the
//! output shows a partial run, an open breaker and a deadline being enforced.
//!
//! ```sh
//! RUST_LOG=skill_pipeline=debug cargo run --example standard_pipeline
//! ```

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use skill_pipeline::observability::{self, ObservabilityConfig};
use skill_pipeline::pipeline::plan::names;
use skill_pipeline::{
    DependencyPlan, PipelineConfig, Skill, SkillError, SkillInput, SkillMap, SkillOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

struct Refine;

#[async_trait]
impl Skill for Refine {
    async fn execute(&self, input: SkillInput) -> Result<JsonValue, SkillError> {
        let query = input
            .input
            .as_str()
            .ok_or_else(|| SkillError::InvalidInput("expected a text query".to_string()))?;
        Ok(json!(query.trim().to_lowercase()))
    }
}

struct Transform;

#[async_trait]
impl Skill for Transform {
    async fn execute(&self, input: SkillInput) -> Result<JsonValue, SkillError> {
        let refined = input.require_upstream(names::REFINE)?;
        Ok(json!({ "intent": "search", "terms": refined }))
    }
}

struct Compress;

#[async_trait]
impl Skill for Compress {
    async fn execute(&self, input: SkillInput) -> Result<JsonValue, SkillError> {
        let schema = input.require_upstream(names::TRANSFORM)?;
        Ok(json!(format!("search: {}", schema["terms"])))
    }
}

struct SlowCrossReference;

#[async_trait]
impl Skill for SlowCrossReference {
    async fn execute(&self, _input: SkillInput) -> Result<JsonValue, SkillError> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(json!({ "bridge": "a breaker is a fuse for remote calls" }))
    }
}

struct FlakyRetrieval;

#[async_trait]
impl Skill for FlakyRetrieval {
    async fn execute(&self, _input: SkillInput) -> Result<JsonValue, SkillError> {
        Err(SkillError::failed("vector index unreachable"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init(ObservabilityConfig::default())?;

    let skills = SkillMap::new()
        .with(names::REFINE, Arc::new(Refine))
        .with(names::TRANSFORM, Arc::new(Transform))
        .with(names::COMPRESS, Arc::new(Compress))
        .with(names::CROSS_REFERENCE, Arc::new(SlowCrossReference))
        .with(names::RAG, Arc::new(FlakyRetrieval));

    let config = PipelineConfig::new()
        .with_per_skill_timeout(Duration::from_secs(1))
        .with_overall_deadline(Duration::from_secs(3))
        .with_failure_threshold(2);

    let orchestrator =
        SkillOrchestrator::new(DependencyPlan::standard(), &skills).with_config(config);

    for attempt in 1..=3 {
        let merged = orchestrator
            .execute(json!("  How does a Circuit Breaker work?  "))
            .await;

        println!("--- run {} ({}) ---", attempt, merged.overall_status);
        println!("{}", serde_json::to_string_pretty(&merged)?);
    }

    println!(
        "retrieval breaker: {:?}",
        orchestrator.breakers().snapshot(names::RAG)
    );

    Ok(())
}
