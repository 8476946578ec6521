//! Circuit breaker behaviour across pipeline runs
//!
//! Breaker state lives in a registry that outlives individual runs. These
//! tests drive repeated runs through one orchestrator (or several sharing a
//! registry) and check when calls are refused and when they resume.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use skill_pipeline::pipeline::plan::names::{CROSS_REFERENCE, RAG, REFINE};
use skill_pipeline::pipeline::{BreakerState, CircuitBreakerConfig, CircuitBreakerRegistry};
use skill_pipeline::{
    DependencyPlan, PipelineConfig, RunStatus, Skill, SkillError, SkillInput, SkillMap,
    SkillOrchestrator, SkillStatus,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Mock Skills
// ============================================================================

/// A skill whose health can be flipped between runs.
#[derive(Clone)]
struct SwitchableSkill {
    output: JsonValue,
    healthy: Arc<AtomicBool>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl SwitchableSkill {
    fn new(output: JsonValue, healthy: bool) -> Self {
        Self {
            output,
            healthy: Arc::new(AtomicBool::new(healthy)),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn hanging(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(json!([]), true)
        }
    }

    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Skill for SwitchableSkill {
    async fn execute(&self, _input: SkillInput) -> Result<JsonValue, SkillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(self.output.clone())
        } else {
            Err(SkillError::failed("backend unavailable"))
        }
    }
}

fn registry_with_rag(rag: &SwitchableSkill) -> SkillMap {
    SkillMap::new()
        .with(REFINE, Arc::new(SwitchableSkill::new(json!("q"), true)))
        .with("transform", Arc::new(SwitchableSkill::new(json!({}), true)))
        .with("compress", Arc::new(SwitchableSkill::new(json!("c"), true)))
        .with(CROSS_REFERENCE, Arc::new(SwitchableSkill::new(json!({}), true)))
        .with(RAG, Arc::new(rag.clone()))
}

fn orchestrator(rag: &SwitchableSkill, config: PipelineConfig) -> SkillOrchestrator {
    SkillOrchestrator::new(DependencyPlan::standard(), &registry_with_rag(rag)).with_config(config)
}

// ============================================================================
// Opening
// ============================================================================

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_skips_calls() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(&rag, PipelineConfig::new());

    for _ in 0..5 {
        let merged = orchestrator.execute(json!("q")).await;
        assert_eq!(merged.status(RAG), Some(SkillStatus::Error));
        assert_eq!(merged.overall_status, RunStatus::Partial);
    }
    assert_eq!(orchestrator.breakers().state(RAG), BreakerState::Open);

    let merged = orchestrator.execute(json!("q")).await;

    assert_eq!(merged.status(RAG), Some(SkillStatus::CircuitOpen));
    assert_eq!(merged.output(RAG), Some(&json!([])));
    assert_eq!(merged.overall_status, RunStatus::Partial);
    assert_eq!(rag.calls(), 5);
}

#[tokio::test]
async fn test_breakers_are_per_skill() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new().with_failure_threshold(2),
    );

    for _ in 0..3 {
        orchestrator.execute(json!("q")).await;
    }

    let breakers = orchestrator.breakers();
    assert_eq!(breakers.state(RAG), BreakerState::Open);
    assert_eq!(breakers.state(REFINE), BreakerState::Closed);
    assert_eq!(breakers.state(CROSS_REFERENCE), BreakerState::Closed);
    assert_eq!(breakers.tracked_skills(), vec![RAG.to_string()]);
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new().with_failure_threshold(3),
    );

    orchestrator.execute(json!("q")).await;
    orchestrator.execute(json!("q")).await;
    rag.set_healthy(true);
    orchestrator.execute(json!("q")).await;
    rag.set_healthy(false);
    orchestrator.execute(json!("q")).await;
    orchestrator.execute(json!("q")).await;

    let snapshot = orchestrator.breakers().snapshot(RAG).unwrap();
    assert_eq!(snapshot.state, BreakerState::Closed);
    assert_eq!(snapshot.consecutive_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_count_as_failures() {
    let rag = SwitchableSkill::hanging(Duration::from_secs(10));
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new()
            .with_per_skill_timeout(Duration::from_millis(50))
            .with_failure_threshold(2),
    );

    for _ in 0..2 {
        let merged = orchestrator.execute(json!("q")).await;
        assert_eq!(merged.status(RAG), Some(SkillStatus::Timeout));
    }

    let merged = orchestrator.execute(json!("q")).await;
    assert_eq!(merged.status(RAG), Some(SkillStatus::CircuitOpen));
    assert_eq!(rag.calls(), 2);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_success_closes_breaker() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new()
            .with_failure_threshold(2)
            .with_reset_timeout(Duration::from_secs(30)),
    );

    orchestrator.execute(json!("q")).await;
    orchestrator.execute(json!("q")).await;
    assert_eq!(orchestrator.breakers().state(RAG), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(10)).await;
    let merged = orchestrator.execute(json!("q")).await;
    assert_eq!(merged.status(RAG), Some(SkillStatus::CircuitOpen));

    tokio::time::advance(Duration::from_secs(20)).await;
    rag.set_healthy(true);
    let merged = orchestrator.execute(json!("q")).await;

    assert_eq!(merged.status(RAG), Some(SkillStatus::Success));
    assert_eq!(merged.overall_status, RunStatus::Success);
    let snapshot = orchestrator.breakers().snapshot(RAG).unwrap();
    assert_eq!(snapshot.state, BreakerState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(rag.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_failure_reopens_breaker() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new()
            .with_failure_threshold(2)
            .with_reset_timeout(Duration::from_secs(30)),
    );

    orchestrator.execute(json!("q")).await;
    orchestrator.execute(json!("q")).await;

    tokio::time::advance(Duration::from_secs(30)).await;
    let merged = orchestrator.execute(json!("q")).await;
    assert_eq!(merged.status(RAG), Some(SkillStatus::Error));
    assert_eq!(orchestrator.breakers().state(RAG), BreakerState::Open);

    // The reset timer restarted with the failed trial.
    tokio::time::advance(Duration::from_secs(15)).await;
    let merged = orchestrator.execute(json!("q")).await;
    assert_eq!(merged.status(RAG), Some(SkillStatus::CircuitOpen));
    assert_eq!(rag.calls(), 3);
}

#[tokio::test]
async fn test_manual_reset_closes_breaker() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = orchestrator(
        &rag,
        PipelineConfig::new().with_failure_threshold(1),
    );

    orchestrator.execute(json!("q")).await;
    assert_eq!(orchestrator.breakers().state(RAG), BreakerState::Open);

    orchestrator.breakers().reset(RAG);
    rag.set_healthy(true);
    let merged = orchestrator.execute(json!("q")).await;

    assert_eq!(merged.status(RAG), Some(SkillStatus::Success));
}

// ============================================================================
// Sharing
// ============================================================================

#[tokio::test]
async fn test_registry_shared_between_orchestrators() {
    let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::new(
        2,
        Duration::from_secs(60),
    )));

    let broken_rag = SwitchableSkill::new(json!(["doc"]), false);
    let first = orchestrator(&broken_rag, PipelineConfig::new())
        .with_breakers(Arc::clone(&breakers));
    first.execute(json!("q")).await;
    first.execute(json!("q")).await;

    let healthy_rag = SwitchableSkill::new(json!(["doc"]), true);
    let second = orchestrator(&healthy_rag, PipelineConfig::new())
        .with_breakers(Arc::clone(&breakers));
    let merged = second.execute(json!("q")).await;

    assert_eq!(merged.status(RAG), Some(SkillStatus::CircuitOpen));
    assert_eq!(healthy_rag.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_share_breaker() {
    let rag = SwitchableSkill::new(json!(["doc"]), false);
    let orchestrator = Arc::new(orchestrator(
        &rag,
        PipelineConfig::new().with_failure_threshold(3),
    ));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator.execute(json!("q")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(orchestrator.breakers().state(RAG), BreakerState::Open);
    assert!(rag.calls() >= 3);
}
