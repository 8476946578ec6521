//! # Trace events
//!
//! The pipeline reports what happened to each skill, and one summary per run,
//! to a [`TraceEmitter`]. Storage is the emitter's business: [`TracingEmitter`]
//! forwards everything to `tracing`, and [`MemoryEmitter`] keeps the events in
//! memory for inspection.

use crate::pipeline::outcome::{RunStatus, current_timestamp_ms};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Started,
    Succeeded,
    Failed,
    TimedOut,
    CircuitOpen,
    Skipped,
}

/// One per-skill event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTraceEvent {
    pub run_id: String,
    pub skill_name: String,
    pub event: TraceEventKind,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl SkillTraceEvent {
    pub fn new(
        run_id: impl Into<String>,
        skill_name: impl Into<String>,
        event: TraceEventKind,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            skill_name: skill_name.into(),
            event,
            timestamp_ms: current_timestamp_ms(),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// One summary per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub overall_status: RunStatus,
    pub total_duration_ms: u64,
}

/// Receiver for pipeline trace events.
///
/// Called from concurrently running skill tasks, so implementations must be
/// cheap and must not block for long.
pub trait TraceEmitter: Send + Sync {
    fn skill_event(&self, event: &SkillTraceEvent);

    fn run_summary(&self, summary: &RunSummary);
}

/// Writes every event as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl TraceEmitter for TracingEmitter {
    fn skill_event(&self, event: &SkillTraceEvent) {
        let run_id = event.run_id.as_str();
        let skill = event.skill_name.as_str();
        let duration_ms = event.duration_ms;

        match event.event {
            TraceEventKind::Started => {
                debug!(run_id, skill, "skill started");
            }
            TraceEventKind::Succeeded => {
                info!(run_id, skill, ?duration_ms, "skill succeeded");
            }
            TraceEventKind::Failed => {
                warn!(run_id, skill, ?duration_ms, "skill failed");
            }
            TraceEventKind::TimedOut => {
                warn!(run_id, skill, ?duration_ms, "skill timed out");
            }
            TraceEventKind::CircuitOpen => {
                warn!(run_id, skill, "skill short-circuited by open breaker");
            }
            TraceEventKind::Skipped => {
                info!(run_id, skill, "skill skipped");
            }
        }
    }

    fn run_summary(&self, summary: &RunSummary) {
        info!(
            run_id = %summary.run_id,
            overall_status = %summary.overall_status,
            total_duration_ms = summary.total_duration_ms,
            "pipeline run finished"
        );
    }
}

/// Keeps every event in memory.
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::trace::{MemoryEmitter, TraceEventKind};
/// use std::sync::Arc;
///
/// let emitter = Arc::new(MemoryEmitter::new());
/// let orchestrator = SkillOrchestrator::new(plan, &skills).with_emitter(emitter.clone());
/// orchestrator.execute(input).await;
///
/// assert_eq!(emitter.kinds_for("refine"), vec![TraceEventKind::Started, TraceEventKind::Succeeded]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    events: Mutex<Vec<SkillTraceEvent>>,
    summaries: Mutex<Vec<RunSummary>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All skill events, in emission order.
    pub fn events(&self) -> Vec<SkillTraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event kinds emitted for one skill, in emission order.
    pub fn kinds_for(&self, skill_name: &str) -> Vec<TraceEventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.skill_name == skill_name)
            .map(|e| e.event)
            .collect()
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TraceEmitter for MemoryEmitter {
    fn skill_event(&self, event: &SkillTraceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn run_summary(&self, summary: &RunSummary) {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(summary.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = SkillTraceEvent {
            run_id: "run-1".to_string(),
            skill_name: "rag".to_string(),
            event: TraceEventKind::TimedOut,
            timestamp_ms: 42,
            duration_ms: Some(7),
        };

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "run_id": "run-1",
                "skill_name": "rag",
                "event": "timed_out",
                "timestamp_ms": 42,
                "duration_ms": 7
            })
        );
    }

    #[test]
    fn test_event_without_duration_omits_field() {
        let event = SkillTraceEvent::new("run-1", "rag", TraceEventKind::Skipped);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("duration_ms").is_none());
        assert_eq!(value["event"], json!("skipped"));
    }

    #[test]
    fn test_with_duration() {
        let event = SkillTraceEvent::new("run-1", "refine", TraceEventKind::Succeeded)
            .with_duration(Duration::from_millis(120));
        assert_eq!(event.duration_ms, Some(120));
    }

    #[test]
    fn test_memory_emitter_records_in_order() {
        let emitter = MemoryEmitter::new();
        emitter.skill_event(&SkillTraceEvent::new("r", "refine", TraceEventKind::Started));
        emitter.skill_event(&SkillTraceEvent::new("r", "rag", TraceEventKind::Started));
        emitter.skill_event(&SkillTraceEvent::new("r", "refine", TraceEventKind::Failed));
        emitter.run_summary(&RunSummary {
            run_id: "r".to_string(),
            overall_status: RunStatus::Failed,
            total_duration_ms: 3,
        });

        assert_eq!(emitter.events().len(), 3);
        assert_eq!(
            emitter.kinds_for("refine"),
            vec![TraceEventKind::Started, TraceEventKind::Failed]
        );
        assert_eq!(emitter.summaries()[0].overall_status, RunStatus::Failed);

        emitter.clear();
        assert!(emitter.events().is_empty());
        assert!(emitter.summaries().is_empty());
    }
}
