//! Per-skill outcomes and the state of one pipeline run.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Terminal status of one skill in one run.
///
/// - `Success`: the skill returned an output.
/// - `Error`: the skill reported a failure (or panicked).
/// - `Timeout`: the skill did not answer within its own timeout, or the run
///   deadline elapsed before it settled.
/// - `CircuitOpen`: the circuit breaker short-circuited the call; the skill
///   was never invoked.
/// - `Skipped`: an upstream dependency did not succeed, so the skill never got
///   a chance to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillStatus {
    Success,
    Error,
    Timeout,
    CircuitOpen,
    Skipped,
}

impl SkillStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SkillStatus::Success)
    }

    /// Returns true for the statuses that make a required skill fail the run.
    ///
    /// `Skipped` is excluded: a skipped required skill implies an upstream
    /// required failure that is already counted.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SkillStatus::Error | SkillStatus::Timeout | SkillStatus::CircuitOpen
        )
    }

    /// Returns true for the statuses the circuit breaker counts as failed
    /// attempts.
    pub fn counts_against_breaker(&self) -> bool {
        matches!(self, SkillStatus::Error | SkillStatus::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::Success => "success",
            SkillStatus::Error => "error",
            SkillStatus::Timeout => "timeout",
            SkillStatus::CircuitOpen => "circuit_open",
            SkillStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a single skill invocation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub name: String,
    pub status: SkillStatus,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
}

impl SkillOutcome {
    pub fn success(name: impl Into<String>, output: JsonValue, started_at_ms: u64) -> Self {
        Self::settled(name, SkillStatus::Success, Some(output), None, started_at_ms)
    }

    pub fn error(name: impl Into<String>, error: impl Into<String>, started_at_ms: u64) -> Self {
        Self::settled(
            name,
            SkillStatus::Error,
            None,
            Some(error.into()),
            started_at_ms,
        )
    }

    pub fn timeout(name: impl Into<String>, reason: impl Into<String>, started_at_ms: u64) -> Self {
        Self::settled(
            name,
            SkillStatus::Timeout,
            None,
            Some(reason.into()),
            started_at_ms,
        )
    }

    /// An outcome for a call the circuit breaker refused.
    pub fn circuit_open(name: impl Into<String>) -> Self {
        let now = current_timestamp_ms();
        Self::settled(
            name,
            SkillStatus::CircuitOpen,
            None,
            Some("circuit breaker is open".to_string()),
            now,
        )
    }

    /// An outcome for a skill that never ran because `upstream` ended in
    /// `upstream_status`.
    pub fn skipped(name: impl Into<String>, upstream: &str, upstream_status: SkillStatus) -> Self {
        let now = current_timestamp_ms();
        Self::settled(
            name,
            SkillStatus::Skipped,
            None,
            Some(format!(
                "dependency `{}` ended with status {}",
                upstream, upstream_status
            )),
            now,
        )
    }

    fn settled(
        name: impl Into<String>,
        status: SkillStatus,
        output: Option<JsonValue>,
        error: Option<String>,
        started_at_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            output,
            error,
            started_at_ms,
            finished_at_ms: current_timestamp_ms().max(started_at_ms),
        }
    }

    /// Wall-clock time between start and finish.
    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every skill succeeded.
    Success,
    /// Usable but incomplete: no required skill failed, but something did not succeed.
    Partial,
    /// At least one required skill failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One end-to-end execution of a dependency plan.
///
/// Owned by the request that created it and never shared across runs.
/// `overall_status` stays `Partial` until the orchestrator settles the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub started_at_ms: u64,
    /// Budget the run was given.
    pub deadline: Duration,
    pub outcomes: BTreeMap<String, SkillOutcome>,
    pub overall_status: RunStatus,
    pub total_duration_ms: u64,
}

impl PipelineRun {
    pub fn new(deadline: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at_ms: current_timestamp_ms(),
            deadline,
            outcomes: BTreeMap::new(),
            overall_status: RunStatus::Partial,
            total_duration_ms: 0,
        }
    }

    /// Records a terminal outcome.
    ///
    /// The first outcome recorded for a skill wins; later ones are discarded
    /// and `false` is returned.
    pub fn record(&mut self, outcome: SkillOutcome) -> bool {
        if self.outcomes.contains_key(&outcome.name) {
            return false;
        }
        self.outcomes.insert(outcome.name.clone(), outcome);
        true
    }

    pub fn outcome(&self, name: &str) -> Option<&SkillOutcome> {
        self.outcomes.get(name)
    }

    pub fn status_of(&self, name: &str) -> Option<SkillStatus> {
        self.outcomes.get(name).map(|o| o.status)
    }

    /// Number of recorded outcomes with the given status.
    pub fn count_with(&self, status: SkillStatus) -> usize {
        self.outcomes.values().filter(|o| o.status == status).count()
    }
}

/// Returns the current system time in milliseconds since UNIX_EPOCH.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
