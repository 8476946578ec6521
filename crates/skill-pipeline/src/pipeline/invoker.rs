//! Safe execution of a single skill.
//!
//! The invoker is the failure-isolation boundary: whatever the skill does
//! (returns an error, panics, hangs), the caller gets a [`SkillOutcome`] back.

use super::breaker::{Admission, CircuitBreakerRegistry};
use super::outcome::{SkillOutcome, current_timestamp_ms};
use super::plan::SkillNode;
use crate::skill::{Skill, SkillInput};
use crate::trace::{SkillTraceEvent, TraceEmitter, TraceEventKind};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

/// How a skill call ended, before it is turned into an outcome.
enum CallResult {
    Returned(serde_json::Value),
    Failed(String),
    TimedOut(Duration),
    Cancelled,
}

/// Wraps single skill calls with circuit breaking, timeouts and tracing.
#[derive(Clone)]
pub struct SkillInvoker {
    breakers: Arc<CircuitBreakerRegistry>,
    emitter: Arc<dyn TraceEmitter>,
}

impl SkillInvoker {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, emitter: Arc<dyn TraceEmitter>) -> Self {
        Self { breakers, emitter }
    }

    /// Executes one skill and reports the result as data.
    ///
    /// - `skill` is `None` when the registry could not resolve `node.name`;
    ///   the outcome is then `error` and the breaker is left alone.
    /// - A refused breaker consult yields `circuit_open` without calling the skill.
    /// - Errors, panics and `timeout` expiry are recorded as breaker failures.
    /// - If `cancel` fires first (run deadline or caller cancellation), the
    ///   outcome is `timeout`, the breaker counts are untouched and a held
    ///   half-open trial is released. No trace event is emitted in that case;
    ///   the orchestrator reports the node when it settles the run.
    /// - Dropping the returned future mid-call also releases a held trial.
    pub async fn invoke(
        &self,
        run_id: &str,
        node: &SkillNode,
        skill: Option<Arc<dyn Skill>>,
        input: SkillInput,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> SkillOutcome {
        let name = node.name.as_str();
        let span = info_span!("skill_invocation", run_id = %run_id, skill = %name);

        async move {
            let started_at_ms = current_timestamp_ms();

            let Some(skill) = skill else {
                warn!("Skill is not registered");
                self.emit(run_id, name, TraceEventKind::Failed, None);
                return SkillOutcome::error(
                    name,
                    format!("skill `{}` is not registered", name),
                    started_at_ms,
                );
            };

            let admission = self.breakers.consult(name);
            if !admission.is_allowed() {
                debug!("Call short-circuited by open breaker");
                self.emit(run_id, name, TraceEventKind::CircuitOpen, None);
                return SkillOutcome::circuit_open(name);
            }
            // Released on drop unless a verdict is recorded, so an aborted
            // task cannot keep the half-open slot.
            let trial = (admission == Admission::Trial)
                .then(|| TrialGuard::new(Arc::clone(&self.breakers), name));

            self.emit(run_id, name, TraceEventKind::Started, None);
            let clock = Instant::now();

            let call = AssertUnwindSafe(skill.execute(input)).catch_unwind();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => CallResult::Cancelled,
                settled = call_with_timeout(timeout, call) => match settled {
                    None => CallResult::TimedOut(timeout.unwrap_or_default()),
                    Some(Ok(Ok(output))) => CallResult::Returned(output),
                    Some(Ok(Err(e))) => CallResult::Failed(e.to_string()),
                    Some(Err(panic)) => {
                        CallResult::Failed(format!("skill panicked: {}", panic_message(&*panic)))
                    }
                },
            };
            let elapsed = clock.elapsed();

            let (outcome, kind) = match result {
                CallResult::Returned(output) => {
                    debug!(elapsed = ?elapsed, "Skill succeeded");
                    (
                        SkillOutcome::success(name, output, started_at_ms),
                        TraceEventKind::Succeeded,
                    )
                }
                CallResult::Failed(message) => (
                    SkillOutcome::error(name, message, started_at_ms),
                    TraceEventKind::Failed,
                ),
                CallResult::TimedOut(limit) => (
                    SkillOutcome::timeout(
                        name,
                        format!("skill did not answer within {:?}", limit),
                        started_at_ms,
                    ),
                    TraceEventKind::TimedOut,
                ),
                CallResult::Cancelled => {
                    debug!(elapsed = ?elapsed, "Skill call cancelled");
                    return SkillOutcome::timeout(
                        name,
                        "run deadline exceeded while the skill was running",
                        started_at_ms,
                    );
                }
            };

            let held_trial = trial.map(TrialGuard::disarm).is_some();
            if outcome.status.is_success() {
                self.breakers.record_success(name);
            } else if outcome.status.counts_against_breaker() {
                let state = if held_trial {
                    self.breakers.record_trial_failure(name)
                } else {
                    self.breakers.record_failure(name)
                };
                let error = outcome.error.as_deref().unwrap_or_default();
                match kind {
                    TraceEventKind::TimedOut => {
                        warn!(error = %error, breaker = ?state, "Skill execution timed out")
                    }
                    _ => warn!(error = %error, breaker = ?state, "Skill failed"),
                }
            }

            self.emit(run_id, name, kind, Some(elapsed));
            outcome
        }
        .instrument(span)
        .await
    }

    fn emit(&self, run_id: &str, name: &str, kind: TraceEventKind, elapsed: Option<Duration>) {
        let mut event = SkillTraceEvent::new(run_id, name, kind);
        if let Some(elapsed) = elapsed {
            event = event.with_duration(elapsed);
        }
        self.emitter.skill_event(&event);
    }
}

/// Holds a half-open trial slot until the call records a verdict.
struct TrialGuard {
    breakers: Arc<CircuitBreakerRegistry>,
    name: String,
    armed: bool,
}

impl TrialGuard {
    fn new(breakers: Arc<CircuitBreakerRegistry>, name: &str) -> Self {
        Self {
            breakers,
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if self.armed {
            self.breakers.abandon_trial(&self.name);
        }
    }
}

async fn call_with_timeout<F: Future>(timeout: Option<Duration>, call: F) -> Option<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.ok(),
        None => Some(call.await),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
