//! Per-skill circuit breaking.
//!
//! Each skill gets its own breaker entry, created lazily on its first failure.
//! Entries live in a map guarded by an `RwLock`; every entry has its own
//! `Mutex`, so concurrent runs hitting different skills never contend on the
//! same lock. No lock is ever held across an `.await`.
//!
//! State machine per skill:
//!
//! ```text
//!            failures >= threshold                reset_timeout elapsed
//!  Closed ───────────────────────────▶ Open ─────────────────────────────▶ HalfOpen
//!    ▲                                  ▲                                     │
//!    │              trial failed        │                                     │
//!    │                                  └─────────────────────────────────────┤
//!    │                          trial succeeded                               │
//!    └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! While half-open, exactly one trial call is admitted at a time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker settings shared by every skill of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    ///
    /// **Default:** 5
    pub failure_threshold: u32,

    /// How long an open breaker refuses calls before admitting a trial.
    ///
    /// **Default:** 60 seconds
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
        }
    }
}

/// The externally visible breaker state of one skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// The breaker's answer to "may I call this skill now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker is closed; call normally.
    Allow,
    /// Breaker is half-open and this caller holds the single trial slot.
    ///
    /// The caller must report back through `record_success`,
    /// `record_trial_failure` or `abandon_trial`.
    Trial,
    /// Breaker refuses the call.
    ShortCircuit,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::ShortCircuit)
    }
}

/// Point-in-time view of a skill's breaker, for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub trial_in_flight: bool,
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_in_flight: false,
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            trial_in_flight: self.trial_in_flight,
        }
    }
}

type SharedEntry = Arc<Mutex<BreakerEntry>>;

/// Process-lifetime registry of per-skill breakers.
///
/// This is the only state shared between concurrent pipeline runs; wrap it in
/// an `Arc` and hand the same instance to every orchestrator that should share
/// failure bookkeeping.
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::pipeline::{Admission, CircuitBreakerRegistry};
///
/// let breakers = CircuitBreakerRegistry::default();
/// if breakers.consult("rag").is_allowed() {
///     // call the skill, then report back
///     breakers.record_success("rag");
/// }
/// ```
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    entries: RwLock<HashMap<String, SharedEntry>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decides whether `name` may be called now.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open here
    /// and admits this caller as the trial.
    pub fn consult(&self, name: &str) -> Admission {
        let Some(entry) = self.entry(name) else {
            return Admission::Allow;
        };
        let mut entry = lock(&entry);

        match entry.state {
            BreakerState::Closed => Admission::Allow,
            BreakerState::Open => {
                let cooled_down = entry
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() >= self.config.reset_timeout);

                if cooled_down {
                    entry.state = BreakerState::HalfOpen;
                    entry.trial_in_flight = true;
                    debug!(skill = %name, "Circuit half-open, admitting trial call");
                    Admission::Trial
                } else {
                    Admission::ShortCircuit
                }
            }
            BreakerState::HalfOpen => {
                if entry.trial_in_flight {
                    Admission::ShortCircuit
                } else {
                    entry.trial_in_flight = true;
                    debug!(skill = %name, "Circuit half-open, admitting trial call");
                    Admission::Trial
                }
            }
        }
    }

    /// Resets `name` to closed with a zero failure count.
    pub fn record_success(&self, name: &str) {
        let Some(entry) = self.entry(name) else {
            return;
        };
        let mut entry = lock(&entry);

        if entry.state != BreakerState::Closed {
            info!(skill = %name, "Circuit closed after successful call");
        }
        entry.state = BreakerState::Closed;
        entry.consecutive_failures = 0;
        entry.last_failure_at = None;
        entry.trial_in_flight = false;
    }

    /// Counts a failed attempt and returns the resulting state.
    ///
    /// For calls admitted with [`Admission::Allow`]. While a trial is out the
    /// failure is only counted, since the half-open verdict belongs to the
    /// trial holder.
    pub fn record_failure(&self, name: &str) -> BreakerState {
        self.fail(name, false)
    }

    /// Counts a failed [`Admission::Trial`] call.
    ///
    /// A failed trial re-opens the breaker and restarts its reset timer.
    pub fn record_trial_failure(&self, name: &str) -> BreakerState {
        self.fail(name, true)
    }

    fn fail(&self, name: &str, trial: bool) -> BreakerState {
        let entry = self.entry_or_insert(name);
        let mut entry = lock(&entry);

        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        if entry.state == BreakerState::HalfOpen && !trial {
            return entry.state;
        }
        entry.last_failure_at = Some(Instant::now());
        entry.trial_in_flight = false;

        let next = match entry.state {
            BreakerState::HalfOpen => BreakerState::Open,
            BreakerState::Closed
                if entry.consecutive_failures >= self.config.failure_threshold =>
            {
                BreakerState::Open
            }
            state => state,
        };

        if next == BreakerState::Open && entry.state != BreakerState::Open {
            warn!(
                skill = %name,
                consecutive_failures = entry.consecutive_failures,
                reset_timeout = ?self.config.reset_timeout,
                "Circuit opened"
            );
        }
        entry.state = next;
        next
    }

    /// Releases a half-open trial whose call never produced a verdict.
    ///
    /// The breaker stays half-open and the next consult gets the trial slot.
    pub fn abandon_trial(&self, name: &str) {
        let Some(entry) = self.entry(name) else {
            return;
        };
        let mut entry = lock(&entry);

        if entry.state == BreakerState::HalfOpen && entry.trial_in_flight {
            entry.trial_in_flight = false;
            debug!(skill = %name, "Trial call abandoned");
        }
    }

    /// Returns the breaker state of `name`, or `None` if it never failed.
    pub fn snapshot(&self, name: &str) -> Option<BreakerSnapshot> {
        let entry = self.entry(name)?;
        let guard = lock(&entry);
        Some(guard.snapshot())
    }

    /// Convenience for `snapshot(name).map(|s| s.state)`, defaulting to closed.
    pub fn state(&self, name: &str) -> BreakerState {
        self.snapshot(name)
            .map(|s| s.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Forces `name` back to closed and forgets its failures.
    pub fn reset(&self, name: &str) {
        if let Some(entry) = self.entry(name) {
            *lock(&entry) = BreakerEntry::new();
            info!(skill = %name, "Circuit manually reset");
        }
    }

    /// Names of every skill that has a breaker entry.
    pub fn tracked_skills(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    fn entry(&self, name: &str) -> Option<SharedEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).cloned()
    }

    fn entry_or_insert(&self, name: &str) -> SharedEntry {
        if let Some(entry) = self.entry(name) {
            return entry;
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new()))),
        )
    }
}

fn lock(entry: &Mutex<BreakerEntry>) -> MutexGuard<'_, BreakerEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}
