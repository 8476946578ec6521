//! Configuration for pipeline execution.
//!
//! This module provides configuration options for controlling timeouts,
//! concurrency and circuit breaking.

use super::breaker::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for pipeline execution.
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::pipeline::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::new()
///     .with_per_skill_timeout(Duration::from_secs(10))
///     .with_overall_deadline(Duration::from_secs(20))
///     .with_failure_threshold(3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout for a single skill invocation.
    ///
    /// If `None`, a skill may run until the overall deadline.
    /// Timing out one skill never cancels its siblings.
    ///
    /// **Default:** 30 seconds
    pub per_skill_timeout: Option<Duration>,

    /// Time budget for a whole run, used by `SkillOrchestrator::execute`.
    ///
    /// When it elapses, every unsettled skill is recorded as `timeout` and
    /// the run is merged with whatever is available.
    ///
    /// **Default:** 60 seconds
    pub overall_deadline: Duration,

    /// Maximum number of skills in flight at once within one run.
    ///
    /// If `None`, every ready skill starts immediately. `Some(0)` behaves
    /// like `Some(1)`.
    ///
    /// **Default:** `None` (unlimited)
    pub max_concurrent_skills: Option<usize>,

    /// Circuit breaker settings.
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    ///
    /// Default values:
    /// - `per_skill_timeout`: 30 seconds
    /// - `overall_deadline`: 60 seconds
    /// - `max_concurrent_skills`: `None` (unlimited)
    /// - `breaker`: threshold 5, reset timeout 60 seconds
    pub fn new() -> Self {
        Self {
            per_skill_timeout: Some(Duration::from_secs(30)),
            overall_deadline: Duration::from_secs(60),
            max_concurrent_skills: None,
            breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn with_per_skill_timeout(mut self, timeout: Duration) -> Self {
        self.per_skill_timeout = Some(timeout);
        self
    }

    /// Removes the per-skill timeout.
    pub fn with_no_skill_timeout(mut self) -> Self {
        self.per_skill_timeout = None;
        self
    }

    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    /// Sets the maximum number of concurrent skills.
    ///
    /// A value of `0` is treated as `1` so the run can still make progress.
    pub fn with_max_concurrent_skills(mut self, max: usize) -> Self {
        self.max_concurrent_skills = Some(max.max(1));
        self
    }

    /// Removes the concurrency limit.
    pub fn with_unlimited_concurrency(mut self) -> Self {
        self.max_concurrent_skills = None;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.breaker.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.breaker.reset_timeout = timeout;
        self
    }
}
