//! Dependency-aware, deadline-bounded execution of a skill plan.

use super::aggregator::{MergedResult, ResultAggregator};
use super::breaker::CircuitBreakerRegistry;
use super::config::PipelineConfig;
use super::invoker::SkillInvoker;
use super::outcome::{PipelineRun, SkillOutcome, current_timestamp_ms};
use super::plan::DependencyPlan;
use crate::skill::{Skill, SkillInput, SkillRegistry};
use crate::trace::{RunSummary, SkillTraceEvent, TraceEmitter, TraceEventKind, TracingEmitter};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// Everything a spawned skill task needs, shared by one run.
struct LaunchContext {
    run_id: String,
    input: JsonValue,
    cancel: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
    invoker: SkillInvoker,
    timeout: Option<Duration>,
}

/// Scheduling bookkeeping for one run.
#[derive(Default)]
struct Progress {
    /// Skills that succeeded.
    completed: HashSet<String>,
    /// Skills that were started or given a terminal outcome without starting.
    claimed: HashSet<String>,
    outputs: HashMap<String, JsonValue>,
}

/// Runs a [`DependencyPlan`] against registered skills.
///
/// Skills start as soon as their dependencies have succeeded. Independent
/// skills run concurrently. A failed skill never aborts its siblings; its
/// dependents are marked `skipped` instead. When the overall deadline passes,
/// every unsettled skill is recorded as `timeout` and the run is returned
/// with whatever finished.
///
/// The circuit breaker registry outlives runs. Share it between orchestrators
/// with [`SkillOrchestrator::with_breakers`].
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::pipeline::{DependencyPlan, SkillOrchestrator};
/// use skill_pipeline::skill::SkillMap;
///
/// let skills = SkillMap::new()
///     .with("refine", Arc::new(Refine))
///     .with("transform", Arc::new(Transform));
/// let orchestrator = SkillOrchestrator::new(DependencyPlan::standard(), &skills);
///
/// let merged = orchestrator.execute(json!("how do breakers work?")).await;
/// println!("{}", merged.overall_status);
/// ```
pub struct SkillOrchestrator {
    plan: Arc<DependencyPlan>,
    skills: HashMap<String, Arc<dyn Skill>>,
    breakers: Arc<CircuitBreakerRegistry>,
    emitter: Arc<dyn TraceEmitter>,
    aggregator: ResultAggregator,
    config: PipelineConfig,
}

impl SkillOrchestrator {
    /// Creates an orchestrator with the default [`PipelineConfig`].
    ///
    /// Every skill in the plan is resolved once, here. Names the registry does
    /// not know are kept in the plan and end every run with an `error` outcome.
    pub fn new(plan: DependencyPlan, registry: &dyn SkillRegistry) -> Self {
        let mut skills = HashMap::new();
        for name in plan.names() {
            match registry.resolve(name) {
                Some(skill) => {
                    skills.insert(name.to_string(), skill);
                }
                None => warn!(skill = %name, "Skill in plan is not registered"),
            }
        }

        let plan = Arc::new(plan);
        let config = PipelineConfig::default();

        Self {
            aggregator: ResultAggregator::new(Arc::clone(&plan)),
            breakers: Arc::new(CircuitBreakerRegistry::new(config.breaker.clone())),
            emitter: Arc::new(TracingEmitter),
            plan,
            skills,
            config,
        }
    }

    /// Replaces the configuration.
    ///
    /// This also installs a fresh breaker registry built from
    /// `config.breaker`. Call [`with_breakers`](Self::with_breakers)
    /// afterwards to use a shared registry instead.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        self.config = config;
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn TraceEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn plan(&self) -> &DependencyPlan {
        &self.plan
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Skills in the plan that the registry could not resolve, sorted.
    pub fn unresolved_skills(&self) -> Vec<String> {
        self.plan
            .names()
            .filter(|name| !self.skills.contains_key(*name))
            .map(str::to_string)
            .collect()
    }

    /// Runs the plan with the configured deadline and merges the result.
    pub async fn execute(&self, input: JsonValue) -> MergedResult {
        let run = self.run(input, self.config.overall_deadline).await;
        self.merge(&run)
    }

    /// Runs the plan once within `overall_deadline`.
    ///
    /// The returned run holds exactly one outcome per skill in the plan.
    pub async fn run(&self, input: JsonValue, overall_deadline: Duration) -> PipelineRun {
        self.run_with_cancellation(input, overall_deadline, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but also stops when `cancellation_token` fires.
    ///
    /// Cancellation is treated like an early deadline: in-flight skills are
    /// abandoned and every unsettled skill is recorded as `timeout`.
    pub async fn run_with_cancellation(
        &self,
        input: JsonValue,
        overall_deadline: Duration,
        cancellation_token: CancellationToken,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(overall_deadline);
        let span = info_span!(
            "pipeline_run",
            run_id = %run.id,
            skills = self.plan.len(),
        );

        async move {
            info!(deadline = ?overall_deadline, "Starting pipeline run");

            let clock = Instant::now();
            let deadline = clock + overall_deadline;

            let ctx = LaunchContext {
                run_id: run.id.clone(),
                input,
                cancel: cancellation_token.child_token(),
                semaphore: self
                    .config
                    .max_concurrent_skills
                    .map(|n| Arc::new(Semaphore::new(n.max(1)))),
                invoker: SkillInvoker::new(Arc::clone(&self.breakers), Arc::clone(&self.emitter)),
                timeout: self.config.per_skill_timeout,
            };

            let mut tasks: JoinSet<SkillOutcome> = JoinSet::new();
            let mut progress = Progress::default();
            self.launch_ready(&ctx, &mut progress, &mut tasks);

            let expiry = tokio::time::sleep_until(deadline);
            tokio::pin!(expiry);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut expiry => {
                        warn!(
                            pending = tasks.len(),
                            "Run deadline exceeded, abandoning unsettled skills"
                        );
                        break;
                    }
                    _ = ctx.cancel.cancelled() => {
                        info!(pending = tasks.len(), "Run cancelled");
                        break;
                    }
                    joined = tasks.join_next() => match joined {
                        None => break,
                        Some(Ok(outcome)) => {
                            self.settle(&ctx, &mut run, &mut progress, &mut tasks, outcome);
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Skill task ended abnormally");
                        }
                    },
                }
            }

            // In-flight calls see the cancellation, release any half-open
            // trial they hold and finish on their own.
            ctx.cancel.cancel();
            tasks.detach_all();

            for node in self.plan.nodes() {
                if run.outcome(&node.name).is_none() {
                    self.emit(&ctx.run_id, &node.name, TraceEventKind::TimedOut);
                    run.record(SkillOutcome::timeout(
                        &node.name,
                        "run ended before the skill finished",
                        current_timestamp_ms(),
                    ));
                }
            }

            run.total_duration_ms = clock.elapsed().as_millis() as u64;
            run.overall_status = self.aggregator.overall_status(&run);

            self.emitter.run_summary(&RunSummary {
                run_id: run.id.clone(),
                overall_status: run.overall_status,
                total_duration_ms: run.total_duration_ms,
            });
            info!(
                overall_status = %run.overall_status,
                total_duration_ms = run.total_duration_ms,
                "Pipeline run finished"
            );

            run
        }
        .instrument(span)
        .await
    }

    /// Merges a finished run into the caller-facing result.
    pub fn merge(&self, run: &PipelineRun) -> MergedResult {
        self.aggregator.merge(run)
    }

    /// Records `outcome`, propagates skips on failure, and starts whatever
    /// became ready.
    fn settle(
        &self,
        ctx: &LaunchContext,
        run: &mut PipelineRun,
        progress: &mut Progress,
        tasks: &mut JoinSet<SkillOutcome>,
        outcome: SkillOutcome,
    ) {
        let name = outcome.name.clone();
        let status = outcome.status;
        let output = outcome.output.clone();

        if !run.record(outcome) {
            debug!(skill = %name, "Discarding duplicate outcome");
            return;
        }

        if status.is_success() {
            progress.completed.insert(name.clone());
            if let Some(output) = output {
                progress.outputs.insert(name, output);
            }
        } else {
            for dependent in self.plan.transitive_dependents(&name) {
                if progress.claimed.insert(dependent.clone()) {
                    debug!(skill = %dependent, upstream = %name, "Skipping dependent skill");
                    self.emit(&ctx.run_id, &dependent, TraceEventKind::Skipped);
                    run.record(SkillOutcome::skipped(&dependent, &name, status));
                }
            }
        }

        self.launch_ready(ctx, progress, tasks);
    }

    /// Spawns every skill whose dependencies have all succeeded.
    fn launch_ready(
        &self,
        ctx: &LaunchContext,
        progress: &mut Progress,
        tasks: &mut JoinSet<SkillOutcome>,
    ) {
        let ready: Vec<_> = self
            .plan
            .ready_after(&progress.completed, &progress.claimed)
            .into_iter()
            .cloned()
            .collect();

        for node in ready {
            progress.claimed.insert(node.name.clone());

            let mut input = SkillInput::new(ctx.input.clone());
            for dependency in &node.depends_on {
                if let Some(output) = progress.outputs.get(dependency) {
                    input = input.with_upstream(dependency.clone(), output.clone());
                }
            }

            let skill = self.skills.get(&node.name).cloned();
            let invoker = ctx.invoker.clone();
            let run_id = ctx.run_id.clone();
            let cancel = ctx.cancel.clone();
            let semaphore = ctx.semaphore.clone();
            let timeout = ctx.timeout;

            debug!(skill = %node.name, "Launching skill");

            tasks.spawn(
                async move {
                    let _permit = match semaphore {
                        Some(semaphore) => tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return SkillOutcome::timeout(
                                    &node.name,
                                    "run ended while waiting for a concurrency slot",
                                    current_timestamp_ms(),
                                );
                            }
                            permit = semaphore.acquire_owned() => permit.ok(),
                        },
                        None => None,
                    };

                    invoker
                        .invoke(&run_id, &node, skill, input, timeout, &cancel)
                        .await
                }
                .in_current_span(),
            );
        }
    }

    fn emit(&self, run_id: &str, skill: &str, kind: TraceEventKind) {
        self.emitter
            .skill_event(&SkillTraceEvent::new(run_id, skill, kind));
    }
}
