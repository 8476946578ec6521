//! Merging a settled run into the caller-facing result.

use super::outcome::{PipelineRun, RunStatus, SkillOutcome, SkillStatus};
use super::plan::{DependencyPlan, SkillNode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// The per-skill entry of a [`MergedResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub status: SkillStatus,
    /// The skill's output, or the empty value of its shape. Never `null`.
    pub output: JsonValue,
}

/// The only artifact callers consume from the pipeline.
///
/// Keyed by skill name, so the content does not depend on the order in which
/// skills finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub overall_status: RunStatus,
    pub per_skill: BTreeMap<String, SkillResult>,
}

impl MergedResult {
    pub fn output(&self, name: &str) -> Option<&JsonValue> {
        self.per_skill.get(name).map(|r| &r.output)
    }

    pub fn status(&self, name: &str) -> Option<SkillStatus> {
        self.per_skill.get(name).map(|r| r.status)
    }

    /// Returns true unless a required skill failed.
    pub fn is_usable(&self) -> bool {
        self.overall_status != RunStatus::Failed
    }
}

/// Turns runs of one plan into [`MergedResult`]s.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    plan: Arc<DependencyPlan>,
}

impl ResultAggregator {
    pub fn new(plan: Arc<DependencyPlan>) -> Self {
        Self { plan }
    }

    /// Computes the overall status of a run.
    ///
    /// - `Failed` if any required skill ended in error, timeout or circuit_open.
    /// - `Partial` if not failed and any skill did not succeed.
    /// - `Success` otherwise.
    ///
    /// A skill with no recorded outcome counts as timed out.
    pub fn overall_status(&self, run: &PipelineRun) -> RunStatus {
        let mut all_succeeded = true;

        for node in self.plan.nodes() {
            let status = status_or_timeout(run.outcome(&node.name));
            if node.required && status.is_failure() {
                return RunStatus::Failed;
            }
            all_succeeded &= status.is_success();
        }

        if all_succeeded {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    /// Builds the merged result for `run`.
    pub fn merge(&self, run: &PipelineRun) -> MergedResult {
        let per_skill = self
            .plan
            .nodes()
            .map(|node| {
                let outcome = run.outcome(&node.name);
                let result = SkillResult {
                    status: status_or_timeout(outcome),
                    output: self.extract(node, outcome),
                };
                (node.name.clone(), result)
            })
            .collect();

        MergedResult {
            overall_status: self.overall_status(run),
            per_skill,
        }
    }

    /// Output of a successful skill whose output has the declared shape;
    /// the shape's empty value in every other case.
    fn extract(&self, node: &SkillNode, outcome: Option<&SkillOutcome>) -> JsonValue {
        let output = outcome
            .filter(|o| o.status.is_success())
            .and_then(|o| o.output.as_ref());

        match output {
            Some(value) if node.empty_output.accepts(value) => value.clone(),
            Some(_) => {
                warn!(
                    skill = %node.name,
                    expected = ?node.empty_output,
                    "Skill output does not match its declared shape, using empty value"
                );
                node.empty_output.empty_value()
            }
            None => node.empty_output.empty_value(),
        }
    }
}

fn status_or_timeout(outcome: Option<&SkillOutcome>) -> SkillStatus {
    outcome.map(|o| o.status).unwrap_or(SkillStatus::Timeout)
}
