//! Dependency plan describing the fixed skill topology.
//!
//! The plan is a directed acyclic graph of [`SkillNode`]s. It is validated once
//! at construction and is immutable afterwards, so it can be shared between
//! concurrent runs behind an `Arc` without locking.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Names of the skills in the standard plan.
pub mod names {
    pub const REFINE: &str = "refine";
    pub const TRANSFORM: &str = "transform";
    pub const COMPRESS: &str = "compress";
    pub const CROSS_REFERENCE: &str = "cross_reference";
    pub const RAG: &str = "rag";
}

/// Errors detected while building a plan.
///
/// These are deployment-time configuration defects and the only errors the
/// pipeline ever propagates to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Dependency plan has no skills")]
    Empty,

    #[error("Skill `{0}` is declared more than once")]
    DuplicateSkill(String),

    #[error("Skill `{skill}` depends on unknown skill `{dependency}`")]
    UnknownDependency { skill: String, dependency: String },

    #[error("Dependency cycle detected through skill `{0}`")]
    Cycle(String),
}

/// The shape of a skill's output, used to pick the empty value that stands in
/// for it when the skill did not succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// A JSON object; empty value `{}`.
    #[default]
    Object,
    /// A JSON array; empty value `[]`.
    Array,
    /// A JSON string; empty value `""`.
    Text,
}

impl OutputShape {
    pub fn empty_value(&self) -> JsonValue {
        match self {
            OutputShape::Object => JsonValue::Object(Default::default()),
            OutputShape::Array => JsonValue::Array(Vec::new()),
            OutputShape::Text => JsonValue::String(String::new()),
        }
    }

    /// Returns true if `value` has this shape.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            OutputShape::Object => value.is_object(),
            OutputShape::Array => value.is_array(),
            OutputShape::Text => value.is_string(),
        }
    }
}

/// One skill in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillNode {
    pub name: String,
    /// Skills that must succeed before this one may start.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Whether a failure of this skill fails the whole run.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub empty_output: OutputShape,
}

fn default_true() -> bool {
    true
}

impl SkillNode {
    /// Creates a required node with no dependencies.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: BTreeSet::new(),
            required: true,
            empty_output: OutputShape::default(),
        }
    }

    /// Creates an optional node with no dependencies.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name)
        }
    }

    /// Adds a dependency on `dependency`.
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.insert(dependency.into());
        self
    }

    pub fn with_empty_output(mut self, shape: OutputShape) -> Self {
        self.empty_output = shape;
        self
    }

    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// A validated, immutable DAG of skills.
///
/// Forward edges live on each node (`depends_on`); reverse edges are kept
/// alongside for skip propagation.
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::pipeline::{DependencyPlan, SkillNode};
///
/// let plan = DependencyPlan::new([
///     SkillNode::required("refine"),
///     SkillNode::required("transform").after("refine"),
///     SkillNode::optional("rag"),
/// ])?;
///
/// assert_eq!(plan.roots().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DependencyPlan {
    nodes: BTreeMap<String, SkillNode>,
    /// Reverse edges: skill -> skills that depend on it
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyPlan {
    /// Builds and validates a plan.
    ///
    /// Fails on an empty node list, duplicate names, dependencies on skills
    /// that are not part of the plan, and cycles.
    pub fn new(nodes: impl IntoIterator<Item = SkillNode>) -> Result<Self, PlanError> {
        let mut by_name = BTreeMap::new();
        for node in nodes {
            if by_name.contains_key(&node.name) {
                return Err(PlanError::DuplicateSkill(node.name));
            }
            by_name.insert(node.name.clone(), node);
        }

        if by_name.is_empty() {
            return Err(PlanError::Empty);
        }

        for node in by_name.values() {
            if let Some(missing) = node.depends_on.iter().find(|d| !by_name.contains_key(*d)) {
                return Err(PlanError::UnknownDependency {
                    skill: node.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let plan = Self::from_nodes(by_name);
        if let Some(skill) = plan.find_cycle() {
            return Err(PlanError::Cycle(skill));
        }

        Ok(plan)
    }

    /// The five-skill pipeline:
    ///
    /// ```text
    /// refine -> transform -> compress
    /// cross_reference
    /// rag
    /// ```
    ///
    /// `refine` and `transform` are required; the rest are optional.
    pub fn standard() -> Self {
        let nodes = [
            SkillNode::required(names::REFINE).with_empty_output(OutputShape::Text),
            SkillNode::required(names::TRANSFORM).after(names::REFINE),
            SkillNode::optional(names::COMPRESS)
                .after(names::TRANSFORM)
                .with_empty_output(OutputShape::Text),
            SkillNode::optional(names::CROSS_REFERENCE),
            SkillNode::optional(names::RAG).with_empty_output(OutputShape::Array),
        ];

        Self::from_nodes(
            nodes
                .into_iter()
                .map(|node| (node.name.clone(), node))
                .collect(),
        )
    }

    fn from_nodes(nodes: BTreeMap<String, SkillNode>) -> Self {
        let mut dependents: BTreeMap<String, BTreeSet<String>> = nodes
            .keys()
            .map(|name| (name.clone(), BTreeSet::new()))
            .collect();

        for node in nodes.values() {
            for dependency in &node.depends_on {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(node.name.clone());
            }
        }

        Self { nodes, dependents }
    }

    /// All nodes, ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &SkillNode> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.required)
    }

    /// Nodes with no dependencies. These start immediately.
    pub fn roots(&self) -> Vec<&SkillNode> {
        self.nodes.values().filter(|n| n.is_root()).collect()
    }

    /// Nodes that may start now.
    ///
    /// A node is ready when every dependency is in `completed` (succeeded) and
    /// the node itself is not in `claimed` (already started, or already given
    /// a terminal outcome such as `skipped`).
    pub fn ready_after(
        &self,
        completed: &HashSet<String>,
        claimed: &HashSet<String>,
    ) -> Vec<&SkillNode> {
        self.nodes
            .values()
            .filter(|n| !claimed.contains(&n.name) && !completed.contains(&n.name))
            .filter(|n| n.depends_on.iter().all(|d| completed.contains(d)))
            .collect()
    }

    /// Skills that depend directly on `name`.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.dependents
            .get(name)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every skill reachable from `name` through reverse edges.
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if let Some(direct) = self.dependents.get(&current) {
                for dependent in direct {
                    if found.insert(dependent.clone()) {
                        stack.push(dependent.clone());
                    }
                }
            }
        }

        found
    }

    /// Returns a skill on a cycle, if any, using depth-first search.
    fn find_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        self.nodes
            .keys()
            .find_map(|name| self.find_cycle_dfs(name, &mut visited, &mut rec_stack))
    }

    fn find_cycle_dfs(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<String> {
        if rec_stack.contains(name) {
            return Some(name.to_string()); // back edge
        }

        if visited.contains(name) {
            return None;
        }

        visited.insert(name.to_string());
        rec_stack.insert(name.to_string());

        if let Some(node) = self.nodes.get(name) {
            for dependency in &node.depends_on {
                if let Some(skill) = self.find_cycle_dfs(dependency, visited, rec_stack) {
                    return Some(skill);
                }
            }
        }

        rec_stack.remove(name);
        None
    }
}
