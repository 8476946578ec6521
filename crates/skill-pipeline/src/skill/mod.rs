//! The skill contract consumed by the pipeline.
//!
//! A skill is an independently invocable capability provider. The pipeline
//! treats its input and output as opaque JSON values and only cares whether a
//! call succeeded, failed, or did not answer in time.
//!
//! # Implementing a skill
//!
//! ```ignore
//! use async_trait::async_trait;
//! use serde_json::{Value as JsonValue, json};
//! use skill_pipeline::skill::{Skill, SkillError, SkillInput};
//!
//! struct Refine;
//!
//! #[async_trait]
//! impl Skill for Refine {
//!     async fn execute(&self, input: SkillInput) -> Result<JsonValue, SkillError> {
//!         let text = input
//!             .input
//!             .as_str()
//!             .ok_or_else(|| SkillError::InvalidInput("expected a string".to_string()))?;
//!         Ok(json!(text.trim()))
//!     }
//! }
//! ```

pub mod error;
pub mod registry;

pub use error::SkillError;
pub use registry::{SkillMap, SkillRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// What a skill receives for one invocation.
///
/// `input` is the request's initial input, identical for every skill in a run.
/// `upstream` holds the outputs of the skill's direct dependencies, keyed by
/// skill name. Only successful dependencies appear here, since a skill never
/// runs when one of its dependencies did not succeed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillInput {
    pub input: JsonValue,
    #[serde(default)]
    pub upstream: BTreeMap<String, JsonValue>,
}

impl SkillInput {
    /// Creates an input with no upstream outputs.
    pub fn new(input: JsonValue) -> Self {
        Self {
            input,
            upstream: BTreeMap::new(),
        }
    }

    /// Adds the output of an upstream skill.
    pub fn with_upstream(mut self, name: impl Into<String>, output: JsonValue) -> Self {
        self.upstream.insert(name.into(), output);
        self
    }

    /// Returns the output of the named upstream skill, if present.
    pub fn upstream(&self, name: &str) -> Option<&JsonValue> {
        self.upstream.get(name)
    }

    /// Like [`SkillInput::upstream`], but fails with
    /// [`SkillError::MissingUpstream`] when the output is absent.
    pub fn require_upstream(&self, name: &str) -> Result<&JsonValue, SkillError> {
        self.upstream
            .get(name)
            .ok_or_else(|| SkillError::MissingUpstream(name.to_string()))
    }
}

/// The uniform execute contract every capability provider implements.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Runs the skill once.
    ///
    /// Implementations report failure through `Err`. Panics are caught by the
    /// pipeline and turned into `error` outcomes as well, but returning an
    /// error is the expected path.
    async fn execute(&self, input: SkillInput) -> Result<JsonValue, SkillError>;

    /// Returns the name of this skill.
    ///
    /// By default, this returns the type name. Can be overridden for custom naming.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("UnknownSkill")
            .to_string()
    }
}
