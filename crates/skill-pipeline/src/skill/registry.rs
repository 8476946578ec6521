//! Name-to-implementation lookup for skills.

use super::Skill;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves a skill name to an implementation.
///
/// The orchestrator calls `resolve` once per skill name when it is built and
/// caches the handles, so implementations are free to do expensive work here.
pub trait SkillRegistry: Send + Sync {
    /// Returns the skill registered under `name`, or `None` if there is none.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Skill>>;
}

impl<F> SkillRegistry for F
where
    F: Fn(&str) -> Option<Arc<dyn Skill>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self(name)
    }
}

/// An in-memory registry backed by a `HashMap`.
///
/// # Examples
///
/// ```ignore
/// use skill_pipeline::skill::SkillMap;
/// use std::sync::Arc;
///
/// let skills = SkillMap::new()
///     .with("refine", Arc::new(RefineSkill))
///     .with("rag", Arc::new(RetrievalSkill));
/// ```
#[derive(Clone, Default)]
pub struct SkillMap {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillMap {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a skill, replacing any previous registration under the same name.
    pub fn register(&mut self, name: impl Into<String>, skill: Arc<dyn Skill>) {
        self.skills.insert(name.into(), skill);
    }

    /// Builder-style variant of [`SkillMap::register`].
    pub fn with(mut self, name: impl Into<String>, skill: Arc<dyn Skill>) -> Self {
        self.register(name, skill);
        self
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl SkillRegistry for SkillMap {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }
}

impl fmt::Debug for SkillMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.skills.keys().collect();
        names.sort();
        f.debug_struct("SkillMap").field("skills", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{SkillError, SkillInput};
    use async_trait::async_trait;
    use serde_json::{Value as JsonValue, json};

    struct Constant(JsonValue);

    #[async_trait]
    impl Skill for Constant {
        async fn execute(&self, _input: SkillInput) -> Result<JsonValue, SkillError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_new_map_is_empty() {
        let map = SkillMap::new();
        assert!(map.is_empty());
        assert!(map.resolve("refine").is_none());
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let map = SkillMap::new().with("refine", Arc::new(Constant(json!("ok"))));

        assert_eq!(map.len(), 1);

        let skill = map.resolve("refine").unwrap();
        let output = skill.execute(SkillInput::default()).await.unwrap();
        assert_eq!(output, json!("ok"));
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let mut map = SkillMap::new();
        map.register("rag", Arc::new(Constant(json!(1))));
        map.register("rag", Arc::new(Constant(json!(2))));

        assert_eq!(map.len(), 1);
        let output = map
            .resolve("rag")
            .unwrap()
            .execute(SkillInput::default())
            .await
            .unwrap();
        assert_eq!(output, json!(2));
    }

    #[test]
    fn test_closure_registry() {
        let registry = |name: &str| -> Option<Arc<dyn Skill>> {
            (name == "compress").then(|| Arc::new(Constant(json!("short"))) as Arc<dyn Skill>)
        };

        assert!(registry.resolve("compress").is_some());
        assert!(registry.resolve("rag").is_none());
    }

    #[test]
    fn test_debug_lists_sorted_names() {
        let map = SkillMap::new()
            .with("transform", Arc::new(Constant(json!({}))))
            .with("refine", Arc::new(Constant(json!(""))));

        let debug = format!("{:?}", map);
        assert_eq!(debug, r#"SkillMap { skills: ["refine", "transform"] }"#);
    }
}
