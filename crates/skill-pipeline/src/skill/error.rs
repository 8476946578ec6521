//! Error types for the skill module.

use thiserror::Error;

/// Errors a skill can signal back to the pipeline.
///
/// The pipeline never inspects the variant: every `SkillError` becomes an
/// `error` outcome carrying the rendered message.
#[derive(Debug, Error)]
pub enum SkillError {
    /// The skill ran but could not produce an output.
    #[error("Skill execution failed: {0}")]
    ExecutionFailed(String),

    /// The input handed to the skill was not usable.
    #[error("Invalid skill input: {0}")]
    InvalidInput(String),

    /// A dependency output the skill relies on was not supplied.
    #[error("Missing upstream output: {0}")]
    MissingUpstream(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A generic error for other cases.
    #[error("Skill error: {0}")]
    Other(String),
}

impl SkillError {
    /// Shorthand for [`SkillError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failed_message() {
        let err = SkillError::failed("backend unavailable");
        assert_eq!(err.to_string(), "Skill execution failed: backend unavailable");
    }

    #[test]
    fn test_missing_upstream_message() {
        let err = SkillError::MissingUpstream("refine".to_string());
        assert_eq!(err.to_string(), "Missing upstream output: refine");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SkillError = json_err.into();
        assert!(matches!(err, SkillError::JsonError(_)));
        assert!(err.to_string().starts_with("JSON error:"));
    }
}
