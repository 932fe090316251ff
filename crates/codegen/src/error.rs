//! Code generation errors.

use crate::generator::TargetLanguage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// No generator exists for the requested target.
    #[error("unsupported target language '{0}'")]
    UnsupportedTarget(String),

    #[error("a generator for {0} is already registered")]
    DuplicateGenerator(TargetLanguage),

    #[error("invalid module name '{0}': expected an identifier")]
    InvalidModuleName(String),

    /// A backend could not produce an artifact.
    #[error("{target} generator failed: {message}")]
    Generation {
        target: TargetLanguage,
        message: String,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A generator failure recorded in [`GeneratedCode`](crate::GeneratedCode)
/// instead of being propagated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGenerationError {
    pub target: TargetLanguage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl CodeGenerationError {
    pub fn new(target: TargetLanguage, message: impl Into<String>) -> Self {
        CodeGenerationError {
            target,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn in_artifact(mut self, artifact: &str) -> Self {
        self.artifact = Some(artifact.to_string());
        self
    }
}
