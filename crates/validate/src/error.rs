//! Hard validator failures.

use braid_core::ContextId;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Two semantic rules were registered under one name.
    #[error("semantic rule '{0}' is already registered")]
    DuplicateSemanticRule(String),

    /// A semantic rule body failed. The whole call degrades to a single
    /// error result.
    #[error("semantic rule '{rule}' failed on context {context}: {message}")]
    SemanticRuleFailed {
        rule: String,
        context: ContextId,
        message: String,
    },
}
