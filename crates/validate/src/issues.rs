//! Per-item findings produced by the symbol and reference passes.

use braid_core::{ContextId, Position, ReferenceId, Severity, SymbolKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolIssueKind {
    Undefined,
    Redefined,
    TypeMismatch,
    ScopeViolation,
    VisibilityViolation,
    UnusedSymbol,
    CircularReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceIssueKind {
    UnresolvedReference,
    AmbiguousReference,
    TypeIncompatibility,
    ScopeInaccessible,
    LanguageMismatch,
    DeprecatedReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue<K> {
    pub kind: K,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    pub position: Option<Position>,
}

pub type SymbolIssue = Issue<SymbolIssueKind>;
pub type ReferenceIssue = Issue<ReferenceIssueKind>;

impl<K> Issue<K> {
    pub fn new(kind: K, severity: Severity, message: impl Into<String>) -> Self {
        Issue {
            kind,
            severity,
            message: message.into(),
            suggestion: None,
            position: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// One symbol definition, checked once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolValidationResult {
    pub language: String,
    pub symbol: String,
    pub kind: SymbolKind,
    pub context: ContextId,
    pub valid: bool,
    pub issues: Vec<SymbolIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    TargetLanguage,
    SymbolResolution,
    TypeCompatibility,
    ScopeAccessibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStep {
    pub step: StepKind,
    pub success: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValidationResult {
    pub reference: ReferenceId,
    pub source_language: String,
    pub target_language: String,
    pub source_symbol: String,
    pub target_symbol: String,
    pub valid: bool,
    pub steps: Vec<ResolutionStep>,
    pub issues: Vec<ReferenceIssue>,
    pub target_context: Option<ContextId>,
    pub target_type: Option<String>,
}

impl ReferenceValidationResult {
    pub fn has_issue(&self, kind: ReferenceIssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    pub fn step(&self, step: StepKind) -> Option<&ResolutionStep> {
        self.steps.iter().find(|s| s.step == step)
    }
}

/// Violations, warnings and suggestions a semantic rule reports for one
/// context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticFindings {
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticValidationResult {
    pub rule: String,
    pub context: ContextId,
    pub language: String,
    pub valid: bool,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}
