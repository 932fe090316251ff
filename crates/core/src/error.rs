use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Hard failures that stop grammar loading or session setup outright.
///
/// Anything a user can fix in their grammar or input is reported as a
/// [`Diagnostic`] instead; these are reserved for I/O, import cycles and
/// configuration that cannot be interpreted at all.
#[derive(Debug, thiserror::Error)]
pub enum BraidError {
    /// A grammar source could not be read through the source provider.
    #[error("cannot read grammar source '{path}': {message}")]
    Source { path: PathBuf, message: String },

    /// `@IMPORT` directives form a cycle.
    #[error("import cycle detected: {}", chain.join(" \u{2192} "))]
    ImportCycle { chain: Vec<String> },

    /// The root grammar (or an import) is not usable at all.
    #[error("grammar '{grammar}' failed to load: {}", first_message(diagnostics))]
    GrammarLoad {
        grammar: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// A grammar name was requested from the registry but never registered.
    #[error("unknown grammar '{0}'")]
    UnknownGrammar(String),

    /// The `TokenPattern` header is not a valid regular expression.
    #[error("invalid token pattern '{pattern}': {message}")]
    TokenPattern { pattern: String, message: String },
}

fn first_message(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map(|d| d.to_string())
        .unwrap_or_else(|| "no diagnostics".to_string())
}

/// Severity of a diagnostic or validation finding. Ordered so that
/// `Error > Warning > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Queue priority used when scheduling validation work.
    pub fn priority(self) -> u8 {
        match self {
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info => 1,
        }
    }

    pub fn parse(s: &str) -> Option<Severity> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Severity::Error),
            "warning" | "warn" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A positioned, user-facing finding from grammar loading or parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn new(code: &str, severity: Severity, line: u32, message: impl Into<String>) -> Self {
        Diagnostic {
            code: code.to_owned(),
            severity,
            message: message.into(),
            line,
            column: None,
            suggestion: None,
            file: None,
        }
    }

    pub fn error(code: &str, line: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(code, Severity::Error, line, message)
    }

    pub fn warning(code: &str, line: u32, message: impl Into<String>) -> Self {
        Diagnostic::new(code, Severity::Warning, line, message)
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.file = Some(file.to_owned());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file)?;
        }
        write!(f, "{}", self.line)?;
        if let Some(col) = self.column {
            write!(f, ":{}", col)?;
        }
        write!(f, ": {} [{}]: {}", self.severity, self.code, self.message)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (help: {})", s)?;
        }
        Ok(())
    }
}

/// True when any diagnostic in the list is error-severity.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Stable diagnostic codes emitted by this crate.
pub mod codes {
    pub const CONTEXT_PARSE_ERROR: &str = "CONTEXT_PARSE_ERROR";
    pub const UNCLOSED_SCOPE: &str = "UNCLOSED_SCOPE";
    pub const CONTEXT_DEPTH_EXCEEDED: &str = "CONTEXT_DEPTH_EXCEEDED";
    pub const SWITCH_DEPTH_EXCEEDED: &str = "SWITCH_DEPTH_EXCEEDED";
    pub const PARSE_CANCELLED: &str = "PARSE_CANCELLED";
    pub const PARSE_DEADLINE_EXCEEDED: &str = "PARSE_DEADLINE_EXCEEDED";
    pub const INHERITANCE_UNRESOLVED: &str = "INHERITANCE_UNRESOLVED";
    pub const INHERITANCE_CYCLE: &str = "INHERITANCE_CYCLE";
    pub const UNKNOWN_CUSTOM_RULE: &str = "UNKNOWN_CUSTOM_RULE";
    pub const RULE_EXECUTION_FAILED: &str = "RULE_EXECUTION_FAILED";
    pub const UNTERMINATED_CONTEXT: &str = "UNTERMINATED_CONTEXT";
    pub const UNEXPECTED_CONTEXT_END: &str = "UNEXPECTED_CONTEXT_END";
    pub const EMBEDDED_GRAMMAR_MISSING: &str = "EMBEDDED_GRAMMAR_MISSING";

    pub const INVALID_SYMBOL_NAME: &str = "INVALID_SYMBOL_NAME";
    pub const INVALID_SYMBOL_TYPE: &str = "INVALID_SYMBOL_TYPE";
    pub const UNKNOWN_TOKEN_SPLITTER: &str = "UNKNOWN_TOKEN_SPLITTER";
    pub const UNKNOWN_SHARING_STRATEGY: &str = "UNKNOWN_SHARING_STRATEGY";
    pub const UNKNOWN_COMPOSITION_STRATEGY: &str = "UNKNOWN_COMPOSITION_STRATEGY";
    pub const UNRESOLVED_REFERENCE_TARGET: &str = "UNRESOLVED_REFERENCE_TARGET";
    pub const MALFORMED_DIRECTIVE: &str = "MALFORMED_DIRECTIVE";
    pub const UNBALANCED_CONDITIONAL: &str = "UNBALANCED_CONDITIONAL";
    pub const UNTERMINATED_BLOCK: &str = "UNTERMINATED_BLOCK";
    pub const UNKNOWN_DIRECTIVE: &str = "UNKNOWN_DIRECTIVE";
    pub const UNKNOWN_HEADER: &str = "UNKNOWN_HEADER";
    pub const INVALID_RULE: &str = "INVALID_RULE";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position_and_suggestion() {
        let d = Diagnostic::error(codes::CONTEXT_PARSE_ERROR, 3, "unbalanced '}'")
            .with_column(7)
            .with_suggestion("remove the extra '}'");
        assert_eq!(
            d.to_string(),
            "3:7: error [CONTEXT_PARSE_ERROR]: unbalanced '}' (help: remove the extra '}')"
        );
    }

    #[test]
    fn severity_ordering_matches_priority() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Error.priority() > Severity::Info.priority());
        assert_eq!(Severity::parse("WARN"), Some(Severity::Warning));
        assert_eq!(Severity::parse("fatal"), None);
    }

    #[test]
    fn import_cycle_message_lists_chain() {
        let e = BraidError::ImportCycle {
            chain: vec!["a.grammar".into(), "b.grammar".into(), "a.grammar".into()],
        };
        assert!(e.to_string().contains("a.grammar \u{2192} b.grammar"));
    }
}
