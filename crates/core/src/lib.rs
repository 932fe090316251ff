#![allow(clippy::result_large_err)]
//! braid-core: context-sensitive parsing with embedded languages.
//!
//! Grammar files are loaded into a [`GrammarRegistry`] (following
//! `@IMPORT`s through a [`SourceProvider`]), then input is scanned by a
//! [`ContextEngine`] into a tree of [`ParseContext`]s, or by an
//! [`EmbeddedLanguageManager`] when the input switches between languages.
//!
//! # Public API
//!
//! - [`parse_grammar()`] -- grammar text to [`GrammarSpec`] plus diagnostics
//! - [`GrammarRegistry::load_with_provider`] -- load a grammar and its imports
//! - [`ContextEngine::parse_with_context`] -- single-language parse
//! - [`EmbeddedLanguageManager::parse_with_embedded_languages`] -- parse
//!   with language switches and cross-language references
//! - [`resolve_inheritance()`] -- rules and symbols picked up from bases

/// Version stamped into generated code headers and JSON output.
pub const BRAID_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cancel;
pub mod config;
pub mod context;
pub mod embedded;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod inheritance;
pub mod source;
pub mod symbol_table;
pub mod syntax;
pub mod tokenizer;
pub mod validation;

// ── Convenience re-exports: key types ────────────────────────────────

pub use cancel::{CancellationToken, ScanBudget};
pub use config::EngineConfig;
pub use context::{
    ContextId, ContextRule, ParseContext, Position, RuleAction, RuleCondition, ScopeKind,
    SymbolInfo, SymbolKind, Visibility,
};
pub use embedded::{
    ContextSwitchFrame, CrossLanguageReference, EmbeddedLanguageContext, EmbeddedLanguageManager,
    EmbeddedOutcome, EmbeddedSession, ReferenceId, ReferenceOrigin, ValidationQueueItem,
};
pub use engine::{ContextEngine, ParseMetrics, ParseOutcome, ParseSession, RuleExecutor, RulePredicate};
pub use error::{BraidError, Diagnostic, Severity};
pub use grammar::registry::LoadReport;
pub use grammar::{Grammar, GrammarRegistry, GrammarSpec, LoadOptions, SwitchPattern};
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};
pub use symbol_table::{SharingStrategy, SymbolHierarchy, SymbolTableLevel};
pub use syntax::{SyntaxKind, SyntaxNode};
pub use tokenizer::{Token, TokenKind, TokenSplitter, Tokenizer};
pub use validation::{RuleCheck, ValidationResult, ValidationRule};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use grammar::parse_grammar;
pub use inheritance::resolve_inheritance;
