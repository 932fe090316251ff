//! Braid cross-language validator.
//!
//! Consumes the contexts and cross-language references produced by
//! `braid_core::EmbeddedLanguageManager` and runs four passes over them:
//! symbols, references, semantic rules and grammar `@VALIDATE` rules. The
//! results are aggregated into a [`ValidationOutcome`] with a summary and
//! per-pass timings.

pub mod error;
pub mod issues;
pub mod references;
pub mod report;
pub mod rules;
pub mod semantic;
pub mod symbols;

#[cfg(test)]
mod fixtures;

pub use error::ValidationError;
pub use issues::{
    Issue, ReferenceIssue, ReferenceIssueKind, ReferenceValidationResult, ResolutionStep,
    SemanticFindings, SemanticValidationResult, StepKind, SymbolIssue, SymbolIssueKind,
    SymbolValidationResult,
};
pub use references::DEPRECATED_ATTRIBUTE;
pub use report::{PerformanceMetrics, ValidationOutcome, ValidationSummary};
pub use semantic::{ReservedNames, SemanticRule};

use braid_core::{
    CrossLanguageReference, EmbeddedLanguageContext, EmbeddedSession, Grammar, Severity,
    ValidationResult, ValidationRule,
};
use std::time::Instant;

/// Validator instance. Caches live on the instance and are cleared at the
/// start of every [`CrossLanguageValidator::validate`] call.
#[derive(Default)]
pub struct CrossLanguageValidator {
    rules: Vec<ValidationRule>,
    semantic_rules: Vec<Box<dyn SemanticRule>>,
    symbol_cache: symbols::SymbolCache,
    reference_cache: references::ReferenceCache,
}

impl CrossLanguageValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<ValidationRule>) -> Self {
        CrossLanguageValidator {
            rules,
            ..Self::default()
        }
    }

    /// A validator carrying the grammar's declared `@VALIDATE` rules.
    pub fn for_grammar(grammar: &dyn Grammar) -> Self {
        Self::with_rules(grammar.validation_rules().to_vec())
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn register_semantic_rule(
        &mut self,
        rule: Box<dyn SemanticRule>,
    ) -> Result<(), ValidationError> {
        if self.semantic_rules.iter().any(|r| r.name() == rule.name()) {
            return Err(ValidationError::DuplicateSemanticRule(rule.name().to_string()));
        }
        self.semantic_rules.push(rule);
        Ok(())
    }

    /// Validate a finished embedded-language session.
    pub fn validate_session(&mut self, session: &EmbeddedSession) -> ValidationOutcome {
        self.validate(&session.contexts, &session.cross_language_references)
    }

    /// Run all passes over `contexts` and `references`.
    ///
    /// A failing semantic rule discards every result of the call and
    /// returns a single error result instead.
    pub fn validate(
        &mut self,
        contexts: &[EmbeddedLanguageContext],
        references: &[CrossLanguageReference],
    ) -> ValidationOutcome {
        let started = Instant::now();
        self.symbol_cache.clear();
        self.reference_cache.clear();
        let mut metrics = PerformanceMetrics::default();

        let total_symbols: usize = contexts.iter().map(|c| c.symbols.len()).sum();
        tracing::info!(
            contexts = contexts.len(),
            symbols = total_symbols,
            references = references.len(),
            "validation started"
        );

        let pass = Instant::now();
        let symbol_results = symbols::validate_symbols(
            contexts,
            references,
            &mut self.symbol_cache,
            &mut metrics.symbol_cache_hits,
        );
        metrics.symbol_pass_us = micros(pass);

        let pass = Instant::now();
        let reference_results = references::validate_references(
            contexts,
            references,
            &mut self.reference_cache,
            &mut metrics.reference_cache_hits,
        );
        metrics.reference_pass_us = micros(pass);

        let pass = Instant::now();
        let semantic_results = match semantic::validate_semantics(&self.semantic_rules, contexts) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "validation aborted");
                return degraded(err, total_symbols, references.len(), started);
            }
        };
        metrics.semantic_pass_us = micros(pass);

        let pass = Instant::now();
        let rule_results = rules::apply_rules(&self.rules, references, &reference_results);
        metrics.rule_pass_us = micros(pass);

        metrics.symbols_validated = symbol_results.len();
        metrics.references_validated = reference_results.len();
        metrics.total_us = micros(started);

        let mut outcome = ValidationOutcome {
            success: false,
            validation_results: rule_results,
            symbol_validation_results: symbol_results,
            reference_validation_results: reference_results,
            semantic_validation_results: semantic_results,
            performance_metrics: metrics,
            summary: ValidationSummary::default(),
        };
        outcome.summarize(total_symbols, references.len());
        tracing::info!(
            success = outcome.success,
            errors = outcome.summary.errors,
            warnings = outcome.summary.warnings,
            coverage = outcome.summary.coverage,
            "validation finished"
        );
        outcome
    }
}

fn micros(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

fn degraded(
    err: ValidationError,
    total_symbols: usize,
    total_references: usize,
    started: Instant,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome {
        validation_results: vec![ValidationResult {
            rule: "validator".to_string(),
            reference: None,
            valid: false,
            severity: Severity::Error,
            message: err.to_string(),
            suggestions: vec!["fix or disable the failing semantic rule".to_string()],
            related_references: Vec::new(),
            position: None,
        }],
        ..ValidationOutcome::default()
    };
    outcome.performance_metrics.total_us = micros(started);
    outcome.summarize(total_symbols, total_references);
    outcome
}
