//! ValidationOutcome -- aggregated output of one validator call.

use crate::issues::{ReferenceValidationResult, SemanticValidationResult, SymbolValidationResult};
use braid_core::{Severity, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_us: u64,
    pub symbol_pass_us: u64,
    pub reference_pass_us: u64,
    pub semantic_pass_us: u64,
    pub rule_pass_us: u64,
    pub symbols_validated: usize,
    pub references_validated: usize,
    pub symbol_cache_hits: u64,
    pub reference_cache_hits: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub validated_languages: BTreeSet<String>,
    pub total_symbols: usize,
    pub total_references: usize,
    /// Percentage of symbols and references that went through the
    /// validator. 100 when there was nothing to validate.
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    /// Grammar rule results, or the single synthetic error of a degraded call.
    pub validation_results: Vec<ValidationResult>,
    pub symbol_validation_results: Vec<SymbolValidationResult>,
    pub reference_validation_results: Vec<ReferenceValidationResult>,
    pub semantic_validation_results: Vec<SemanticValidationResult>,
    pub performance_metrics: PerformanceMetrics,
    pub summary: ValidationSummary,
}

impl ValidationOutcome {
    /// Fill `summary` and `success` from the collected results.
    pub(crate) fn summarize(&mut self, total_symbols: usize, total_references: usize) {
        let mut counts = [0usize; 3];
        let mut count = |s: Severity| match s {
            Severity::Error => counts[0] += 1,
            Severity::Warning => counts[1] += 1,
            Severity::Info => counts[2] += 1,
        };
        let mut languages = BTreeSet::new();

        for r in &self.symbol_validation_results {
            languages.insert(r.language.clone());
            r.issues.iter().for_each(|i| count(i.severity));
        }
        for r in &self.reference_validation_results {
            languages.insert(r.source_language.clone());
            languages.insert(r.target_language.clone());
            r.issues.iter().for_each(|i| count(i.severity));
        }
        for r in &self.semantic_validation_results {
            languages.insert(r.language.clone());
            r.violations.iter().for_each(|_| count(Severity::Error));
            r.warnings.iter().for_each(|_| count(Severity::Warning));
        }
        for r in self.validation_results.iter().filter(|r| !r.valid) {
            count(r.severity);
        }

        let validated = self.symbol_validation_results.len() + self.reference_validation_results.len();
        let total = total_symbols + total_references;
        let coverage = if total == 0 {
            100.0
        } else {
            validated as f64 * 100.0 / total as f64
        };

        self.summary = ValidationSummary {
            errors: counts[0],
            warnings: counts[1],
            infos: counts[2],
            validated_languages: languages,
            total_symbols,
            total_references,
            coverage,
        };
        self.success = counts[0] == 0;
    }

    pub fn errors(&self) -> usize {
        self.summary.errors
    }
}
