//! Optimization report: qualitative notes and estimated improvements.
//!
//! Nothing here is measured. The figures are heuristics derived from the
//! analysis shape and the enabled options, and every estimate says so.

use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use serde::{Deserialize, Serialize};

pub const ESTIMATE_LABEL: &str = "estimate (not measured)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub area: String,
    /// Relative improvement over a generated artifact without the option.
    pub improvement_percent: f64,
    pub basis: String,
    pub label: String,
}

impl Estimate {
    fn new(area: &str, improvement_percent: f64, basis: String) -> Self {
        Estimate {
            area: area.to_string(),
            improvement_percent: (improvement_percent * 10.0).round() / 10.0,
            basis,
            label: ESTIMATE_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub notes: Vec<String>,
    pub estimates: Vec<Estimate>,
}

impl OptimizationReport {
    pub fn build(analysis: &ContextAnalysisResult, config: &GenerationConfig) -> Self {
        let mut report = OptimizationReport::default();
        let symbols = analysis.symbols.len();
        let depth = analysis.complexity.max_nesting_depth;

        if config.generate_symbol_table {
            // A seeded keyed table replaces a scan over every context.
            let speedup = if symbols <= 1 {
                0.0
            } else {
                (1.0 - 1.0 / (symbols as f64).log2().max(1.0)) * 100.0
            };
            report.estimates.push(Estimate::new(
                "symbol lookup",
                speedup,
                format!("{} symbols pre-seeded in a keyed table", symbols),
            ));
        }
        if config.generate_scope_manager && analysis.requires_context_tracking {
            report.estimates.push(Estimate::new(
                "scope resolution",
                (depth as f64 * 10.0).min(60.0),
                format!("explicit scope stack, observed nesting depth {}", depth),
            ));
        }
        if config.enable_context_optimization {
            report.estimates.push(Estimate::new(
                "scope allocation",
                if depth > 0 { 15.0 } else { 0.0 },
                format!("scope stack pre-sized to {} entries", depth + 1),
            ));
            report
                .notes
                .push("context optimization pre-sizes generated scope stacks".to_string());
        }
        if config.generate_inheritance_optimization && analysis.inheritance_chain.len() > 1 {
            report.estimates.push(Estimate::new(
                "inheritance resolution",
                ((analysis.inheritance_chain.len() - 1) as f64 * 20.0).min(80.0),
                format!(
                    "{} base grammars flattened into a constant chain",
                    analysis.inheritance_chain.len() - 1
                ),
            ));
        }

        if analysis.complexity.has_cyclic_references {
            report.notes.push(
                "cyclic cross-language references prevent ordering languages for eager resolution"
                    .to_string(),
            );
        }
        if analysis.complexity.unique_language_pairs > 3 {
            report.notes.push(format!(
                "{} language pairs interact; consider narrowing validation rules",
                analysis.complexity.unique_language_pairs
            ));
        }
        if !analysis.symbol_table_sharing {
            report
                .notes
                .push("local symbol sharing: generated lookups never leave their language".to_string());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ContextComplexity;
    use braid_core::SharingStrategy;
    use std::collections::BTreeMap;

    fn analysis(depth: usize) -> ContextAnalysisResult {
        ContextAnalysisResult {
            grammar: "G".into(),
            requires_context_tracking: true,
            symbols: BTreeMap::new(),
            contexts: Vec::new(),
            inheritance_chain: vec!["G".into()],
            embedded_languages: Vec::new(),
            context_switches: Vec::new(),
            cross_language_references: Vec::new(),
            sharing: SharingStrategy::Local,
            symbol_table_sharing: false,
            validation_required: false,
            validation_rules: Vec::new(),
            complexity: ContextComplexity {
                max_nesting_depth: depth,
                ..ContextComplexity::default()
            },
        }
    }

    #[test]
    fn every_estimate_is_labeled() {
        let config = GenerationConfig {
            enable_context_optimization: true,
            ..GenerationConfig::default()
        };
        let report = OptimizationReport::build(&analysis(2), &config);
        assert!(!report.estimates.is_empty());
        assert!(report.estimates.iter().all(|e| e.label == ESTIMATE_LABEL));
        assert!(report.notes.iter().any(|n| n.contains("local symbol sharing")));
    }

    #[test]
    fn scope_estimate_is_capped() {
        let report = OptimizationReport::build(&analysis(40), &GenerationConfig::default());
        let scope = report
            .estimates
            .iter()
            .find(|e| e.area == "scope resolution")
            .unwrap();
        assert_eq!(scope.improvement_percent, 60.0);
    }
}
