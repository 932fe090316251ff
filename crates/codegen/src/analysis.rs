//! Context analysis: the hand-off from a parse session to the generators.
//!
//! [`ContextAnalysisResult`] flattens an [`EmbeddedSession`] into what a
//! backend needs: resolved symbols, a context summary, the inheritance
//! chain, switch statistics and a complexity estimate including
//! cross-language reference cycles.

use braid_core::{
    resolve_inheritance, ContextId, CrossLanguageReference, EmbeddedSession, Grammar,
    GrammarRegistry, ScopeKind, SharingStrategy, SymbolKind, ValidationRule, Visibility,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A symbol as the generators see it: qualified by language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedSymbol {
    pub name: String,
    pub language: String,
    pub kind: SymbolKind,
    pub scope: ContextId,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
}

impl AnalyzedSymbol {
    /// `language.name`, the key used in [`ContextAnalysisResult::symbols`].
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.language, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub id: ContextId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ContextId>,
    pub language: String,
    pub scope: ScopeKind,
    pub depth: usize,
    pub symbol_count: usize,
}

/// Switches sharing a language pair and trigger, counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitchInfo {
    pub source_language: String,
    pub target_language: String,
    pub trigger: String,
    pub end_trigger: String,
    pub max_nesting_level: usize,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextComplexity {
    pub max_nesting_depth: usize,
    pub total_switches: usize,
    pub unique_language_pairs: usize,
    pub has_cyclic_references: bool,
    /// One cycle through the reference graph, first node repeated at the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysisResult {
    pub grammar: String,
    pub requires_context_tracking: bool,
    pub symbols: BTreeMap<String, AnalyzedSymbol>,
    pub contexts: Vec<ContextSummary>,
    /// The grammar itself followed by its resolved bases, nearest first.
    pub inheritance_chain: Vec<String>,
    pub embedded_languages: Vec<String>,
    pub context_switches: Vec<ContextSwitchInfo>,
    pub cross_language_references: Vec<CrossLanguageReference>,
    pub sharing: SharingStrategy,
    /// Embedded languages see symbols outside their own level.
    pub symbol_table_sharing: bool,
    pub validation_required: bool,
    pub validation_rules: Vec<ValidationRule>,
    pub complexity: ContextComplexity,
}

impl ContextAnalysisResult {
    pub fn analyze(
        grammar: &dyn Grammar,
        registry: &GrammarRegistry,
        session: &EmbeddedSession,
    ) -> Self {
        let mut symbols = BTreeMap::new();
        for ctx in &session.contexts {
            for symbol in ctx.symbols.values() {
                let analyzed = AnalyzedSymbol {
                    name: symbol.name.clone(),
                    language: ctx.language.clone(),
                    kind: symbol.kind.clone(),
                    scope: symbol.scope,
                    visibility: symbol.visibility,
                    declared_type: symbol.declared_type().map(str::to_string),
                };
                // First definition wins, as in the symbol hierarchy.
                symbols.entry(analyzed.qualified_name()).or_insert(analyzed);
            }
        }

        let contexts: Vec<ContextSummary> = session
            .contexts
            .iter()
            .map(|c| ContextSummary {
                id: c.id,
                parent: c.parent,
                language: c.language.clone(),
                scope: c.scope.clone(),
                depth: c.depth,
                symbol_count: c.symbols.len(),
            })
            .collect();

        let mut inheritance_chain = vec![grammar.name().to_string()];
        inheritance_chain.extend(resolve_inheritance(grammar, registry, false).chain);

        let context_switches = summarize_switches(session);
        let graph = reference_graph(&session.cross_language_references);
        let cycle = detect_cycle(&graph);
        let pairs: BTreeSet<(&str, &str)> = session
            .context_switches
            .iter()
            .map(|f| (f.source_language.as_str(), f.target_language.as_str()))
            .chain(
                session
                    .cross_language_references
                    .iter()
                    .map(|r| (r.source_language.as_str(), r.target_language.as_str())),
            )
            .collect();
        let complexity = ContextComplexity {
            max_nesting_depth: contexts.iter().map(|c| c.depth).max().unwrap_or(0),
            total_switches: session.context_switches.len(),
            unique_language_pairs: pairs.len(),
            has_cyclic_references: cycle.is_some(),
            cycle,
        };

        let sharing = grammar.sharing();
        let result = ContextAnalysisResult {
            grammar: grammar.name().to_string(),
            requires_context_tracking: grammar.context_sensitive() || contexts.len() > 1,
            symbols,
            contexts,
            inheritance_chain,
            embedded_languages: grammar.embedded_languages().to_vec(),
            context_switches,
            cross_language_references: session.cross_language_references.clone(),
            sharing,
            symbol_table_sharing: sharing != SharingStrategy::Local,
            validation_required: grammar.cross_language_validation()
                || !grammar.validation_rules().is_empty(),
            validation_rules: grammar.validation_rules().to_vec(),
            complexity,
        };
        tracing::debug!(
            grammar = %result.grammar,
            symbols = result.symbols.len(),
            switches = result.complexity.total_switches,
            cyclic = result.complexity.has_cyclic_references,
            "context analysis complete"
        );
        result
    }

    /// Symbols of one language, in name order.
    pub fn symbols_of<'a>(&'a self, language: &'a str) -> impl Iterator<Item = &'a AnalyzedSymbol> {
        self.symbols.values().filter(move |s| s.language == language)
    }

    /// Every language that appears in the analysis.
    pub fn languages(&self) -> BTreeSet<&str> {
        let mut out: BTreeSet<&str> = self.contexts.iter().map(|c| c.language.as_str()).collect();
        out.extend(self.embedded_languages.iter().map(String::as_str));
        out
    }
}

fn summarize_switches(session: &EmbeddedSession) -> Vec<ContextSwitchInfo> {
    let mut out: Vec<ContextSwitchInfo> = Vec::new();
    for frame in &session.context_switches {
        let existing = out.iter_mut().find(|s| {
            s.source_language == frame.source_language
                && s.target_language == frame.target_language
                && s.trigger == frame.trigger
        });
        match existing {
            Some(info) => {
                info.occurrences += 1;
                info.max_nesting_level = info.max_nesting_level.max(frame.nesting_level);
            }
            None => out.push(ContextSwitchInfo {
                source_language: frame.source_language.clone(),
                target_language: frame.target_language.clone(),
                trigger: frame.trigger.clone(),
                end_trigger: frame.end_trigger.clone(),
                max_nesting_level: frame.nesting_level,
                occurrences: 1,
            }),
        }
    }
    out
}

/// Source language → target languages over cross-language references.
pub fn reference_graph(references: &[CrossLanguageReference]) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for r in references {
        if r.source_language != r.target_language {
            graph
                .entry(r.source_language.clone())
                .or_default()
                .insert(r.target_language.clone());
        }
    }
    graph
}

/// Depth-first search with a recursion stack. Returns the first cycle
/// found as a path whose last node equals its first.
pub fn detect_cycle(graph: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = Vec::new();
    for start in graph.keys() {
        if let Some(cycle) = visit(graph, start, &mut done, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'g>(
    graph: &'g BTreeMap<String, BTreeSet<String>>,
    node: &'g str,
    done: &mut BTreeSet<&'g str>,
    stack: &mut Vec<&'g str>,
) -> Option<Vec<String>> {
    if let Some(at) = stack.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = stack[at..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }
    stack.push(node);
    if let Some(edges) = graph.get(node) {
        for next in edges {
            if let Some(cycle) = visit(graph, next, done, stack) {
                return Some(cycle);
            }
        }
    }
    stack.pop();
    done.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> BTreeMap<String, BTreeSet<String>> {
        let mut g: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (a, b) in edges {
            g.entry(a.to_string()).or_default().insert(b.to_string());
        }
        g
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let g = graph(&[("Markup", "Script"), ("Script", "Style"), ("Markup", "Style")]);
        assert_eq!(detect_cycle(&g), None);
    }

    #[test]
    fn finds_three_node_cycle() {
        let g = graph(&[("Markup", "Script"), ("Script", "Style"), ("Style", "Markup")]);
        assert_eq!(
            detect_cycle(&g),
            Some(vec![
                "Markup".to_string(),
                "Script".to_string(),
                "Style".to_string(),
                "Markup".to_string()
            ])
        );
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let g = graph(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]);
        assert!(detect_cycle(&g).is_none());
    }

    #[test]
    fn cycle_reachable_only_from_later_key() {
        let g = graph(&[("A", "B"), ("C", "D"), ("D", "C")]);
        let cycle = detect_cycle(&g).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"C".to_string()));
    }
}
