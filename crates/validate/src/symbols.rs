//! Symbol pass: redefinitions and unused symbols.

use crate::issues::{SymbolIssue, SymbolIssueKind, SymbolValidationResult};
use braid_core::{CrossLanguageReference, EmbeddedLanguageContext, Severity, SymbolKind};
use std::collections::{BTreeSet, HashMap};

/// First definition seen for `(language, name)` in this call.
pub(crate) type SymbolCache = HashMap<(String, String), SymbolValidationResult>;

/// Check every symbol of every context once, in context order.
///
/// A second or later definition of a name in the same language is
/// `Redefined` (parameters excepted, they belong to their function). The
/// first definition of a name no reference targets is `UnusedSymbol`.
pub(crate) fn validate_symbols(
    contexts: &[EmbeddedLanguageContext],
    references: &[CrossLanguageReference],
    cache: &mut SymbolCache,
    cache_hits: &mut u64,
) -> Vec<SymbolValidationResult> {
    let targeted: BTreeSet<(&str, &str)> = references
        .iter()
        .map(|r| (r.target_language.as_str(), r.target_symbol.as_str()))
        .collect();

    let mut results = Vec::new();
    for ctx in contexts {
        for symbol in ctx.symbols.values() {
            let key = (ctx.language.clone(), symbol.name.clone());
            let mut issues = Vec::new();

            if let Some(first) = cache.get(&key) {
                *cache_hits += 1;
                if symbol.kind != SymbolKind::Parameter && first.kind != SymbolKind::Parameter {
                    issues.push(
                        SymbolIssue::new(
                            SymbolIssueKind::Redefined,
                            Severity::Error,
                            format!(
                                "'{}' is already defined in {} ({})",
                                symbol.name, first.context, ctx.language
                            ),
                        )
                        .with_suggestion(format!("rename one of the '{}' definitions", symbol.name))
                        .at(symbol.defined_at),
                    );
                }
            } else if !targeted.contains(&(ctx.language.as_str(), symbol.name.as_str())) {
                issues.push(
                    SymbolIssue::new(
                        SymbolIssueKind::UnusedSymbol,
                        Severity::Warning,
                        format!(
                            "'{}' ({}) is never referenced from another language",
                            symbol.name, ctx.language
                        ),
                    )
                    .at(symbol.defined_at),
                );
            }

            let result = SymbolValidationResult {
                language: ctx.language.clone(),
                symbol: symbol.name.clone(),
                kind: symbol.kind.clone(),
                context: ctx.id,
                valid: issues.iter().all(|i| i.severity != Severity::Error),
                issues,
            };
            tracing::debug!(symbol = %result.symbol, language = %result.language, valid = result.valid, "symbol checked");
            cache.entry(key).or_insert_with(|| result.clone());
            results.push(result);
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, reference};

    #[test]
    fn second_definition_is_redefined() {
        let contexts = [
            context(0, "Script", &[("foo", SymbolKind::Variable)]),
            context(1, "Script", &[("foo", SymbolKind::Variable)]),
        ];
        let mut cache = SymbolCache::new();
        let mut hits = 0;
        let results = validate_symbols(&contexts, &[reference("Script", "foo")], &mut cache, &mut hits);
        assert_eq!(results.len(), 2);
        assert!(results[0].valid);
        assert_eq!(results[1].issues[0].kind, SymbolIssueKind::Redefined);
        assert_eq!(results[1].issues[0].severity, Severity::Error);
        assert_eq!(hits, 1);
    }

    #[test]
    fn same_name_in_other_language_is_fine() {
        let contexts = [
            context(0, "Markup", &[("id", SymbolKind::Variable)]),
            context(1, "Script", &[("id", SymbolKind::Variable)]),
        ];
        let refs = [reference("Markup", "id"), reference("Script", "id")];
        let results = validate_symbols(&contexts, &refs, &mut SymbolCache::new(), &mut 0);
        assert!(results.iter().all(|r| r.issues.is_empty()));
    }

    #[test]
    fn parameters_may_repeat() {
        let contexts = [
            context(0, "Script", &[("a", SymbolKind::Parameter)]),
            context(1, "Script", &[("a", SymbolKind::Parameter)]),
        ];
        let results = validate_symbols(&contexts, &[reference("Script", "a")], &mut SymbolCache::new(), &mut 0);
        assert!(results.iter().all(|r| r.valid && r.issues.is_empty()));
    }

    #[test]
    fn unreferenced_symbol_warned_once() {
        let contexts = [
            context(0, "Script", &[("lonely", SymbolKind::Function)]),
            context(1, "Script", &[("lonely", SymbolKind::Function)]),
        ];
        let results = validate_symbols(&contexts, &[], &mut SymbolCache::new(), &mut 0);
        let unused = results
            .iter()
            .flat_map(|r| &r.issues)
            .filter(|i| i.kind == SymbolIssueKind::UnusedSymbol)
            .count();
        assert_eq!(unused, 1);
    }
}
