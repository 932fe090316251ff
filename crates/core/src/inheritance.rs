//! Base-grammar inheritance.
//!
//! Walks `Inherits:` names through the registry, nearest base first, and
//! collects the rules and symbols a derived grammar picks up. Precedence
//! between inherited and derived items is applied by the caller through
//! [`ParseContext::merge_rule`](crate::context::ParseContext::merge_rule).

use crate::context::ContextRule;
use crate::error::{codes, Diagnostic, Severity};
use crate::grammar::{Grammar, GrammarRegistry, SymbolDecl};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct Inherited {
    /// Rules marked `inherited = true`, tagged with their declaring grammar.
    pub rules: Vec<ContextRule>,
    /// Symbols from base grammars, nearest base first.
    pub symbols: Vec<(String, SymbolDecl)>,
    /// Resolved base grammar names in walk order.
    pub chain: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Collect everything `grammar` inherits. Unresolvable bases are reported
/// as `INHERITANCE_UNRESOLVED`, at error severity when `strict`.
pub fn resolve_inheritance(
    grammar: &dyn Grammar,
    registry: &GrammarRegistry,
    strict: bool,
) -> Inherited {
    let mut out = Inherited::default();
    let mut visited = BTreeSet::new();
    visited.insert(grammar.name().to_string());
    walk(grammar, registry, strict, &mut visited, &mut out);
    out
}

fn walk(
    grammar: &dyn Grammar,
    registry: &GrammarRegistry,
    strict: bool,
    visited: &mut BTreeSet<String>,
    out: &mut Inherited,
) {
    for base_name in grammar.base_grammars() {
        if !visited.insert(base_name.clone()) {
            if out.chain.iter().all(|c| c != base_name) {
                out.diagnostics.push(Diagnostic::warning(
                    codes::INHERITANCE_CYCLE,
                    0,
                    format!(
                        "grammar '{}' inherits '{}' which is already in its inheritance chain",
                        grammar.name(),
                        base_name
                    ),
                ));
            }
            continue;
        }

        let Some(base) = registry.get(base_name) else {
            let severity = if strict {
                Severity::Error
            } else {
                Severity::Warning
            };
            tracing::warn!(grammar = grammar.name(), base = %base_name, "base grammar not found");
            out.diagnostics.push(
                Diagnostic::new(
                    codes::INHERITANCE_UNRESOLVED,
                    severity,
                    0,
                    format!(
                        "base grammar '{}' of '{}' is not registered; its rules and symbols are skipped",
                        base_name,
                        grammar.name()
                    ),
                )
                .with_suggestion(format!("load '{}' into the registry first", base_name)),
            );
            continue;
        };

        out.chain.push(base.name().to_string());
        for rule in base.context_rules() {
            let mut rule = rule.clone();
            rule.inherited = true;
            if rule.origin.is_empty() {
                rule.origin = base.name().to_string();
            }
            out.rules.push(rule);
        }
        for symbol in base.symbol_declarations() {
            out.symbols
                .push((base.name().to_string(), symbol.clone()));
        }
        walk(base, registry, strict, visited, out);
    }
}
