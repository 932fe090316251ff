//! Target backends and the text helpers they share.

pub mod go;
pub mod rust;
pub mod typescript;
pub mod wasm;

pub use go::GoGenerator;
pub use rust::RustGenerator;
pub use typescript::TypeScriptGenerator;
pub use wasm::WasmGenerator;

use crate::analysis::ContextAnalysisResult;
use braid_core::{SymbolKind, Visibility, BRAID_VERSION};
use std::collections::BTreeMap;

/// First line of every emitted file, behind the target's comment marker.
pub(crate) fn banner(comment: &str, analysis: &ContextAnalysisResult) -> String {
    format!(
        "{c} Code generated by braid {v} from grammar {g}. DO NOT EDIT.\n",
        c = comment,
        v = BRAID_VERSION,
        g = analysis.grammar,
    )
}

/// Double-quoted string literal valid in Go, Rust and TypeScript.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(crate) fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

pub(crate) fn kind_label(kind: &SymbolKind) -> String {
    kind.to_string()
}

pub(crate) fn visibility_label(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
        Visibility::Protected => "protected",
        Visibility::Internal => "internal",
        Visibility::Local => "local",
    }
}

/// Embedded language → the language it was switched into from. Used by
/// generated lookups that fall back to enclosing languages.
pub(crate) fn language_parents(analysis: &ContextAnalysisResult) -> BTreeMap<String, String> {
    let mut parents = BTreeMap::new();
    for ctx in &analysis.contexts {
        let Some(parent) = ctx.parent.and_then(|p| analysis.contexts.get(p.0)) else {
            continue;
        };
        if parent.language != ctx.language {
            parents
                .entry(ctx.language.clone())
                .or_insert_with(|| parent.language.clone());
        }
    }
    parents
}

/// Initial capacity for generated scope stacks.
pub(crate) fn stack_capacity(analysis: &ContextAnalysisResult, optimize: bool) -> usize {
    if optimize {
        analysis.complexity.max_nesting_depth + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(quote("x\u{1}y"), "\"xy\"");
    }

    #[test]
    fn pascal_case_splits_on_non_alphanumerics() {
        assert_eq!(pascal_case("braid_context"), "BraidContext");
        assert_eq!(pascal_case("page-markup v2"), "PageMarkupV2");
    }
}
