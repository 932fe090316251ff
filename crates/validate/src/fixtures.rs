//! Context and reference builders shared by the unit tests.

use braid_core::{
    ContextId, CrossLanguageReference, EmbeddedLanguageContext, ParseContext, Position,
    ReferenceId, ReferenceOrigin, ScopeKind, SymbolInfo, SymbolKind,
};
use std::collections::BTreeMap;

pub(crate) fn context(id: usize, language: &str, symbols: &[(&str, SymbolKind)]) -> EmbeddedLanguageContext {
    let root = ParseContext::root(ScopeKind::Global);
    let mut ctx = if id == 0 {
        root
    } else {
        ParseContext::child_of(&root, ContextId(id), ScopeKind::Expression)
    };
    for (name, kind) in symbols {
        ctx.symbols.insert(
            name.to_string(),
            SymbolInfo::new(name, kind.clone(), ContextId(id), Position::default()),
        );
    }
    EmbeddedLanguageContext {
        context: ctx,
        language: language.into(),
        parent_language: None,
        embedded_grammars: BTreeMap::new(),
        switch_stack: Vec::new(),
        symbol_level: None,
        references: Vec::new(),
        validation_queue: Vec::new(),
    }
}

pub(crate) fn reference(target_language: &str, symbol: &str) -> CrossLanguageReference {
    CrossLanguageReference {
        id: ReferenceId(0),
        source_language: "Other".into(),
        target_language: target_language.into(),
        source_symbol: symbol.into(),
        target_symbol: symbol.into(),
        declared_type: None,
        position: Position::new(3, 7, 20, symbol.len()),
        resolved: false,
        resolved_context: None,
        validation: None,
        origin: ReferenceOrigin::Token,
    }
}
