//! Rust backend: a module tree with a symbol table, scope manager,
//! validator and inheritance table. The WASM backend reuses these sources.

use super::{banner, kind_label, language_parents, quote, stack_capacity, visibility_label};
use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use crate::error::CodegenError;
use crate::generator::{Artifact, CodeGenerator, TargetLanguage};
use braid_core::validation::{NUMERIC_TYPES, STRING_TYPES};
use braid_core::Grammar;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct RustGenerator;

fn str_slice(items: &[&str]) -> String {
    items.iter().map(|t| quote(t)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn symbol_table_source(analysis: &ContextAnalysisResult) -> String {
    let mut seeds = String::new();
    for s in analysis.symbols.values() {
        seeds.push_str(&format!(
            "        table.insert(Symbol {{ name: {}, language: {}, kind: {}, ty: {}, visibility: {}, scope: {} }});\n",
            quote(&s.name),
            quote(&s.language),
            quote(&kind_label(&s.kind)),
            quote(s.declared_type.as_deref().unwrap_or("unknown")),
            quote(visibility_label(s.visibility)),
            s.scope.0,
        ));
    }
    let parents: Vec<String> = if analysis.symbol_table_sharing {
        language_parents(analysis)
            .iter()
            .map(|(child, parent)| format!("({}, {})", quote(child), quote(parent)))
            .collect()
    } else {
        Vec::new()
    };

    format!(
        r#"{banner}
use std::collections::HashMap;

/// One definition, keyed by language and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {{
    pub name: &'static str,
    pub language: &'static str,
    pub kind: &'static str,
    pub ty: &'static str,
    pub visibility: &'static str,
    pub scope: usize,
}}

/// Embedded language and the language lookups fall back to.
pub const PARENT_LANGUAGES: &[(&str, &str)] = &[{parents}];

#[derive(Debug, Default)]
pub struct SymbolTable {{
    symbols: HashMap<(&'static str, &'static str), Symbol>,
}}

impl SymbolTable {{
    /// The {count} symbols of grammar {grammar}.
    pub fn seeded() -> Self {{
        let mut table = SymbolTable {{
            symbols: HashMap::with_capacity({count}),
        }};
{seeds}        table
    }}

    /// Returns false when the language already defines the name.
    pub fn insert(&mut self, symbol: Symbol) -> bool {{
        let key = (symbol.language, symbol.name);
        if self.symbols.contains_key(&key) {{
            return false;
        }}
        self.symbols.insert(key, symbol);
        true
    }}

    /// Searches `language`, then its enclosing languages.
    pub fn lookup(&self, language: &str, name: &str) -> Option<&Symbol> {{
        let mut current = Some(language);
        while let Some(lang) = current {{
            if let Some(found) = self.symbols.values().find(|s| s.language == lang && s.name == name) {{
                return Some(found);
            }}
            current = PARENT_LANGUAGES
                .iter()
                .find(|(child, _)| *child == lang)
                .map(|(_, parent)| *parent);
        }}
        None
    }}

    pub fn len(&self) -> usize {{
        self.symbols.len()
    }}

    pub fn is_empty(&self) -> bool {{
        self.symbols.is_empty()
    }}
}}
"#,
        banner = banner("//", analysis),
        parents = parents.join(", "),
        count = analysis.symbols.len(),
        grammar = analysis.grammar,
        seeds = seeds,
    )
}

pub(crate) fn scope_manager_source(analysis: &ContextAnalysisResult, optimize: bool) -> String {
    let root = analysis
        .contexts
        .first()
        .map(|c| c.language.as_str())
        .unwrap_or(analysis.grammar.as_str());
    format!(
        r#"{banner}
pub const MAX_SCOPE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {{
    pub id: usize,
    pub parent: Option<usize>,
    pub kind: String,
    pub language: String,
    pub depth: usize,
}}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {{
    DepthExceeded,
    GlobalScope,
}}

#[derive(Debug)]
pub struct ScopeManager {{
    stack: Vec<Scope>,
    next_id: usize,
}}

impl Default for ScopeManager {{
    fn default() -> Self {{
        let mut stack = Vec::with_capacity({capacity});
        stack.push(Scope {{
            id: 0,
            parent: None,
            kind: "global".to_string(),
            language: {root}.to_string(),
            depth: 0,
        }});
        ScopeManager {{ stack, next_id: 1 }}
    }}
}}

impl ScopeManager {{
    /// Open a child of the current scope, one level deeper.
    pub fn enter(&mut self, kind: &str, language: &str) -> Result<&Scope, ScopeError> {{
        let (parent, depth) = {{
            let top = self.current();
            (top.id, top.depth + 1)
        }};
        if depth > MAX_SCOPE_DEPTH {{
            return Err(ScopeError::DepthExceeded);
        }}
        self.stack.push(Scope {{
            id: self.next_id,
            parent: Some(parent),
            kind: kind.to_string(),
            language: language.to_string(),
            depth,
        }});
        self.next_id += 1;
        Ok(self.current())
    }}

    /// Close the innermost scope.
    pub fn exit(&mut self) -> Result<Scope, ScopeError> {{
        if self.stack.len() == 1 {{
            return Err(ScopeError::GlobalScope);
        }}
        self.stack.pop().ok_or(ScopeError::GlobalScope)
    }}

    pub fn current(&self) -> &Scope {{
        &self.stack[self.stack.len() - 1]
    }}

    pub fn depth(&self) -> usize {{
        self.current().depth
    }}
}}
"#,
        banner = banner("//", analysis),
        capacity = stack_capacity(analysis, optimize).max(1),
        root = quote(root),
    )
}

pub(crate) fn validator_source(analysis: &ContextAnalysisResult) -> String {
    let mut rules = String::new();
    for r in &analysis.validation_rules {
        rules.push_str(&format!(
            "    Rule {{ name: {}, source: {}, target: {}, severity: {} }},\n",
            quote(&r.name),
            quote(&r.source_pattern),
            quote(&r.target_pattern),
            quote(&r.severity.to_string()),
        ));
    }
    format!(
        r#"{banner}
use super::symbol_table::SymbolTable;

#[derive(Debug, Clone, Copy)]
pub struct Rule {{
    pub name: &'static str,
    pub source: &'static str,
    pub target: &'static str,
    pub severity: &'static str,
}}

pub const RULES: &[Rule] = &[
{rules}];

const NUMERIC_TYPES: &[&str] = &[{numeric}];
const STRING_TYPES: &[&str] = &[{strings}];

pub struct Reference<'a> {{
    pub source_language: &'a str,
    pub target_language: &'a str,
    pub symbol: &'a str,
    pub ty: &'a str,
}}

/// Equal types, "unknown", and one numeric or string family are compatible.
pub fn types_compatible(a: &str, b: &str) -> bool {{
    if a == b || a == "unknown" || b == "unknown" || a.is_empty() || b.is_empty() {{
        return true;
    }}
    (NUMERIC_TYPES.contains(&a) && NUMERIC_TYPES.contains(&b))
        || (STRING_TYPES.contains(&a) && STRING_TYPES.contains(&b))
}}

/// One message per problem with `reference`.
pub fn validate(table: &SymbolTable, reference: &Reference<'_>) -> Vec<String> {{
    let Some(target) = table.lookup(reference.target_language, reference.symbol) else {{
        return vec![format!(
            "unresolved reference {{}}.{{}}",
            reference.target_language, reference.symbol
        )];
    }};
    let mut issues = Vec::new();
    if !types_compatible(reference.ty, target.ty) {{
        issues.push(format!(
            "{{}} is {{}} in {{}} but {{}} in {{}}",
            reference.symbol, reference.ty, reference.source_language, target.ty, target.language
        ));
    }}
    if target.visibility == "private" && target.language != reference.source_language {{
        issues.push(format!("{{}} is private to {{}}", reference.symbol, target.language));
    }}
    issues
}}
"#,
        banner = banner("//", analysis),
        rules = rules,
        numeric = str_slice(NUMERIC_TYPES),
        strings = str_slice(STRING_TYPES),
    )
}

pub(crate) fn inheritance_source(analysis: &ContextAnalysisResult) -> String {
    let chain: Vec<String> = analysis.inheritance_chain.iter().map(|g| quote(g)).collect();
    format!(
        r#"{banner}
/// The grammar followed by its resolved bases, nearest first.
pub const INHERITANCE_CHAIN: &[&str] = &[{chain}];

pub fn inherits(grammar: &str) -> bool {{
    INHERITANCE_CHAIN[1..].contains(&grammar)
}}
"#,
        banner = banner("//", analysis),
        chain = chain.join(", "),
    )
}

impl CodeGenerator for RustGenerator {
    fn target(&self) -> TargetLanguage {
        TargetLanguage::Rust
    }

    fn symbol_table(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        Ok(Artifact::new("symbol_table.rs", symbol_table_source(analysis)))
    }

    fn scope_manager(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        Ok(Artifact::new(
            "scope_manager.rs",
            scope_manager_source(analysis, config.enable_context_optimization),
        ))
    }

    fn validator(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        if !config.generate_symbol_table {
            return Err(CodegenError::Generation {
                target: TargetLanguage::Rust,
                message: "the validator module needs the symbol table module".to_string(),
            });
        }
        Ok(Artifact::new("context_validator.rs", validator_source(analysis)))
    }

    fn inheritance_optimization(
        &self,
        grammar: &dyn Grammar,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Option<Artifact>, CodegenError> {
        if grammar.base_grammars().is_empty() {
            return Ok(None);
        }
        Ok(Some(Artifact::new("inheritance.rs", inheritance_source(analysis))))
    }

    fn headers(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
        files: &BTreeMap<String, String>,
    ) -> Vec<Artifact> {
        let modules: Vec<&str> = files.keys().filter_map(|f| f.strip_suffix(".rs")).collect();
        if modules.is_empty() {
            return Vec::new();
        }
        vec![Artifact::new("mod.rs", module_index(analysis, &modules))]
    }
}

/// `mod` declarations for the files emitted so far.
pub(crate) fn module_index(analysis: &ContextAnalysisResult, modules: &[&str]) -> String {
    let mut out = banner("//", analysis);
    out.push('\n');
    for m in modules {
        out.push_str(&format!("pub mod {};\n", m));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContextComplexity, ContextSummary};
    use braid_core::{ContextId, ScopeKind, SharingStrategy};

    fn analysis() -> ContextAnalysisResult {
        ContextAnalysisResult {
            grammar: "Primary".into(),
            requires_context_tracking: true,
            symbols: BTreeMap::new(),
            contexts: vec![ContextSummary {
                id: ContextId(0),
                parent: None,
                language: "Primary".into(),
                scope: ScopeKind::Global,
                depth: 0,
                symbol_count: 0,
            }],
            inheritance_chain: vec!["Primary".into(), "Base".into()],
            embedded_languages: vec!["Expr".into()],
            context_switches: Vec::new(),
            cross_language_references: Vec::new(),
            sharing: SharingStrategy::Hierarchical,
            symbol_table_sharing: true,
            validation_required: true,
            validation_rules: Vec::new(),
            complexity: ContextComplexity::default(),
        }
    }

    #[test]
    fn generated_sources_carry_banner_and_chain() {
        let a = analysis();
        let inheritance = inheritance_source(&a);
        assert!(inheritance.starts_with("// Code generated by braid"));
        assert!(inheritance.contains(r#"&["Primary", "Base"]"#));
        let index = module_index(&a, &["symbol_table", "inheritance"]);
        assert!(index.contains("pub mod inheritance;"));
    }

    #[test]
    fn validator_without_symbol_table_fails() {
        let config = GenerationConfig {
            generate_symbol_table: false,
            ..GenerationConfig::default()
        };
        let err = RustGenerator.validator(&analysis(), &config).unwrap_err();
        assert!(matches!(err, CodegenError::Generation { .. }));
    }
}
