//! Grammar model consumed by the context engine.
//!
//! The engine only sees grammars through the [`Grammar`] trait. The one
//! implementation is [`GrammarSpec`], produced by the directive loader in
//! [`loader`] and stored in a [`registry::GrammarRegistry`].

pub mod loader;
pub mod registry;

use crate::context::{ContextRule, ScopeKind, SymbolKind, Visibility};
use crate::symbol_table::SharingStrategy;
use crate::tokenizer::TokenSplitter;
use crate::validation::ValidationRule;
use serde::{Deserialize, Serialize};

pub use loader::{parse_grammar, GrammarLoad, LoadOptions};
pub use registry::GrammarRegistry;

/// Default trigger opening an embedded-language region.
pub fn default_switch_trigger(language: &str) -> String {
    format!("@CONTEXT[{}]", language)
}

/// Default trigger closing an embedded-language region.
pub const DEFAULT_END_TRIGGER: &str = "@ENDCONTEXT";

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::GrammarSpec {}
}

/// Read-only accessor surface of a grammar.
pub trait Grammar: sealed::Sealed {
    fn name(&self) -> &str;
    fn productions(&self) -> &[Production];
    fn base_grammars(&self) -> &[String];
    fn embedded_languages(&self) -> &[String];
    fn imports(&self) -> &[ImportDecl];
    fn validation_rules(&self) -> &[ValidationRule];
    fn context_rules(&self) -> &[ContextRule];
    fn symbol_declarations(&self) -> &[SymbolDecl];
    fn reference_declarations(&self) -> &[ReferenceDecl];
    fn sharing(&self) -> SharingStrategy;
    fn token_splitter(&self) -> TokenSplitter;
    fn token_pattern(&self) -> Option<&str>;
    fn cross_language_validation(&self) -> bool;
    fn context_sensitive(&self) -> bool;
    /// Declared switch patterns followed by one default
    /// `@CONTEXT[lang]` / `@ENDCONTEXT` pattern per embedded language.
    fn switch_patterns(&self) -> Vec<SwitchPattern>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub name: String,
    pub definition: String,
    /// Languages embedded via `@CONTEXT[lang] ... @ENDCONTEXT` markers.
    pub embedded: Vec<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub language: String,
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositionStrategy {
    #[default]
    Merge,
    Override,
    Extend,
}

impl CompositionStrategy {
    pub fn parse(s: &str) -> Option<CompositionStrategy> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Some(CompositionStrategy::Merge),
            "override" => Some(CompositionStrategy::Override),
            "extend" => Some(CompositionStrategy::Extend),
            _ => None,
        }
    }
}

/// Header value of `SymbolTableSharing`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolTableSharing {
    None,
    Flat,
    #[default]
    Hierarchical,
    Scoped,
}

impl SymbolTableSharing {
    pub fn parse(s: &str) -> Option<SymbolTableSharing> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(SymbolTableSharing::None),
            "flat" => Some(SymbolTableSharing::Flat),
            "hierarchical" => Some(SymbolTableSharing::Hierarchical),
            "scoped" => Some(SymbolTableSharing::Scoped),
            _ => None,
        }
    }

    pub fn strategy(self) -> SharingStrategy {
        match self {
            SymbolTableSharing::None | SymbolTableSharing::Scoped => SharingStrategy::Local,
            SymbolTableSharing::Flat => SharingStrategy::Global,
            SymbolTableSharing::Hierarchical => SharingStrategy::Hierarchical,
        }
    }
}

/// `@CONTEXT(language=.., scope=..)` or `@CONTEXT[X] { .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDecl {
    pub language: String,
    pub scope: Option<ScopeKind>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDecl {
    pub name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    /// Declared value type, from `@SYMBOL(.., valueType="int")`.
    pub value_type: Option<String>,
    /// Enclosing `@CONTEXT[X]` block, if any.
    pub language: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDecl {
    pub target_language: String,
    pub target_symbol: String,
    pub resolution: Option<String>,
    pub declared_type: Option<String>,
    pub source_language: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPattern {
    pub language: String,
    pub trigger: String,
    pub end_trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarSpec {
    pub name: String,
    pub token_splitter: TokenSplitter,
    pub token_pattern: Option<String>,
    pub embedded_languages: Vec<String>,
    pub context_sensitive: bool,
    /// This grammar is itself meant to be embedded.
    pub embedded_language: bool,
    pub parent_context: Option<String>,
    pub symbol_table_sharing: SymbolTableSharing,
    pub cross_language_validation: bool,
    pub base_grammars: Vec<String>,
    pub imports: Vec<ImportDecl>,
    pub composition: CompositionStrategy,
    pub contexts: Vec<ContextDecl>,
    pub symbols: Vec<SymbolDecl>,
    pub references: Vec<ReferenceDecl>,
    pub validation_rules: Vec<ValidationRule>,
    pub context_rules: Vec<ContextRule>,
    pub switch_patterns: Vec<SwitchPattern>,
    pub productions: Vec<Production>,
}

impl GrammarSpec {
    pub fn new(name: &str) -> Self {
        GrammarSpec {
            name: name.to_owned(),
            token_splitter: TokenSplitter::Space,
            token_pattern: None,
            embedded_languages: Vec::new(),
            context_sensitive: true,
            embedded_language: false,
            parent_context: None,
            symbol_table_sharing: SymbolTableSharing::default(),
            cross_language_validation: true,
            base_grammars: Vec::new(),
            imports: Vec::new(),
            composition: CompositionStrategy::default(),
            contexts: Vec::new(),
            symbols: Vec::new(),
            references: Vec::new(),
            validation_rules: Vec::new(),
            context_rules: Vec::new(),
            switch_patterns: Vec::new(),
            productions: Vec::new(),
        }
    }

    pub fn with_embedded(mut self, languages: &[&str]) -> Self {
        self.embedded_languages = languages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_bases(mut self, bases: &[&str]) -> Self {
        self.base_grammars = bases.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a rule declared directly on this grammar.
    pub fn with_rule(mut self, mut rule: ContextRule) -> Self {
        rule.inherited = false;
        rule.origin = self.name.clone();
        self.context_rules.push(rule);
        self
    }

    pub fn with_symbol(mut self, name: &str, kind: SymbolKind) -> Self {
        self.symbols.push(SymbolDecl {
            name: name.to_owned(),
            kind,
            visibility: Visibility::Public,
            value_type: None,
            language: None,
            line: 0,
        });
        self
    }

    pub fn with_validation_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    pub fn add_embedded_language(&mut self, language: &str) {
        if !self.embedded_languages.iter().any(|l| l == language) {
            self.embedded_languages.push(language.to_owned());
        }
    }

    pub fn add_base_grammar(&mut self, base: &str) {
        if !self.base_grammars.iter().any(|b| b == base) {
            self.base_grammars.push(base.to_owned());
        }
    }
}

impl Grammar for GrammarSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn productions(&self) -> &[Production] {
        &self.productions
    }

    fn base_grammars(&self) -> &[String] {
        &self.base_grammars
    }

    fn embedded_languages(&self) -> &[String] {
        &self.embedded_languages
    }

    fn imports(&self) -> &[ImportDecl] {
        &self.imports
    }

    fn validation_rules(&self) -> &[ValidationRule] {
        &self.validation_rules
    }

    fn context_rules(&self) -> &[ContextRule] {
        &self.context_rules
    }

    fn symbol_declarations(&self) -> &[SymbolDecl] {
        &self.symbols
    }

    fn reference_declarations(&self) -> &[ReferenceDecl] {
        &self.references
    }

    fn sharing(&self) -> SharingStrategy {
        self.symbol_table_sharing.strategy()
    }

    fn token_splitter(&self) -> TokenSplitter {
        self.token_splitter
    }

    fn token_pattern(&self) -> Option<&str> {
        self.token_pattern.as_deref()
    }

    fn cross_language_validation(&self) -> bool {
        self.cross_language_validation
    }

    fn context_sensitive(&self) -> bool {
        self.context_sensitive
    }

    fn switch_patterns(&self) -> Vec<SwitchPattern> {
        let mut patterns = self.switch_patterns.clone();
        for language in &self.embedded_languages {
            let trigger = default_switch_trigger(language);
            if !patterns.iter().any(|p| p.trigger == trigger) {
                patterns.push(SwitchPattern {
                    language: language.clone(),
                    trigger,
                    end_trigger: DEFAULT_END_TRIGGER.to_string(),
                });
            }
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patterns_follow_declared_ones() {
        let mut g = GrammarSpec::new("Markup").with_embedded(&["Script", "Style"]);
        g.switch_patterns.push(SwitchPattern {
            language: "Style".into(),
            trigger: "<style>".into(),
            end_trigger: "</style>".into(),
        });
        let patterns = g.switch_patterns();
        assert_eq!(patterns.len(), 3);
        assert_eq!(patterns[0].trigger, "<style>");
        assert_eq!(patterns[1].trigger, "@CONTEXT[Script]");
        assert_eq!(patterns[2].end_trigger, DEFAULT_END_TRIGGER);
    }

    #[test]
    fn sharing_header_maps_to_strategy() {
        assert_eq!(SymbolTableSharing::Flat.strategy(), SharingStrategy::Global);
        assert_eq!(SymbolTableSharing::Scoped.strategy(), SharingStrategy::Local);
        assert_eq!(
            SymbolTableSharing::Hierarchical.strategy(),
            SharingStrategy::Hierarchical
        );
        assert_eq!(SymbolTableSharing::parse("tree"), None);
    }
}
