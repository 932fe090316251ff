//! Go backend: one package with a symbol table, scope manager, validator
//! and inheritance table.

use super::{banner, kind_label, language_parents, quote, stack_capacity, visibility_label};
use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use crate::error::CodegenError;
use crate::generator::{Artifact, CodeGenerator, TargetLanguage};
use braid_core::validation::{NUMERIC_TYPES, STRING_TYPES};
use braid_core::Grammar;

#[derive(Debug, Clone, Copy, Default)]
pub struct GoGenerator;

impl GoGenerator {
    fn preamble(analysis: &ContextAnalysisResult, config: &GenerationConfig) -> String {
        format!("{}\npackage {}\n", banner("//", analysis), config.module_name)
    }
}

fn type_set(types: &[&str]) -> String {
    types
        .iter()
        .map(|t| format!("{}: true", quote(t)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CodeGenerator for GoGenerator {
    fn target(&self) -> TargetLanguage {
        TargetLanguage::Go
    }

    fn symbol_table(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let mut seeds = String::new();
        for s in analysis.symbols.values() {
            seeds.push_str(&format!(
                "\tt.Insert(Symbol{{Name: {}, Language: {}, Kind: {}, Type: {}, Visibility: {}, Scope: {}}})\n",
                quote(&s.name),
                quote(&s.language),
                quote(&kind_label(&s.kind)),
                quote(s.declared_type.as_deref().unwrap_or("unknown")),
                quote(visibility_label(s.visibility)),
                s.scope.0,
            ));
        }
        let mut parents = String::new();
        if analysis.symbol_table_sharing {
            for (child, parent) in language_parents(analysis) {
                parents.push_str(&format!("\t{}: {},\n", quote(&child), quote(&parent)));
            }
        }

        let src = format!(
            r#"{preamble}
// Symbol is one definition, keyed by language and name.
type Symbol struct {{
	Name       string
	Language   string
	Kind       string
	Type       string
	Visibility string
	Scope      int
}}

// parentLanguage lets lookups fall back to the enclosing language.
var parentLanguage = map[string]string{{
{parents}}}

type SymbolTable struct {{
	symbols map[string]Symbol
}}

func symbolKey(language, name string) string {{
	return language + "." + name
}}

// NewSymbolTable returns a table seeded with the {count} symbols of grammar {grammar}.
func NewSymbolTable() *SymbolTable {{
	t := &SymbolTable{{symbols: make(map[string]Symbol, {count})}}
{seeds}	return t
}}

// Insert adds s unless its language already defines the name.
func (t *SymbolTable) Insert(s Symbol) bool {{
	k := symbolKey(s.Language, s.Name)
	if _, exists := t.symbols[k]; exists {{
		return false
	}}
	t.symbols[k] = s
	return true
}}

// Lookup searches language, then its enclosing languages.
func (t *SymbolTable) Lookup(language, name string) (Symbol, bool) {{
	for lang, ok := language, true; ok; lang, ok = parentLanguage[lang] {{
		if s, found := t.symbols[symbolKey(lang, name)]; found {{
			return s, true
		}}
	}}
	return Symbol{{}}, false
}}

func (t *SymbolTable) Len() int {{
	return len(t.symbols)
}}
"#,
            preamble = Self::preamble(analysis, config),
            parents = parents,
            count = analysis.symbols.len(),
            grammar = analysis.grammar,
            seeds = seeds,
        );
        Ok(Artifact::new("symbol_table.go", src))
    }

    fn scope_manager(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let root_language = analysis
            .contexts
            .first()
            .map(|c| c.language.as_str())
            .unwrap_or(analysis.grammar.as_str());
        let src = format!(
            r#"{preamble}
import "errors"

const MaxScopeDepth = 256

var (
	ErrScopeDepth  = errors.New("scope depth limit exceeded")
	ErrGlobalScope = errors.New("cannot exit the global scope")
)

type Scope struct {{
	ID       int
	Parent   int
	Kind     string
	Language string
	Depth    int
}}

type ScopeManager struct {{
	stack  []Scope
	nextID int
}}

func NewScopeManager() *ScopeManager {{
	stack := make([]Scope, 0, {capacity})
	stack = append(stack, Scope{{ID: 0, Parent: -1, Kind: "global", Language: {root}, Depth: 0}})
	return &ScopeManager{{stack: stack, nextID: 1}}
}}

// Enter opens a child of the current scope, one level deeper.
func (m *ScopeManager) Enter(kind, language string) (Scope, error) {{
	top := m.Current()
	if top.Depth+1 > MaxScopeDepth {{
		return Scope{{}}, ErrScopeDepth
	}}
	s := Scope{{ID: m.nextID, Parent: top.ID, Kind: kind, Language: language, Depth: top.Depth + 1}}
	m.nextID++
	m.stack = append(m.stack, s)
	return s, nil
}}

// Exit closes the innermost scope.
func (m *ScopeManager) Exit() (Scope, error) {{
	if len(m.stack) == 1 {{
		return Scope{{}}, ErrGlobalScope
	}}
	top := m.stack[len(m.stack)-1]
	m.stack = m.stack[:len(m.stack)-1]
	return top, nil
}}

func (m *ScopeManager) Current() Scope {{
	return m.stack[len(m.stack)-1]
}}

func (m *ScopeManager) Depth() int {{
	return m.Current().Depth
}}
"#,
            preamble = Self::preamble(analysis, config),
            capacity = stack_capacity(analysis, config.enable_context_optimization).max(1),
            root = quote(root_language),
        );
        Ok(Artifact::new("scope_manager.go", src))
    }

    fn validator(
        &self,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let mut rules = String::new();
        for r in &analysis.validation_rules {
            rules.push_str(&format!(
                "\t{{Name: {}, Source: {}, Target: {}, Severity: {}}},\n",
                quote(&r.name),
                quote(&r.source_pattern),
                quote(&r.target_pattern),
                quote(&r.severity.to_string()),
            ));
        }
        let src = format!(
            r#"{preamble}
import "fmt"

type Rule struct {{
	Name     string
	Source   string
	Target   string
	Severity string
}}

var Rules = []Rule{{
{rules}}}

type Reference struct {{
	SourceLanguage string
	TargetLanguage string
	Symbol         string
	Type           string
}}

var numericTypes = map[string]bool{{{numeric}}}
var stringTypes = map[string]bool{{{strings}}}

// TypesCompatible treats equal types, "unknown", and members of one
// numeric or string family as compatible.
func TypesCompatible(a, b string) bool {{
	if a == b || a == "unknown" || b == "unknown" || a == "" || b == "" {{
		return true
	}}
	return (numericTypes[a] && numericTypes[b]) || (stringTypes[a] && stringTypes[b])
}}

// Validate checks ref against t and returns one message per problem.
func (t *SymbolTable) Validate(ref Reference) []string {{
	target, ok := t.Lookup(ref.TargetLanguage, ref.Symbol)
	if !ok {{
		return []string{{fmt.Sprintf("unresolved reference %s.%s", ref.TargetLanguage, ref.Symbol)}}
	}}
	var issues []string
	if !TypesCompatible(ref.Type, target.Type) {{
		issues = append(issues, fmt.Sprintf("%s is %s in %s but %s in %s", ref.Symbol, ref.Type, ref.SourceLanguage, target.Type, target.Language))
	}}
	if target.Visibility == "private" && target.Language != ref.SourceLanguage {{
		issues = append(issues, fmt.Sprintf("%s is private to %s", ref.Symbol, target.Language))
	}}
	return issues
}}
"#,
            preamble = Self::preamble(analysis, config),
            rules = rules,
            numeric = type_set(NUMERIC_TYPES),
            strings = type_set(STRING_TYPES),
        );
        Ok(Artifact::new("context_validator.go", src))
    }

    fn inheritance_optimization(
        &self,
        grammar: &dyn Grammar,
        analysis: &ContextAnalysisResult,
        config: &GenerationConfig,
    ) -> Result<Option<Artifact>, CodegenError> {
        if grammar.base_grammars().is_empty() {
            return Ok(None);
        }
        let chain: Vec<String> = analysis.inheritance_chain.iter().map(|g| quote(g)).collect();
        let src = format!(
            r#"{preamble}
// InheritanceChain is the grammar followed by its resolved bases, nearest first.
var InheritanceChain = []string{{{chain}}}

func Inherits(grammar string) bool {{
	for _, g := range InheritanceChain[1:] {{
		if g == grammar {{
			return true
		}}
	}}
	return false
}}
"#,
            preamble = Self::preamble(analysis, config),
            chain = chain.join(", "),
        );
        Ok(Some(Artifact::new("inheritance.go", src)))
    }
}
