//! TypeScript backend: ES modules plus `.d.ts` declarations.

use super::{banner, kind_label, language_parents, quote, visibility_label};
use crate::analysis::ContextAnalysisResult;
use crate::config::GenerationConfig;
use crate::error::CodegenError;
use crate::generator::{Artifact, CodeGenerator, TargetLanguage};
use braid_core::validation::{NUMERIC_TYPES, STRING_TYPES};
use braid_core::Grammar;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeScriptGenerator;

fn string_array(items: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let quoted: Vec<String> = items.into_iter().map(|s| quote(s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

const SYMBOL_TABLE_DTS: &str = r#"export interface SymbolEntry {
  readonly name: string;
  readonly language: string;
  readonly kind: string;
  readonly type: string;
  readonly visibility: string;
  readonly scope: number;
}
export declare const PARENT_LANGUAGES: Readonly<Record<string, string>>;
export declare class SymbolTable {
  static seeded(): SymbolTable;
  insert(symbol: SymbolEntry): boolean;
  lookup(language: string, name: string): SymbolEntry | undefined;
  get size(): number;
}
"#;

const SCOPE_MANAGER_DTS: &str = r#"export declare const MAX_SCOPE_DEPTH: number;
export interface Scope {
  readonly id: number;
  readonly parent: number | null;
  readonly kind: string;
  readonly language: string;
  readonly depth: number;
}
export declare class ScopeManager {
  enter(kind: string, language: string): Scope;
  exit(): Scope;
  get current(): Scope;
  get depth(): number;
}
"#;

const VALIDATOR_DTS: &str = r#"import { SymbolTable } from './symbolTable';
export interface Rule {
  readonly name: string;
  readonly source: string;
  readonly target: string;
  readonly severity: 'error' | 'warning' | 'info';
}
export interface Reference {
  readonly sourceLanguage: string;
  readonly targetLanguage: string;
  readonly symbol: string;
  readonly type: string;
}
export declare const RULES: readonly Rule[];
export declare function typesCompatible(a: string, b: string): boolean;
export declare function validate(table: SymbolTable, ref: Reference): string[];
"#;

const INHERITANCE_DTS: &str = r#"export declare const INHERITANCE_CHAIN: readonly string[];
export declare function inherits(grammar: string): boolean;
"#;

impl CodeGenerator for TypeScriptGenerator {
    fn target(&self) -> TargetLanguage {
        TargetLanguage::TypeScript
    }

    fn symbol_table(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let mut seeds = String::new();
        for s in analysis.symbols.values() {
            seeds.push_str(&format!(
                "    table.insert({{ name: {}, language: {}, kind: {}, type: {}, visibility: {}, scope: {} }});\n",
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
                parents.push_str(&format!("  {}: {},\n", quote(&child), quote(&parent)));
            }
        }
        let src = format!(
            r#"{banner}
export interface SymbolEntry {{
  readonly name: string;
  readonly language: string;
  readonly kind: string;
  readonly type: string;
  readonly visibility: string;
  readonly scope: number;
}}

export const PARENT_LANGUAGES: Readonly<Record<string, string>> = {{
{parents}}};

export class SymbolTable {{
  private readonly symbols = new Map<string, SymbolEntry>();

  /** The {count} symbols of grammar {grammar}. */
  static seeded(): SymbolTable {{
    const table = new SymbolTable();
{seeds}    return table;
  }}

  insert(symbol: SymbolEntry): boolean {{
    const key = `${{symbol.language}}.${{symbol.name}}`;
    if (this.symbols.has(key)) {{
      return false;
    }}
    this.symbols.set(key, symbol);
    return true;
  }}

  /** Searches `language`, then its enclosing languages. */
  lookup(language: string, name: string): SymbolEntry | undefined {{
    for (let lang: string | undefined = language; lang !== undefined; lang = PARENT_LANGUAGES[lang]) {{
      const found = this.symbols.get(`${{lang}}.${{name}}`);
      if (found !== undefined) {{
        return found;
      }}
    }}
    return undefined;
  }}

  get size(): number {{
    return this.symbols.size;
  }}
}}
"#,
            banner = banner("//", analysis),
            parents = parents,
            count = analysis.symbols.len(),
            grammar = analysis.grammar,
            seeds = seeds,
        );
        Ok(Artifact::new("symbolTable.ts", src))
    }

    fn scope_manager(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let root = analysis
            .contexts
            .first()
            .map(|c| c.language.as_str())
            .unwrap_or(analysis.grammar.as_str());
        let src = format!(
            r#"{banner}
export const MAX_SCOPE_DEPTH = 256;

export interface Scope {{
  readonly id: number;
  readonly parent: number | null;
  readonly kind: string;
  readonly language: string;
  readonly depth: number;
}}

export class ScopeManager {{
  private readonly stack: Scope[] = [
    {{ id: 0, parent: null, kind: 'global', language: {root}, depth: 0 }},
  ];
  private nextId = 1;

  /** Opens a child of the current scope, one level deeper. */
  enter(kind: string, language: string): Scope {{
    const top = this.current;
    if (top.depth + 1 > MAX_SCOPE_DEPTH) {{
      throw new RangeError('scope depth limit exceeded');
    }}
    const scope: Scope = {{ id: this.nextId++, parent: top.id, kind, language, depth: top.depth + 1 }};
    this.stack.push(scope);
    return scope;
  }}

  exit(): Scope {{
    if (this.stack.length === 1) {{
      throw new Error('cannot exit the global scope');
    }}
    return this.stack.pop() as Scope;
  }}

  get current(): Scope {{
    return this.stack[this.stack.length - 1];
  }}

  get depth(): number {{
    return this.current.depth;
  }}
}}
"#,
            banner = banner("//", analysis),
            root = quote(root),
        );
        Ok(Artifact::new("scopeManager.ts", src))
    }

    fn validator(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
    ) -> Result<Artifact, CodegenError> {
        let mut rules = String::new();
        for r in &analysis.validation_rules {
            rules.push_str(&format!(
                "  {{ name: {}, source: {}, target: {}, severity: {} }},\n",
                quote(&r.name),
                quote(&r.source_pattern),
                quote(&r.target_pattern),
                quote(&r.severity.to_string()),
            ));
        }
        let src = format!(
            r#"{banner}
import {{ SymbolTable }} from './symbolTable';

export interface Rule {{
  readonly name: string;
  readonly source: string;
  readonly target: string;
  readonly severity: 'error' | 'warning' | 'info';
}}

export interface Reference {{
  readonly sourceLanguage: string;
  readonly targetLanguage: string;
  readonly symbol: string;
  readonly type: string;
}}

export const RULES: readonly Rule[] = [
{rules}];

const NUMERIC_TYPES = new Set<string>({numeric});
const STRING_TYPES = new Set<string>({strings});

export function typesCompatible(a: string, b: string): boolean {{
  if (a === b || a === 'unknown' || b === 'unknown' || a === '' || b === '') {{
    return true;
  }}
  return (NUMERIC_TYPES.has(a) && NUMERIC_TYPES.has(b)) || (STRING_TYPES.has(a) && STRING_TYPES.has(b));
}}

export function validate(table: SymbolTable, ref: Reference): string[] {{
  const target = table.lookup(ref.targetLanguage, ref.symbol);
  if (target === undefined) {{
    return [`unresolved reference ${{ref.targetLanguage}}.${{ref.symbol}}`];
  }}
  const issues: string[] = [];
  if (!typesCompatible(ref.type, target.type)) {{
    issues.push(`${{ref.symbol}} is ${{ref.type}} in ${{ref.sourceLanguage}} but ${{target.type}} in ${{target.language}}`);
  }}
  if (target.visibility === 'private' && target.language !== ref.sourceLanguage) {{
    issues.push(`${{ref.symbol}} is private to ${{target.language}}`);
  }}
  return issues;
}}
"#,
            banner = banner("//", analysis),
            rules = rules,
            numeric = string_array(NUMERIC_TYPES),
            strings = string_array(STRING_TYPES),
        );
        Ok(Artifact::new("contextValidator.ts", src))
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
        let src = format!(
            r#"{banner}
/** The grammar followed by its resolved bases, nearest first. */
export const INHERITANCE_CHAIN: readonly string[] = {chain};

export function inherits(grammar: string): boolean {{
  return INHERITANCE_CHAIN.slice(1).includes(grammar);
}}
"#,
            banner = banner("//", analysis),
            chain = string_array(&analysis.inheritance_chain),
        );
        Ok(Some(Artifact::new("inheritance.ts", src)))
    }

    fn headers(
        &self,
        analysis: &ContextAnalysisResult,
        _config: &GenerationConfig,
        files: &BTreeMap<String, String>,
    ) -> Vec<Artifact> {
        let declarations = [
            ("symbolTable.ts", SYMBOL_TABLE_DTS),
            ("scopeManager.ts", SCOPE_MANAGER_DTS),
            ("contextValidator.ts", VALIDATOR_DTS),
            ("inheritance.ts", INHERITANCE_DTS),
        ];
        declarations
            .iter()
            .filter(|(file, _)| files.contains_key(*file))
            .filter_map(|(file, dts)| {
                let stem = file.strip_suffix(".ts")?;
                Some(Artifact::new(
                    format!("{}.d.ts", stem),
                    format!("{}{}", banner("//", analysis), dts),
                ))
            })
            .collect()
    }
}
