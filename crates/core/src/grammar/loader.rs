//! Line-oriented grammar directive loader.
//!
//! Reads header lines (`Grammar: Name`), `@` directives, productions
//! (`<name> ::= ...`) and `@IF` / `@ELSE` / `@ENDIF` conditional regions into
//! a [`GrammarSpec`]. Problems are collected as diagnostics; loading never
//! stops early, and `success()` is false once any error was recorded.

use super::{
    CompositionStrategy, ContextDecl, GrammarSpec, ImportDecl, Production, ReferenceDecl,
    SwitchPattern, SymbolDecl, SymbolTableSharing,
};
use crate::context::{ContextRule, RuleAction, RuleCondition, ScopeKind, SymbolKind, Visibility};
use crate::error::{codes, has_errors, Diagnostic, Severity};
use crate::tokenizer::TokenSplitter;
use crate::validation::{RuleCheck, ValidationRule};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Target evaluated by `@IF(target="X")`.
    pub target: Option<String>,
    /// Reported in diagnostics.
    pub file: Option<String>,
    /// Grammar name used when the source has no `Grammar:` header.
    pub default_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GrammarLoad {
    pub grammar: GrammarSpec,
    pub diagnostics: Vec<Diagnostic>,
}

impl GrammarLoad {
    pub fn success(&self) -> bool {
        !has_errors(&self.diagnostics)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

fn args_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).expect("static regex"))
}

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^@IMPORT\s+([A-Za-z_][\w.-]*)\s+FROM\s+"([^"]+)"\s*$"#).expect("static regex")
    })
}

fn embed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@CONTEXT\[([^\]]+)\]").expect("static regex"))
}

fn validate_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][\w-]*)\s*:\s*(\S+)\s*->\s*(\S+)\s*(?:\[(\w+)\])?\s*,?$")
            .expect("static regex")
    })
}

fn symbol_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][\w$.-]*$").expect("static regex"))
}

enum Block {
    Context { language: String, line: u32 },
    Validate { line: u32 },
}

struct Conditional {
    parent_active: bool,
    condition: bool,
    in_else: bool,
    line: u32,
}

impl Conditional {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

struct Loader<'o> {
    options: &'o LoadOptions,
    grammar: GrammarSpec,
    has_name: bool,
    diagnostics: Vec<Diagnostic>,
    block: Option<Block>,
    conditionals: Vec<Conditional>,
}

/// Parse grammar source text.
pub fn parse_grammar(src: &str, options: &LoadOptions) -> GrammarLoad {
    let default_name = options.default_name.as_deref().unwrap_or("Grammar");
    let mut loader = Loader {
        options,
        grammar: GrammarSpec::new(default_name),
        has_name: false,
        diagnostics: Vec::new(),
        block: None,
        conditionals: Vec::new(),
    };

    for (idx, raw) in src.lines().enumerate() {
        loader.line(idx as u32 + 1, raw);
    }
    loader.finish(src.lines().count() as u32);

    GrammarLoad {
        grammar: loader.grammar,
        diagnostics: loader.diagnostics,
    }
}

impl Loader<'_> {
    fn report(&mut self, mut d: Diagnostic) {
        if let Some(file) = &self.options.file {
            d.file = Some(file.clone());
        }
        self.diagnostics.push(d);
    }

    fn active(&self) -> bool {
        self.conditionals.last().map_or(true, Conditional::active)
    }

    fn current_language(&self) -> Option<String> {
        match &self.block {
            Some(Block::Context { language, .. }) => Some(language.clone()),
            _ => None,
        }
    }

    fn line(&mut self, line: u32, raw: &str) {
        let text = raw.trim();
        if text.is_empty() || text.starts_with("//") || text.starts_with('#') {
            return;
        }

        // Conditional markers are honoured even inside inactive regions so
        // nesting stays balanced.
        if let Some(rest) = text.strip_prefix("@IF") {
            let args = parse_args(rest);
            let condition = match (args.get("target"), &self.options.target) {
                (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
                (Some(_), None) => false,
                (None, _) => {
                    self.report(
                        Diagnostic::error(codes::MALFORMED_DIRECTIVE, line, "@IF requires target=\"...\"")
                            .with_suggestion("write @IF(target=\"rust\")"),
                    );
                    false
                }
            };
            let parent_active = self.active();
            self.conditionals.push(Conditional {
                parent_active,
                condition,
                in_else: false,
                line,
            });
            return;
        }
        if text == "@ELSE" {
            match self.conditionals.last_mut() {
                Some(c) if !c.in_else => c.in_else = true,
                _ => self.report(Diagnostic::error(
                    codes::UNBALANCED_CONDITIONAL,
                    line,
                    "@ELSE without a matching @IF",
                )),
            }
            return;
        }
        if text == "@ENDIF" {
            if self.conditionals.pop().is_none() {
                self.report(Diagnostic::error(
                    codes::UNBALANCED_CONDITIONAL,
                    line,
                    "@ENDIF without a matching @IF",
                ));
            }
            return;
        }
        if !self.active() {
            return;
        }

        if text == "}" {
            if self.block.take().is_none() {
                self.report(Diagnostic::warning(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    "stray '}' outside a directive block",
                ));
            }
            return;
        }

        if let Some(Block::Validate { .. }) = self.block {
            self.validate_block_line(line, text);
            return;
        }

        if text.starts_with('@') {
            self.directive(line, text);
        } else if text.contains("::=") {
            self.production(line, text);
        } else if let Some(rest) = text.strip_prefix('|') {
            self.continue_production(line, rest.trim());
        } else if let Some((key, value)) = text.split_once(':') {
            self.header(line, key.trim(), value.trim());
        } else {
            self.report(Diagnostic::warning(
                codes::UNKNOWN_DIRECTIVE,
                line,
                format!("unrecognized line '{}'", text),
            ));
        }
    }

    fn header(&mut self, line: u32, key: &str, value: &str) {
        match key {
            "Grammar" => {
                if value.is_empty() {
                    self.report(Diagnostic::error(
                        codes::MALFORMED_DIRECTIVE,
                        line,
                        "Grammar header needs a name",
                    ));
                } else {
                    self.grammar.name = value.to_string();
                    self.has_name = true;
                }
            }
            "TokenSplitter" => match TokenSplitter::parse(value) {
                Some(s) => self.grammar.token_splitter = s,
                None => self.report(
                    Diagnostic::error(
                        codes::UNKNOWN_TOKEN_SPLITTER,
                        line,
                        format!("unknown token splitter '{}'", value),
                    )
                    .with_suggestion("use one of: none, space, regex"),
                ),
            },
            "TokenPattern" => self.grammar.token_pattern = Some(value.to_string()),
            "EmbeddedLanguages" => {
                for lang in split_csv(value) {
                    self.grammar.add_embedded_language(&lang);
                }
            }
            "Inherits" => {
                for base in split_csv(value) {
                    self.grammar.add_base_grammar(&base);
                }
            }
            "ContextSensitive" => {
                if let Some(b) = self.boolean(line, key, value) {
                    self.grammar.context_sensitive = b;
                }
            }
            "EmbeddedLanguage" => {
                if let Some(b) = self.boolean(line, key, value) {
                    self.grammar.embedded_language = b;
                }
            }
            "CrossLanguageValidation" => {
                if let Some(b) = self.boolean(line, key, value) {
                    self.grammar.cross_language_validation = b;
                }
            }
            "ParentContext" => self.grammar.parent_context = Some(value.to_string()),
            "SymbolTableSharing" => match SymbolTableSharing::parse(value) {
                Some(s) => self.grammar.symbol_table_sharing = s,
                None => self.report(
                    Diagnostic::error(
                        codes::UNKNOWN_SHARING_STRATEGY,
                        line,
                        format!("unknown symbol table sharing strategy '{}'", value),
                    )
                    .with_suggestion("use one of: none, flat, hierarchical, scoped"),
                ),
            },
            _ => self.report(Diagnostic::warning(
                codes::UNKNOWN_HEADER,
                line,
                format!("unknown header '{}'", key),
            )),
        }
    }

    fn boolean(&mut self, line: u32, key: &str, value: &str) -> Option<bool> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => {
                self.report(Diagnostic::error(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    format!("{} expects true or false, got '{}'", key, value),
                ));
                None
            }
        }
    }

    fn directive(&mut self, line: u32, text: &str) {
        let name_end = text[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|i| i + 1)
            .unwrap_or(text.len());
        let name = &text[1..name_end];
        let rest = &text[name_end..];

        match name {
            "IMPORT" => self.import(line, text),
            "COMPOSE" => self.compose(line, rest),
            "CONTEXT" => self.context(line, rest),
            "ENDCONTEXT" => self.report(Diagnostic::warning(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@ENDCONTEXT outside a production definition",
            )),
            "SYMBOL" => self.symbol(line, rest),
            "REFERENCE" => self.reference(line, rest),
            "VALIDATE" => self.validate(line, rest),
            "RULE" => self.rule(line, rest),
            "SWITCH" => self.switch(line, rest),
            _ => self.report(Diagnostic::warning(
                codes::UNKNOWN_DIRECTIVE,
                line,
                format!("unknown directive '@{}'", name),
            )),
        }
    }

    fn import(&mut self, line: u32, text: &str) {
        match import_re().captures(text) {
            Some(caps) => {
                let language = caps[1].to_string();
                self.grammar.imports.push(ImportDecl {
                    language: language.clone(),
                    path: caps[2].to_string(),
                    line,
                });
            }
            None => self.report(
                Diagnostic::error(codes::MALFORMED_DIRECTIVE, line, "malformed @IMPORT")
                    .with_suggestion("write @IMPORT Lang FROM \"path/to/lang.grammar\""),
            ),
        }
    }

    fn compose(&mut self, line: u32, rest: &str) {
        let strategy = rest
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split_once(':')
            .filter(|(k, _)| k.trim() == "strategy")
            .map(|(_, v)| v.trim().trim_matches('"').to_string());
        match strategy.as_deref().map(CompositionStrategy::parse) {
            Some(Some(s)) => self.grammar.composition = s,
            Some(None) => self.report(
                Diagnostic::error(
                    codes::UNKNOWN_COMPOSITION_STRATEGY,
                    line,
                    format!(
                        "unknown composition strategy '{}'",
                        strategy.unwrap_or_default()
                    ),
                )
                .with_suggestion("use one of: merge, override, extend"),
            ),
            None => self.report(
                Diagnostic::error(codes::MALFORMED_DIRECTIVE, line, "malformed @COMPOSE")
                    .with_suggestion("write @COMPOSE { strategy: merge }"),
            ),
        }
    }

    fn context(&mut self, line: u32, rest: &str) {
        let rest = rest.trim();
        if let Some(inner) = rest.strip_prefix('[') {
            let Some((language, after)) = inner.split_once(']') else {
                self.report(Diagnostic::error(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    "unterminated '[' in @CONTEXT",
                ));
                return;
            };
            let language = language.trim().to_string();
            self.grammar.contexts.push(ContextDecl {
                language: language.clone(),
                scope: None,
                line,
            });
            if after.trim() == "{" {
                if self.block.is_some() {
                    self.report(Diagnostic::error(
                        codes::MALFORMED_DIRECTIVE,
                        line,
                        "nested directive blocks are not supported",
                    ));
                    return;
                }
                self.block = Some(Block::Context { language, line });
            }
            return;
        }

        let args = parse_args(rest);
        match args.get("language") {
            Some(language) => {
                let scope = args.get("scope").map(|s| ScopeKind::parse(s));
                self.grammar.contexts.push(ContextDecl {
                    language: language.clone(),
                    scope,
                    line,
                });
            }
            None => self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@CONTEXT requires language=\"...\" or [Language]",
            )),
        }
    }

    fn symbol(&mut self, line: u32, rest: &str) {
        let args = parse_args(rest);
        let Some(name) = args.get("name") else {
            self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@SYMBOL requires name=\"...\"",
            ));
            return;
        };
        if !symbol_name_re().is_match(name) {
            self.report(
                Diagnostic::error(
                    codes::INVALID_SYMBOL_NAME,
                    line,
                    format!("invalid symbol name '{}'", name),
                )
                .with_suggestion("symbol names start with a letter or '_'"),
            );
            return;
        }
        let kind_text = args.get("type").map(String::as_str).unwrap_or("variable");
        let Some(kind) = SymbolKind::parse(kind_text) else {
            self.report(
                Diagnostic::error(
                    codes::INVALID_SYMBOL_TYPE,
                    line,
                    format!("invalid symbol type '{}'", kind_text),
                )
                .with_suggestion(
                    "use variable, function, class, interface, type, constant, parameter, label or custom:<name>",
                ),
            );
            return;
        };
        let visibility = args
            .get("scope")
            .and_then(|s| Visibility::parse(s))
            .unwrap_or(Visibility::Public);
        let value_type = args
            .get("valueType")
            .or_else(|| args.get("dataType"))
            .cloned();
        self.grammar.symbols.push(SymbolDecl {
            name: name.clone(),
            kind,
            visibility,
            value_type,
            language: self.current_language(),
            line,
        });
    }

    fn reference(&mut self, line: u32, rest: &str) {
        let args = parse_args(rest);
        let Some(target) = args.get("target") else {
            self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@REFERENCE requires target=\"...\"",
            ));
            return;
        };
        let (target_language, target_symbol) = match target
            .split_once("::")
            .or_else(|| target.split_once('.'))
        {
            Some((lang, sym)) => (lang.trim().to_string(), sym.trim().to_string()),
            None => (
                self.current_language()
                    .unwrap_or_else(|| self.grammar.name.clone()),
                target.trim().to_string(),
            ),
        };
        self.grammar.references.push(ReferenceDecl {
            target_language,
            target_symbol,
            resolution: args.get("resolution").cloned(),
            declared_type: args.get("type").cloned(),
            source_language: self.current_language(),
            line,
        });
    }

    fn validate(&mut self, line: u32, rest: &str) {
        let rest = rest.trim();
        if rest == "{" {
            if self.block.is_some() {
                self.report(Diagnostic::error(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    "nested directive blocks are not supported",
                ));
            } else {
                self.block = Some(Block::Validate { line });
            }
            return;
        }
        if let Some(body) = rest.strip_prefix('{') {
            // Single-line form: @VALIDATE { name: a -> b }
            let body = body.trim().trim_end_matches('}').trim();
            self.validate_block_line(line, body);
            return;
        }

        let args = parse_args(rest);
        let Some(rule_name) = args.get("rule") else {
            self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@VALIDATE requires rule=\"...\"",
            ));
            return;
        };
        let severity = match args.get("severity") {
            None => Severity::Error,
            Some(s) => match Severity::parse(s) {
                Some(sev) => sev,
                None => {
                    self.report(Diagnostic::error(
                        codes::MALFORMED_DIRECTIVE,
                        line,
                        format!("unknown severity '{}'", s),
                    ));
                    return;
                }
            },
        };
        let mut rule = ValidationRule::new(
            rule_name,
            args.get("source").map(String::as_str).unwrap_or("*"),
            args.get("target").map(String::as_str).unwrap_or("*"),
            severity,
        );
        if let Some(check) = args.get("check") {
            match RuleCheck::parse(check) {
                Some(c) => rule.check = c,
                None => self.report(Diagnostic::warning(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    format!("unknown check '{}', inferring from rule name", check),
                )),
            }
        }
        rule.message = args.get("message").cloned();
        rule.line = line;
        self.grammar.validation_rules.push(rule);
    }

    fn validate_block_line(&mut self, line: u32, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(caps) = validate_line_re().captures(text) else {
            self.report(
                Diagnostic::error(
                    codes::MALFORMED_DIRECTIVE,
                    line,
                    format!("malformed validation rule '{}'", text),
                )
                .with_suggestion("write rule_name: source_pattern -> target_pattern [severity]"),
            );
            return;
        };
        let severity = match caps.get(4) {
            None => Severity::Error,
            Some(m) => match Severity::parse(m.as_str()) {
                Some(s) => s,
                None => {
                    self.report(Diagnostic::error(
                        codes::MALFORMED_DIRECTIVE,
                        line,
                        format!("unknown severity '{}'", m.as_str()),
                    ));
                    return;
                }
            },
        };
        let mut rule = ValidationRule::new(&caps[1], &caps[2], &caps[3], severity);
        rule.line = line;
        self.grammar.validation_rules.push(rule);
    }

    fn rule(&mut self, line: u32, rest: &str) {
        let args = parse_args(rest);
        let (Some(name), Some(when), Some(then)) = (args.get("name"), args.get("when"), args.get("then"))
        else {
            self.report(Diagnostic::error(
                codes::INVALID_RULE,
                line,
                "@RULE requires name, when and then",
            ));
            return;
        };
        let Some(condition) = RuleCondition::parse(when) else {
            self.report(
                Diagnostic::error(codes::INVALID_RULE, line, format!("invalid rule condition '{}'", when))
                    .with_suggestion("use symbol-exists[:name], scope:<kind>, matched:<rule>, token:<text> or custom:<name>"),
            );
            return;
        };
        let Some(action) = RuleAction::parse(then) else {
            self.report(
                Diagnostic::error(codes::INVALID_RULE, line, format!("invalid rule action '{}'", then))
                    .with_suggestion("use add-symbol:<kind>, modify-symbol:<key>=<value>, change-scope:<kind>, apply-rule:<rule> or custom:<name>"),
            );
            return;
        };
        let priority = match args.get("priority").map(|p| p.parse::<i32>()) {
            None => 0,
            Some(Ok(p)) => p,
            Some(Err(_)) => {
                self.report(Diagnostic::error(
                    codes::INVALID_RULE,
                    line,
                    "rule priority must be an integer",
                ));
                return;
            }
        };
        let mut rule = ContextRule::new(name, condition, action, priority);
        rule.origin = self.grammar.name.clone();
        self.grammar.context_rules.push(rule);
    }

    fn switch(&mut self, line: u32, rest: &str) {
        let args = parse_args(rest);
        match (args.get("language"), args.get("start"), args.get("end")) {
            (Some(language), Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                self.grammar.switch_patterns.push(SwitchPattern {
                    language: language.clone(),
                    trigger: start.clone(),
                    end_trigger: end.clone(),
                });
            }
            _ => self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "@SWITCH requires language, start and end",
            )),
        }
    }

    fn production(&mut self, line: u32, text: &str) {
        let Some((lhs, rhs)) = text.split_once("::=") else {
            return;
        };
        let name = lhs.trim().trim_start_matches('<').trim_end_matches('>').trim();
        if name.is_empty() {
            self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "production is missing a name",
            ));
            return;
        }
        self.grammar.productions.push(Production {
            name: name.to_string(),
            definition: rhs.trim().to_string(),
            embedded: Vec::new(),
            line,
        });
    }

    fn continue_production(&mut self, line: u32, alternative: &str) {
        match self.grammar.productions.last_mut() {
            Some(p) => {
                p.definition.push_str(" | ");
                p.definition.push_str(alternative);
            }
            None => self.report(Diagnostic::error(
                codes::MALFORMED_DIRECTIVE,
                line,
                "alternative '|' before any production",
            )),
        }
    }

    fn finish(&mut self, last_line: u32) {
        match self.block.take() {
            Some(Block::Context { language, line }) => self.report(Diagnostic::error(
                codes::UNTERMINATED_BLOCK,
                line,
                format!("@CONTEXT[{}] block is never closed", language),
            )),
            Some(Block::Validate { line }) => self.report(Diagnostic::error(
                codes::UNTERMINATED_BLOCK,
                line,
                "@VALIDATE block is never closed",
            )),
            None => {}
        }
        while let Some(c) = self.conditionals.pop() {
            self.report(
                Diagnostic::error(codes::UNBALANCED_CONDITIONAL, c.line, "@IF is never closed")
                    .with_suggestion("add a matching @ENDIF"),
            );
        }
        if !self.has_name {
            self.report(Diagnostic::warning(
                codes::UNKNOWN_HEADER,
                last_line.max(1),
                format!("missing 'Grammar:' header, using '{}'", self.grammar.name),
            ));
        }

        self.scan_production_embeddings();
        self.check_reference_targets();
    }

    fn scan_production_embeddings(&mut self) {
        let mut problems = Vec::new();
        for p in &mut self.grammar.productions {
            let opened: Vec<String> = embed_re()
                .captures_iter(&p.definition)
                .map(|c| c[1].trim().to_string())
                .collect();
            let closed = p.definition.matches("@ENDCONTEXT").count();
            if opened.len() != closed {
                problems.push((p.line, p.name.clone()));
            }
            for lang in opened {
                if !p.embedded.contains(&lang) {
                    p.embedded.push(lang);
                }
            }
        }
        for (line, name) in problems {
            self.report(Diagnostic::error(
                codes::UNTERMINATED_BLOCK,
                line,
                format!(
                    "production '{}' has unbalanced @CONTEXT[...] / @ENDCONTEXT markers",
                    name
                ),
            ));
        }
        let embedded: Vec<String> = self
            .grammar
            .productions
            .iter()
            .flat_map(|p| p.embedded.clone())
            .collect();
        for lang in embedded {
            self.grammar.add_embedded_language(&lang);
        }
    }

    fn check_reference_targets(&mut self) {
        let mut known: Vec<&str> = vec![self.grammar.name.as_str()];
        known.extend(self.grammar.embedded_languages.iter().map(String::as_str));
        known.extend(self.grammar.imports.iter().map(|i| i.language.as_str()));
        known.extend(self.grammar.contexts.iter().map(|c| c.language.as_str()));
        if let Some(parent) = &self.grammar.parent_context {
            known.push(parent.as_str());
        }

        let unresolved: Vec<(u32, String, String)> = self
            .grammar
            .references
            .iter()
            .filter(|r| !known.iter().any(|k| k.eq_ignore_ascii_case(&r.target_language)))
            .map(|r| (r.line, r.target_language.clone(), r.target_symbol.clone()))
            .collect();
        for (line, lang, sym) in unresolved {
            self.report(
                Diagnostic::error(
                    codes::UNRESOLVED_REFERENCE_TARGET,
                    line,
                    format!("reference target '{}.{}' names an unknown language", lang, sym),
                )
                .with_suggestion(format!(
                    "add '{}' to EmbeddedLanguages or @IMPORT it",
                    lang
                )),
            );
        }
    }
}

fn parse_args(text: &str) -> BTreeMap<String, String> {
    args_re()
        .captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::symbol_table::SharingStrategy;

    fn load(src: &str) -> GrammarLoad {
        parse_grammar(src, &LoadOptions::default())
    }

    fn codes_of(load: &GrammarLoad) -> Vec<&str> {
        load.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn parses_headers_and_directives() {
        let load = load(
            r#"
Grammar: Markup
TokenSplitter: space
EmbeddedLanguages: Script, Style
SymbolTableSharing: flat
CrossLanguageValidation: true
Inherits: BaseMarkup
@IMPORT Script FROM "script.grammar"
@COMPOSE { strategy: extend }
@SYMBOL(name="onClick", type="function", scope="public")
@REFERENCE(target="Script.handler", type="function")
@VALIDATE(rule="scope_access", severity="warning", source="Markup", target="Script")
@RULE(name="defs", when="token:def", then="change-scope:function", priority="5")
@SWITCH(language="Style", start="<style>", end="</style>")
<document> ::= <element>*
  | <text>
"#,
        );
        assert!(load.success(), "{:?}", load.diagnostics);
        let g = &load.grammar;
        assert_eq!(g.name(), "Markup");
        assert_eq!(g.embedded_languages(), &["Script".to_string(), "Style".to_string()]);
        assert_eq!(g.sharing(), SharingStrategy::Global);
        assert_eq!(g.base_grammars(), &["BaseMarkup".to_string()]);
        assert_eq!(g.composition, CompositionStrategy::Extend);
        assert_eq!(g.imports[0].path, "script.grammar");
        assert_eq!(g.symbols[0].kind, SymbolKind::Function);
        assert_eq!(g.references[0].target_language, "Script");
        assert_eq!(g.references[0].target_symbol, "handler");
        assert_eq!(g.validation_rules[0].severity, Severity::Warning);
        assert_eq!(g.validation_rules[0].check, RuleCheck::Accessibility);
        assert_eq!(g.context_rules[0].priority, 5);
        assert_eq!(g.context_rules[0].origin, "Markup");
        assert_eq!(g.switch_patterns[0].end_trigger, "</style>");
        assert_eq!(g.productions[0].definition, "<element>* | <text>");
    }

    #[test]
    fn validate_block_rules_carry_severity() {
        let load = load(
            "Grammar: G\n@VALIDATE {\n  type_check: int -> string\n  naming: Script -> * [info]\n}\n",
        );
        assert!(load.success(), "{:?}", load.diagnostics);
        let rules = &load.grammar.validation_rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].source_pattern, "int");
        assert_eq!(rules[0].target_pattern, "string");
        assert_eq!(rules[0].severity, Severity::Error);
        assert_eq!(rules[0].check, RuleCheck::TypeCompatibility);
        assert_eq!(rules[1].severity, Severity::Info);
    }

    #[test]
    fn single_line_validate_block() {
        let load = load("Grammar: G\n@VALIDATE { type_check: int -> string [warning] }\n");
        assert!(load.success(), "{:?}", load.diagnostics);
        assert_eq!(load.grammar.validation_rules[0].severity, Severity::Warning);
    }

    #[test]
    fn context_block_scopes_symbols_to_language() {
        let load = load(
            "Grammar: Page\nEmbeddedLanguages: Style\n@CONTEXT[Style] {\n@SYMBOL(name=\"primary\", type=\"constant\")\n@REFERENCE(target=\"accent\")\n}\n@SYMBOL(name=\"title\")\n",
        );
        assert!(load.success(), "{:?}", load.diagnostics);
        let g = &load.grammar;
        assert_eq!(g.symbols[0].language.as_deref(), Some("Style"));
        assert_eq!(g.symbols[1].language, None);
        assert_eq!(g.references[0].target_language, "Style");
        assert_eq!(g.contexts[0].language, "Style");
    }

    #[test]
    fn collects_errors_and_keeps_going() {
        let load = load(
            r#"Grammar: Broken
TokenSplitter: words
SymbolTableSharing: tree
@COMPOSE { strategy: fuse }
@SYMBOL(name="9lives", type="variable")
@SYMBOL(name="ok", type="gizmo")
@REFERENCE(target="Nowhere.thing")
@SYMBOL(name="kept", type="label")
"#,
        );
        assert!(!load.success());
        let codes = codes_of(&load);
        for expected in [
            codes::UNKNOWN_TOKEN_SPLITTER,
            codes::UNKNOWN_SHARING_STRATEGY,
            codes::UNKNOWN_COMPOSITION_STRATEGY,
            codes::INVALID_SYMBOL_NAME,
            codes::INVALID_SYMBOL_TYPE,
            codes::UNRESOLVED_REFERENCE_TARGET,
        ] {
            assert!(codes.contains(&expected), "missing {} in {:?}", expected, codes);
        }
        assert_eq!(load.grammar.symbols.len(), 1);
        assert_eq!(load.grammar.symbols[0].name, "kept");
    }

    #[test]
    fn conditional_regions_follow_target() {
        let src = "Grammar: G\n@IF(target=\"rust\")\n@SYMBOL(name=\"a\")\n@ELSE\n@SYMBOL(name=\"b\")\n@ENDIF\n";
        let rust = parse_grammar(
            src,
            &LoadOptions {
                target: Some("Rust".into()),
                ..LoadOptions::default()
            },
        );
        assert_eq!(rust.grammar.symbols[0].name, "a");
        assert_eq!(rust.grammar.symbols.len(), 1);

        let other = load(src);
        assert_eq!(other.grammar.symbols[0].name, "b");
    }

    #[test]
    fn nested_conditionals_inside_inactive_branch_stay_inactive() {
        let src = "Grammar: G\n@IF(target=\"go\")\n@IF(target=\"go\")\n@SYMBOL(name=\"x\")\n@ELSE\n@SYMBOL(name=\"y\")\n@ENDIF\n@ENDIF\n";
        let load = load(src);
        assert!(load.success());
        assert!(load.grammar.symbols.is_empty());
    }

    #[test]
    fn unbalanced_conditionals_and_blocks_are_errors() {
        let load = load("Grammar: G\n@IF(target=\"x\")\n@VALIDATE {\n");
        let codes = codes_of(&load);
        assert!(codes.contains(&codes::UNBALANCED_CONDITIONAL));
        assert!(!load.success());

        let load2 = super::parse_grammar("Grammar: G\n@ENDIF\n@CONTEXT[Css] {\n", &LoadOptions::default());
        let codes2 = codes_of(&load2);
        assert!(codes2.contains(&codes::UNBALANCED_CONDITIONAL));
        assert!(codes2.contains(&codes::UNTERMINATED_BLOCK));
    }

    #[test]
    fn production_markers_register_embedded_languages() {
        let load = load(
            "Grammar: Primary\n<stmt> ::= <ident> = <expr> | @CONTEXT[Expr] <expr> @ENDCONTEXT\n<bad> ::= @CONTEXT[Css] <rule>\n",
        );
        assert_eq!(load.grammar.productions[0].embedded, vec!["Expr".to_string()]);
        assert!(load.grammar.embedded_languages.contains(&"Expr".to_string()));
        assert!(codes_of(&load).contains(&codes::UNTERMINATED_BLOCK));
    }

    #[test]
    fn missing_name_falls_back_with_warning() {
        let load = parse_grammar(
            "TokenSplitter: none\n",
            &LoadOptions {
                default_name: Some("fallback".into()),
                ..LoadOptions::default()
            },
        );
        assert!(load.success());
        assert_eq!(load.grammar.name, "fallback");
        assert!(codes_of(&load).contains(&codes::UNKNOWN_HEADER));
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let load = load("Grammar: G\n@RULE(name=\"r\", when=\"sometimes\", then=\"add-symbol:variable\")\n@RULE(name=\"s\", when=\"token:x\", then=\"explode\")\n");
        assert_eq!(
            load.diagnostics.iter().filter(|d| d.code == codes::INVALID_RULE).count(),
            2
        );
        assert!(load.grammar.context_rules.is_empty());
    }
}
