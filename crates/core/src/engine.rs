//! Context-sensitive parsing.
//!
//! [`ContextEngine::parse_with_context`] tokenizes the input, evaluates
//! context rules per token, opens and closes nested scopes, records symbol
//! definitions and references, and returns the whole context arena as a
//! [`ParseOutcome`]. The per-session state lives in [`Scan`], which the
//! embedded-language manager drives token by token as well.

use crate::cancel::ScanBudget;
use crate::config::EngineConfig;
use crate::context::{
    ContextId, ContextRule, ParseContext, Position, RuleAction, RuleCondition, ScopeKind,
    SymbolInfo, SymbolKind, Visibility,
};
use crate::error::{codes, Diagnostic, Severity};
use crate::grammar::{Grammar, GrammarRegistry};
use crate::inheritance::resolve_inheritance;
use crate::symbol_table::{CacheStats, SharingStrategy};
use crate::syntax::{SyntaxBuilder, SyntaxKind, SyntaxNode};
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// `ApplyRule` chains deeper than this are cut off.
const MAX_RULE_CHAIN: usize = 8;

/// Attribute keys set on every context.
pub const GRAMMAR_ATTRIBUTE: &str = "grammar";
pub const LANGUAGE_ATTRIBUTE: &str = "language";

// ──────────────────────────────────────────────
// Plug-in seams
// ──────────────────────────────────────────────

/// Condition body for `custom:<name>` rules.
pub trait RulePredicate {
    fn evaluate(&self, context: &ParseContext, token: &Token) -> bool;
}

impl<F> RulePredicate for F
where
    F: Fn(&ParseContext, &Token) -> bool,
{
    fn evaluate(&self, context: &ParseContext, token: &Token) -> bool {
        self(context, token)
    }
}

/// Action body for `custom:<name>` rules.
pub trait RuleExecutor {
    fn execute(&self, context: &mut ParseContext, token: &Token) -> Result<(), String>;
}

impl<F> RuleExecutor for F
where
    F: Fn(&mut ParseContext, &Token) -> Result<(), String>,
{
    fn execute(&self, context: &mut ParseContext, token: &Token) -> Result<(), String> {
        self(context, token)
    }
}

#[derive(Default)]
pub(crate) struct Hooks {
    predicates: BTreeMap<String, Box<dyn RulePredicate>>,
    executors: BTreeMap<String, Box<dyn RuleExecutor>>,
}

// ──────────────────────────────────────────────
// Outcome types
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseMetrics {
    pub tokens: usize,
    /// Context rules that fired.
    pub context_switches: usize,
    pub scopes_opened: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub elapsed_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseSession {
    pub grammar: String,
    pub ast: SyntaxNode,
    /// Context arena indexed by [`ContextId`].
    pub contexts: Vec<ParseContext>,
    /// Hoisted (global) symbols.
    pub symbols: BTreeMap<String, SymbolInfo>,
    pub warnings: Vec<Diagnostic>,
    pub metrics: ParseMetrics,
    /// Depth of the innermost open scope when the scan stopped.
    pub final_depth: usize,
}

impl ParseSession {
    pub fn context(&self, id: ContextId) -> Option<&ParseContext> {
        self.contexts.get(id.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ParseOutcome {
    Success(ParseSession),
    /// The scan stopped or finished in error; `session` holds everything
    /// built up to that point.
    Failure {
        session: ParseSession,
        errors: Vec<Diagnostic>,
    },
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success(_))
    }

    pub fn session(&self) -> &ParseSession {
        match self {
            ParseOutcome::Success(session) | ParseOutcome::Failure { session, .. } => session,
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        match self {
            ParseOutcome::Success(_) => &[],
            ParseOutcome::Failure { errors, .. } => errors,
        }
    }

    pub fn into_session(self) -> ParseSession {
        match self {
            ParseOutcome::Success(session) | ParseOutcome::Failure { session, .. } => session,
        }
    }
}

// ──────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────

pub struct ContextEngine<'r> {
    registry: &'r GrammarRegistry,
    config: EngineConfig,
    budget: ScanBudget,
    hooks: Hooks,
    last: Option<Scan>,
}

impl<'r> ContextEngine<'r> {
    pub fn new(registry: &'r GrammarRegistry, config: EngineConfig) -> Self {
        ContextEngine {
            registry,
            config,
            budget: ScanBudget::unlimited(),
            hooks: Hooks::default(),
            last: None,
        }
    }

    pub fn with_budget(mut self, budget: ScanBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &'r GrammarRegistry {
        self.registry
    }

    pub fn register_predicate(&mut self, name: &str, predicate: impl RulePredicate + 'static) {
        self.hooks
            .predicates
            .insert(name.to_string(), Box::new(predicate));
    }

    pub fn register_executor(&mut self, name: &str, executor: impl RuleExecutor + 'static) {
        self.hooks
            .executors
            .insert(name.to_string(), Box::new(executor));
    }

    /// Parse `input` against `grammar`. Caches from any earlier session are
    /// dropped first.
    pub fn parse_with_context(&mut self, grammar: &dyn Grammar, input: &str) -> ParseOutcome {
        self.last = None;
        let started = Instant::now();
        tracing::info!(grammar = grammar.name(), bytes = input.len(), "parse session started");

        let mut scan = Scan::begin(grammar, self.registry, &self.config);
        let mut errors = scan.take_setup_errors();

        if errors.is_empty() {
            match self.tokenizer_for(grammar) {
                Ok(tokenizer) => {
                    let tokens = tokenizer.tokenize(input);
                    let budget = self.session_budget();
                    if let Err(d) = self.scan_tokens(&mut scan, &tokens, &budget) {
                        errors.push(d);
                    } else if let Err(d) = scan.check_closed() {
                        errors.push(d);
                    }
                }
                Err(d) => errors.push(d),
            }
        }

        let session = scan.snapshot(started.elapsed());
        tracing::info!(
            grammar = grammar.name(),
            contexts = session.contexts.len(),
            errors = errors.len(),
            "parse session finished"
        );
        self.last = Some(scan);
        if errors.is_empty() {
            ParseOutcome::Success(session)
        } else {
            ParseOutcome::Failure { session, errors }
        }
    }

    /// Resolve `name` as seen from `from` in the last parsed session:
    /// the context itself, its ancestors, then the global table.
    pub fn lookup(&mut self, from: ContextId, name: &str) -> Option<SymbolInfo> {
        self.last.as_mut()?.resolve_symbol(from, name).cloned()
    }

    /// Lookup counters for the last session, including post-parse lookups.
    pub fn cache_stats(&self) -> CacheStats {
        self.last.as_ref().map(|s| s.stats).unwrap_or_default()
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn tokenizer_for(&self, grammar: &dyn Grammar) -> Result<Tokenizer, Diagnostic> {
        let keywords = self
            .config
            .function_keywords
            .iter()
            .chain(&self.config.class_keywords)
            .chain(&self.config.block_keywords)
            .chain(&self.config.definition_keywords)
            .cloned();
        Tokenizer::new(grammar.token_splitter(), grammar.token_pattern(), keywords).map_err(|e| {
            Diagnostic::error(codes::CONTEXT_PARSE_ERROR, 0, e.to_string())
                .with_suggestion("fix the grammar's TokenPattern header")
        })
    }

    /// The caller's budget, tightened by `deadline_ms` from the config.
    pub(crate) fn session_budget(&self) -> ScanBudget {
        let mut budget = self.budget.clone();
        if let Some(ms) = self.config.deadline_ms {
            let deadline = Instant::now() + Duration::from_millis(ms);
            budget.deadline = Some(match budget.deadline {
                Some(existing) if existing < deadline => existing,
                _ => deadline,
            });
        }
        budget
    }

    fn scan_tokens(
        &self,
        scan: &mut Scan,
        tokens: &[Token],
        budget: &ScanBudget,
    ) -> Result<(), Diagnostic> {
        for (i, token) in tokens.iter().enumerate() {
            budget.check(token.position.line)?;
            scan.apply_token(&self.hooks, &self.config, token, tokens.get(i + 1))?;
        }
        Ok(())
    }

    pub(crate) fn retain(&mut self, scan: Scan) {
        self.last = Some(scan);
    }

    pub(crate) fn reset(&mut self) {
        self.last = None;
    }
}

// ──────────────────────────────────────────────
// Scan state
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Found {
    Context(ContextId),
    /// Hoisted symbol, owned by the context that defined it.
    Global(ContextId),
}

/// How an identifier token was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IdentifierUse {
    pub name: String,
    pub position: Position,
    pub context: ContextId,
    pub defined: bool,
    /// Context holding the symbol it resolved to, if any.
    pub resolved_in: Option<ContextId>,
}

pub(crate) struct Scan {
    grammar: String,
    primary_language: String,
    contexts: Vec<ParseContext>,
    languages: Vec<String>,
    stack: Vec<ContextId>,
    /// Stack length below which `}` may not pop; one entry per embedded region.
    floors: Vec<usize>,
    globals: BTreeMap<String, SymbolInfo>,
    sharing: SharingStrategy,
    syntax: SyntaxBuilder,
    pending_scope: Option<ScopeKind>,
    pending_definition: Option<SymbolKind>,
    pending_params: Option<Vec<(String, Position)>>,
    warnings: Vec<Diagnostic>,
    setup_errors: Vec<Diagnostic>,
    warned_custom: BTreeSet<String>,
    cache: HashMap<(ContextId, String), Option<Found>>,
    stats: CacheStats,
    metrics: ParseMetrics,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("grammar", &self.grammar)
            .field("contexts", &self.contexts.len())
            .field("stack", &self.stack)
            .finish()
    }
}

impl Scan {
    /// Root context, grammar symbols and rules, and inherited items.
    pub(crate) fn begin(
        grammar: &dyn Grammar,
        registry: &GrammarRegistry,
        config: &EngineConfig,
    ) -> Scan {
        let name = grammar.name().to_string();
        let mut root = ParseContext::root(ScopeKind::Global);
        root.attributes
            .insert(GRAMMAR_ATTRIBUTE.to_string(), name.clone());
        root.attributes
            .insert(LANGUAGE_ATTRIBUTE.to_string(), name.clone());

        for decl in grammar.symbol_declarations() {
            if decl.language.as_deref().is_some_and(|l| l != name) {
                continue;
            }
            let mut symbol = SymbolInfo::new(&decl.name, decl.kind.clone(), root.id, Position::new(decl.line, 0, 0, 0))
                .with_visibility(decl.visibility);
            if let Some(ty) = &decl.value_type {
                symbol = symbol.with_type(ty);
            }
            root.symbols.insert(decl.name.clone(), symbol);
        }
        for rule in grammar.context_rules() {
            let mut rule = rule.clone();
            rule.inherited = false;
            if rule.origin.is_empty() {
                rule.origin = name.clone();
            }
            root.merge_rule(rule);
        }

        let mut warnings = Vec::new();
        let mut setup_errors = Vec::new();
        if config.enable_inheritance && !grammar.base_grammars().is_empty() {
            let inherited = resolve_inheritance(grammar, registry, config.strict_inheritance);
            for rule in inherited.rules {
                root.merge_rule(rule);
            }
            for (origin, decl) in inherited.symbols {
                if root.symbols.contains_key(&decl.name) {
                    continue;
                }
                let mut symbol = SymbolInfo::new(&decl.name, decl.kind.clone(), root.id, Position::new(decl.line, 0, 0, 0))
                    .with_visibility(decl.visibility);
                symbol
                    .attributes
                    .insert("inherited_from".to_string(), origin);
                if let Some(ty) = &decl.value_type {
                    symbol = symbol.with_type(ty);
                }
                root.symbols.insert(decl.name.clone(), symbol);
            }
            for d in inherited.diagnostics {
                if d.severity == Severity::Error {
                    setup_errors.push(d);
                } else {
                    warnings.push(d);
                }
            }
            tracing::debug!(grammar = %name, chain = ?inherited.chain, "inheritance resolved");
        }

        Scan {
            grammar: name.clone(),
            primary_language: name.clone(),
            contexts: vec![root],
            languages: vec![name.clone()],
            stack: vec![ContextId(0)],
            floors: vec![1],
            globals: BTreeMap::new(),
            sharing: grammar.sharing(),
            syntax: SyntaxBuilder::new(&name),
            pending_scope: None,
            pending_definition: None,
            pending_params: None,
            warnings,
            setup_errors,
            warned_custom: BTreeSet::new(),
            cache: HashMap::new(),
            stats: CacheStats::default(),
            metrics: ParseMetrics::default(),
        }
    }

    pub(crate) fn take_setup_errors(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.setup_errors)
    }

    pub(crate) fn current(&self) -> ContextId {
        self.stack.last().copied().unwrap_or(ContextId(0))
    }

    pub(crate) fn current_language(&self) -> &str {
        self.language_of(self.current())
    }

    pub(crate) fn language_of(&self, id: ContextId) -> &str {
        self.languages
            .get(id.0)
            .map(String::as_str)
            .unwrap_or(&self.primary_language)
    }

    pub(crate) fn primary_language(&self) -> &str {
        &self.primary_language
    }

    pub(crate) fn contexts(&self) -> &[ParseContext] {
        &self.contexts
    }

    pub(crate) fn depth(&self) -> usize {
        self.contexts
            .get(self.current().0)
            .map(|c| c.depth)
            .unwrap_or(0)
    }

    pub(crate) fn warn(&mut self, d: Diagnostic) {
        self.warnings.push(d);
    }

    /// Define a symbol directly in a context (used for grammar-declared
    /// symbols of embedded languages).
    pub(crate) fn define_in(&mut self, id: ContextId, symbol: SymbolInfo) {
        if let Some(ctx) = self.contexts.get_mut(id.0) {
            ctx.symbols.insert(symbol.name.clone(), symbol);
            self.cache.clear();
        }
    }

    // ── scopes ──

    fn open_scope(
        &mut self,
        kind: SyntaxKind,
        scope: ScopeKind,
        language: &str,
        position: Position,
        max_depth: usize,
    ) -> Result<ContextId, Diagnostic> {
        let parent_id = self.current();
        let Some(parent) = self.contexts.get(parent_id.0) else {
            return Err(Diagnostic::error(
                codes::CONTEXT_PARSE_ERROR,
                position.line,
                format!("current context {} is missing", parent_id),
            ));
        };
        if parent.depth + 1 > max_depth {
            return Err(Diagnostic::error(
                codes::CONTEXT_DEPTH_EXCEEDED,
                position.line,
                format!("scope nesting exceeds the limit of {}", max_depth),
            )
            .with_column(position.column)
            .with_suggestion("raise engine.max_scope_depth or reduce nesting"));
        }
        let id = ContextId(self.contexts.len());
        let mut child = ParseContext::child_of(parent, id, scope);
        child.position = position;
        child
            .attributes
            .insert(GRAMMAR_ATTRIBUTE.to_string(), self.grammar.clone());
        child
            .attributes
            .insert(LANGUAGE_ATTRIBUTE.to_string(), language.to_string());
        self.contexts.push(child);
        self.languages.push(language.to_string());
        self.stack.push(id);
        self.syntax.open(kind, position, id);
        self.metrics.scopes_opened += 1;
        self.cache.clear();
        Ok(id)
    }

    fn close_scope(&mut self) -> bool {
        let floor = self.floors.last().copied().unwrap_or(1);
        if self.stack.len() > floor {
            self.stack.pop();
            self.syntax.close();
            self.pending_scope = None;
            true
        } else {
            false
        }
    }

    /// Enter an embedded-language region: a child context tagged with
    /// `language`, below which `}` cannot pop.
    pub(crate) fn enter_embedded(
        &mut self,
        language: &str,
        position: Position,
        max_depth: usize,
    ) -> Result<ContextId, Diagnostic> {
        let id = self.open_scope(
            SyntaxKind::Embedded {
                language: language.to_string(),
            },
            ScopeKind::Expression,
            language,
            position,
            max_depth,
        )?;
        self.floors.push(self.stack.len());
        self.pending_scope = None;
        self.pending_definition = None;
        Ok(id)
    }

    /// Leave the innermost embedded region. Returns how many scopes opened
    /// inside it were still unclosed.
    pub(crate) fn leave_embedded(&mut self) -> usize {
        if self.floors.len() <= 1 {
            return 0;
        }
        let Some(floor) = self.floors.pop() else {
            return 0;
        };
        let mut dangling = 0;
        while self.stack.len() > floor {
            self.stack.pop();
            self.syntax.close();
            dangling += 1;
        }
        if self.stack.len() == floor && floor > 1 {
            self.stack.pop();
            self.syntax.close();
        }
        self.pending_scope = None;
        self.pending_definition = None;
        self.cache.clear();
        dangling
    }

    pub(crate) fn push_marker(&mut self, token: &Token) {
        let current = self.current();
        self.syntax.push_leaf(SyntaxNode::leaf(
            token.kind.clone(),
            &token.text,
            token.position,
            current,
        ));
    }

    /// Unclosed scopes at end of input.
    pub(crate) fn check_closed(&self) -> Result<(), Diagnostic> {
        let floor = self.floors.last().copied().unwrap_or(1);
        if self.stack.len() > floor {
            let innermost = self.current();
            let at = self
                .contexts
                .get(innermost.0)
                .map(|c| c.position)
                .unwrap_or_default();
            return Err(Diagnostic::error(
                codes::UNCLOSED_SCOPE,
                at.line,
                format!("{} scope(s) still open at end of input", self.stack.len() - floor),
            )
            .with_column(at.column)
            .with_suggestion("add the missing closing delimiter"));
        }
        Ok(())
    }

    // ── lookup ──

    fn search(&self, from: ContextId, name: &str) -> Option<Found> {
        let origin_language = self.language_of(from);
        let mut current = Some(from);
        while let Some(id) = current {
            let ctx = self.contexts.get(id.0)?;
            if self.sharing == SharingStrategy::Local && self.language_of(id) != origin_language {
                break;
            }
            if ctx.symbols.contains_key(name) {
                return Some(Found::Context(id));
            }
            current = ctx.parent;
        }
        if let Some(symbol) = self.globals.get(name) {
            return Some(Found::Global(symbol.scope));
        }
        if self.sharing == SharingStrategy::Global {
            return self
                .contexts
                .iter()
                .find(|c| c.symbols.contains_key(name))
                .map(|c| Found::Context(c.id));
        }
        None
    }

    fn cached_search(&mut self, from: ContextId, name: &str) -> Option<Found> {
        let key = (from, name.to_string());
        if let Some(found) = self.cache.get(&key) {
            self.stats.hits += 1;
            return *found;
        }
        self.stats.misses += 1;
        let found = self.search(from, name);
        self.cache.insert(key, found);
        found
    }

    pub(crate) fn resolve_symbol(&mut self, from: ContextId, name: &str) -> Option<&SymbolInfo> {
        match self.cached_search(from, name)? {
            Found::Context(id) => self.contexts.get(id.0)?.symbols.get(name),
            Found::Global(id) => self
                .contexts
                .get(id.0)
                .and_then(|c| c.symbols.get(name))
                .or_else(|| self.globals.get(name)),
        }
    }

    fn symbol_mut(&mut self, from: ContextId, name: &str) -> Option<&mut SymbolInfo> {
        match self.cached_search(from, name)? {
            Found::Context(id) => self.contexts.get_mut(id.0)?.symbols.get_mut(name),
            Found::Global(id) => {
                let Scan {
                    contexts, globals, ..
                } = self;
                match contexts.get_mut(id.0).and_then(|c| c.symbols.get_mut(name)) {
                    Some(symbol) => Some(symbol),
                    None => globals.get_mut(name),
                }
            }
        }
    }

    fn define(&mut self, name: &str, kind: SymbolKind, position: Position) {
        let current = self.current();
        let hoisted = matches!(kind, SymbolKind::Function | SymbolKind::Class);
        let visibility = if hoisted {
            Visibility::Public
        } else {
            Visibility::Local
        };
        let symbol = SymbolInfo::new(name, kind, current, position).with_visibility(visibility);
        if hoisted {
            self.globals
                .entry(name.to_string())
                .or_insert_with(|| symbol.clone());
        }
        if let Some(ctx) = self.contexts.get_mut(current.0) {
            ctx.symbols.entry(name.to_string()).or_insert(symbol);
        }
        self.cache.clear();
        tracing::debug!(symbol = name, context = %current, "symbol defined");
    }

    // ── per-token work ──

    /// Process one token in the current context. `Err` halts the scan.
    pub(crate) fn apply_token(
        &mut self,
        hooks: &Hooks,
        config: &EngineConfig,
        token: &Token,
        next: Option<&Token>,
    ) -> Result<Option<IdentifierUse>, Diagnostic> {
        self.metrics.tokens += 1;
        let current = self.current();
        if let Some(ctx) = self.contexts.get_mut(current.0) {
            ctx.position = token.position;
        }

        self.run_rules(hooks, token);

        let text = token.text.as_str();
        if text == config.block_open {
            let scope = self.pending_scope.take().unwrap_or(ScopeKind::Block);
            let language = self.current_language().to_string();
            let id = self.open_scope(
                SyntaxKind::Scope(scope.clone()),
                scope,
                &language,
                token.position,
                config.max_scope_depth,
            )?;
            if let Some(params) = self.pending_params.take() {
                for (name, at) in params {
                    let symbol = SymbolInfo::new(&name, SymbolKind::Parameter, id, at);
                    if let Some(ctx) = self.contexts.get_mut(id.0) {
                        ctx.symbols.entry(name).or_insert(symbol);
                    }
                }
            }
            self.push_marker(token);
            return Ok(None);
        }
        if text == config.block_close {
            self.push_marker(token);
            if !self.close_scope() {
                return Err(Diagnostic::error(
                    codes::CONTEXT_PARSE_ERROR,
                    token.position.line,
                    format!("'{}' does not close any open scope", text),
                )
                .with_column(token.position.column)
                .with_suggestion("remove the extra delimiter or open a scope before it"));
            }
            return Ok(None);
        }

        self.push_marker(token);
        match token.kind {
            TokenKind::Keyword => {
                if config.function_keywords.iter().any(|k| k == text) {
                    self.pending_scope = Some(ScopeKind::Function);
                    self.pending_definition = Some(SymbolKind::Function);
                } else if config.class_keywords.iter().any(|k| k == text) {
                    self.pending_scope = Some(ScopeKind::Class);
                    self.pending_definition = Some(SymbolKind::Class);
                } else if config.block_keywords.iter().any(|k| k == text) {
                    self.pending_scope = Some(ScopeKind::Block);
                } else if config.definition_keywords.iter().any(|k| k == text) {
                    self.pending_definition = Some(if text == "const" {
                        SymbolKind::Constant
                    } else {
                        SymbolKind::Variable
                    });
                }
                Ok(None)
            }
            TokenKind::Identifier => Ok(Some(self.identifier(token, next))),
            TokenKind::Operator => {
                match text {
                    "(" if self.pending_scope == Some(ScopeKind::Function) => {
                        self.pending_params = Some(Vec::new());
                    }
                    // Parameters stay pending until the body opens.
                    ")" if self.pending_params.is_some() => self.pending_definition = None,
                    ";" => {
                        self.pending_scope = None;
                        self.pending_params = None;
                        self.pending_definition = None;
                    }
                    _ => {}
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn identifier(&mut self, token: &Token, next: Option<&Token>) -> IdentifierUse {
        let current = self.current();
        let name = token.text.clone();
        let mut usage = IdentifierUse {
            name: name.clone(),
            position: token.position,
            context: current,
            defined: false,
            resolved_in: None,
        };

        if let Some(kind) = self.pending_definition.take() {
            self.define(&name, kind, token.position);
            usage.defined = true;
            usage.resolved_in = Some(current);
            return usage;
        }
        if let Some(params) = self.pending_params.as_mut() {
            params.push((name, token.position));
            usage.defined = true;
            return usage;
        }

        let assigned = next.is_some_and(|n| n.text == "=");
        let found = self.cached_search(current, &name);
        match found {
            None if assigned => {
                self.define(&name, SymbolKind::Variable, token.position);
                usage.defined = true;
                usage.resolved_in = Some(current);
            }
            Some(found) => {
                usage.resolved_in = Some(match found {
                    Found::Context(id) | Found::Global(id) => id,
                });
                if let Some(symbol) = self.symbol_mut(current, &name) {
                    symbol.record_reference(token.position);
                }
            }
            None => {}
        }
        usage
    }

    fn active_rules(&self) -> Vec<ContextRule> {
        let mut seen = BTreeSet::new();
        let mut rules = Vec::new();
        let mut current = Some(self.current());
        while let Some(id) = current {
            let Some(ctx) = self.contexts.get(id.0) else {
                break;
            };
            for rule in ctx.rules.values() {
                if seen.insert(rule.name.clone()) {
                    rules.push(rule.clone());
                }
            }
            current = ctx.parent;
        }
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        rules
    }

    fn run_rules(&mut self, hooks: &Hooks, token: &Token) {
        let rules = self.active_rules();
        if rules.is_empty() {
            return;
        }
        let mut matched = BTreeSet::new();
        for rule in &rules {
            if self.condition_holds(hooks, &rule.condition, token, &matched) {
                matched.insert(rule.name.clone());
                self.metrics.context_switches += 1;
                tracing::debug!(rule = %rule.name, token = %token.text, "context rule fired");
                let mut chain = vec![rule.name.clone()];
                self.run_action(hooks, &rules, &rule.action, token, &mut chain, &mut matched);
            }
        }
    }

    fn condition_holds(
        &mut self,
        hooks: &Hooks,
        condition: &RuleCondition,
        token: &Token,
        matched: &BTreeSet<String>,
    ) -> bool {
        let current = self.current();
        match condition {
            RuleCondition::SymbolExists(None) => {
                token.is_identifier() && self.cached_search(current, &token.text).is_some()
            }
            RuleCondition::SymbolExists(Some(name)) => self.cached_search(current, name).is_some(),
            RuleCondition::ScopeType(kind) => self
                .contexts
                .get(current.0)
                .is_some_and(|c| &c.scope == kind),
            RuleCondition::RuleMatched(name) => matched.contains(name),
            RuleCondition::TokenIs(text) => &token.text == text,
            RuleCondition::Custom(name) => match hooks.predicates.get(name) {
                Some(predicate) => self
                    .contexts
                    .get(current.0)
                    .is_some_and(|c| predicate.evaluate(c, token)),
                None => {
                    self.warn_unknown_custom("predicate", name, token.position);
                    false
                }
            },
        }
    }

    fn run_action(
        &mut self,
        hooks: &Hooks,
        rules: &[ContextRule],
        action: &RuleAction,
        token: &Token,
        chain: &mut Vec<String>,
        matched: &mut BTreeSet<String>,
    ) {
        let current = self.current();
        match action {
            RuleAction::AddSymbol(kind) => {
                if token.is_identifier() {
                    self.define(&token.text, kind.clone(), token.position);
                } else {
                    self.pending_definition = Some(kind.clone());
                }
            }
            RuleAction::ModifySymbol { key, value } => {
                if let Some(symbol) = self.symbol_mut(current, &token.text) {
                    symbol.attributes.insert(key.clone(), value.clone());
                }
            }
            RuleAction::ChangeScope(kind) => self.pending_scope = Some(kind.clone()),
            RuleAction::ApplyRule(target) => {
                if chain.len() >= MAX_RULE_CHAIN || chain.contains(target) {
                    self.warnings.push(Diagnostic::warning(
                        codes::RULE_EXECUTION_FAILED,
                        token.position.line,
                        format!("rule chain {} -> {} stopped", chain.join(" -> "), target),
                    ));
                    return;
                }
                let Some(next) = rules.iter().find(|r| &r.name == target) else {
                    self.warnings.push(Diagnostic::warning(
                        codes::RULE_EXECUTION_FAILED,
                        token.position.line,
                        format!("apply-rule names unknown rule '{}'", target),
                    ));
                    return;
                };
                matched.insert(next.name.clone());
                chain.push(next.name.clone());
                self.run_action(hooks, rules, &next.action, token, chain, matched);
                chain.pop();
            }
            RuleAction::Custom(name) => match hooks.executors.get(name) {
                Some(executor) => {
                    let result = match self.contexts.get_mut(current.0) {
                        Some(ctx) => executor.execute(ctx, token),
                        None => Ok(()),
                    };
                    self.cache.clear();
                    if let Err(message) = result {
                        self.warnings.push(Diagnostic::warning(
                            codes::RULE_EXECUTION_FAILED,
                            token.position.line,
                            format!("executor '{}' failed: {}", name, message),
                        ));
                    }
                }
                None => self.warn_unknown_custom("executor", name, token.position),
            },
        }
    }

    fn warn_unknown_custom(&mut self, what: &str, name: &str, at: Position) {
        if self.warned_custom.insert(format!("{}:{}", what, name)) {
            tracing::warn!(kind = what, name, "custom rule body not registered");
            self.warnings.push(
                Diagnostic::warning(
                    codes::UNKNOWN_CUSTOM_RULE,
                    at.line,
                    format!("no custom {} named '{}' is registered", what, name),
                )
                .with_suggestion(format!("register it with ContextEngine::register_{}", what)),
            );
        }
    }

    /// Hoisted symbols as their defining contexts currently hold them.
    fn hoisted_symbols(&self) -> BTreeMap<String, SymbolInfo> {
        self.globals
            .iter()
            .map(|(name, global)| {
                let held = self
                    .contexts
                    .get(global.scope.0)
                    .and_then(|c| c.symbols.get(name))
                    .filter(|s| s.defined_at == global.defined_at)
                    .unwrap_or(global);
                (name.clone(), held.clone())
            })
            .collect()
    }

    /// Copy of the session state. The syntax tree is closed off; the scan
    /// keeps its contexts for post-parse lookups.
    pub(crate) fn snapshot(&mut self, elapsed: Duration) -> ParseSession {
        let syntax = std::mem::replace(&mut self.syntax, SyntaxBuilder::new(&self.grammar));
        self.metrics.cache_hits = self.stats.hits;
        self.metrics.cache_misses = self.stats.misses;
        self.metrics.elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        ParseSession {
            grammar: self.grammar.clone(),
            ast: syntax.finish(),
            contexts: self.contexts.clone(),
            symbols: self.hoisted_symbols(),
            warnings: self.warnings.clone(),
            metrics: self.metrics.clone(),
            final_depth: self.depth(),
        }
    }
}
