//! Embedded-language parsing.
//!
//! The manager drives the engine's [`Scan`] over an input in which regions
//! of other languages are bracketed by switch triggers (`@CONTEXT[Expr]` ...
//! `@ENDCONTEXT` by default, or patterns declared with `@SWITCH`). Each
//! region becomes a child context tagged with its language. Identifiers used
//! inside a region are recorded as provisional cross-language references and
//! resolved once the whole input has been consumed.

use crate::cancel::ScanBudget;
use crate::context::{ContextId, ParseContext, Position, SymbolInfo};
use crate::engine::{ContextEngine, IdentifierUse, ParseMetrics, Scan};
use crate::error::{codes, Diagnostic, Severity};
use crate::grammar::{Grammar, SwitchPattern};
use crate::symbol_table::{LevelId, SymbolHierarchy, SymbolTableLevel};
use crate::syntax::SyntaxNode;
use crate::tokenizer::{Cursor, Token, TokenKind, Tokenizer};
use crate::validation::{ValidationResult, ValidationRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Deref;
use std::time::Instant;
use time::OffsetDateTime;

// ──────────────────────────────────────────────
// Data model
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceOrigin {
    /// An identifier seen inside an embedded region.
    Token,
    /// A grammar `@REFERENCE` directive.
    Declared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLanguageReference {
    pub id: ReferenceId,
    pub source_language: String,
    pub target_language: String,
    pub source_symbol: String,
    pub target_symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub position: Position,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_context: Option<ContextId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    pub origin: ReferenceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitchFrame {
    pub source_language: String,
    pub target_language: String,
    pub position: Position,
    pub trigger: String,
    pub end_trigger: String,
    /// 1 for a switch out of the primary language.
    pub nesting_level: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub switched_at: OffsetDateTime,
    /// Context opened by this switch.
    pub context: ContextId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationQueueItem {
    pub rule: ValidationRule,
    pub reference: ReferenceId,
    /// From the rule's severity: error 3, warning 2, info 1.
    pub priority: u8,
    pub scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ValidationResult>,
}

/// A parse context plus its language bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedLanguageContext {
    pub context: ParseContext,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_language: Option<String>,
    /// Embedded language name → grammar that parses it.
    pub embedded_grammars: BTreeMap<String, String>,
    /// Switch frames enclosing this context, outermost first.
    pub switch_stack: Vec<ContextSwitchFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_level: Option<LevelId>,
    /// References originating in this context.
    pub references: Vec<ReferenceId>,
    pub validation_queue: Vec<ValidationQueueItem>,
}

impl Deref for EmbeddedLanguageContext {
    type Target = ParseContext;

    fn deref(&self) -> &ParseContext {
        &self.context
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedMetrics {
    pub parse: ParseMetrics,
    pub language_switches: usize,
    pub max_switch_nesting: usize,
    pub references: usize,
    pub resolved_references: usize,
    pub scheduled_validations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSession {
    pub grammar: String,
    pub ast: SyntaxNode,
    pub contexts: Vec<EmbeddedLanguageContext>,
    pub cross_language_references: Vec<CrossLanguageReference>,
    /// Filled by [`EmbeddedOutcome::record_results`].
    pub validation_results: Vec<ValidationResult>,
    /// Every switch in input order.
    pub context_switches: Vec<ContextSwitchFrame>,
    /// Hoisted (global) symbols.
    pub symbols: BTreeMap<String, SymbolInfo>,
    pub symbol_levels: Vec<SymbolTableLevel>,
    pub warnings: Vec<Diagnostic>,
    pub metrics: EmbeddedMetrics,
}

impl EmbeddedSession {
    pub fn context(&self, id: ContextId) -> Option<&EmbeddedLanguageContext> {
        self.contexts.get(id.0)
    }

    pub fn reference(&self, id: ReferenceId) -> Option<&CrossLanguageReference> {
        self.cross_language_references.get(id.0)
    }

    pub fn languages(&self) -> BTreeSet<&str> {
        self.contexts.iter().map(|c| c.language.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum EmbeddedOutcome {
    Success(EmbeddedSession),
    Failure {
        session: EmbeddedSession,
        errors: Vec<Diagnostic>,
    },
}

impl EmbeddedOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EmbeddedOutcome::Success(_))
    }

    pub fn session(&self) -> &EmbeddedSession {
        match self {
            EmbeddedOutcome::Success(session) | EmbeddedOutcome::Failure { session, .. } => session,
        }
    }

    pub fn session_mut(&mut self) -> &mut EmbeddedSession {
        match self {
            EmbeddedOutcome::Success(session) | EmbeddedOutcome::Failure { session, .. } => session,
        }
    }

    pub fn errors(&self) -> &[Diagnostic] {
        match self {
            EmbeddedOutcome::Success(_) => &[],
            EmbeddedOutcome::Failure { errors, .. } => errors,
        }
    }

    pub fn into_session(self) -> EmbeddedSession {
        match self {
            EmbeddedOutcome::Success(session) | EmbeddedOutcome::Failure { session, .. } => session,
        }
    }

    /// Store validator results on the matching queue items (same rule name
    /// and reference) and on the references themselves. A blocking result
    /// is never replaced by a passing one.
    pub fn record_results(&mut self, results: &[ValidationResult]) {
        let session = self.session_mut();
        for result in results {
            let Some(reference_id) = result.reference else {
                continue;
            };
            for ctx in &mut session.contexts {
                for item in &mut ctx.validation_queue {
                    if item.reference == reference_id && item.rule.name == result.rule {
                        item.result = Some(result.clone());
                    }
                }
            }
            if let Some(reference) = session.cross_language_references.get_mut(reference_id.0) {
                let keep_existing = reference
                    .validation
                    .as_ref()
                    .is_some_and(|v| v.is_blocking() && !result.is_blocking());
                if !keep_existing {
                    reference.validation = Some(result.clone());
                }
            }
        }
        session.validation_results.extend(results.iter().cloned());
    }
}

// ──────────────────────────────────────────────
// Manager
// ──────────────────────────────────────────────

pub struct EmbeddedLanguageManager<'r> {
    engine: ContextEngine<'r>,
    grammar: &'r dyn Grammar,
}

impl<'r> EmbeddedLanguageManager<'r> {
    pub fn new(engine: ContextEngine<'r>, grammar: &'r dyn Grammar) -> Self {
        EmbeddedLanguageManager { engine, grammar }
    }

    pub fn engine(&self) -> &ContextEngine<'r> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ContextEngine<'r> {
        &mut self.engine
    }

    pub fn grammar(&self) -> &'r dyn Grammar {
        self.grammar
    }

    pub fn parse_with_embedded_languages(&mut self, input: &str) -> EmbeddedOutcome {
        self.engine.reset();
        let started = Instant::now();
        tracing::info!(
            grammar = self.grammar.name(),
            embedded = ?self.grammar.embedded_languages(),
            "embedded parse session started"
        );

        let mut run = match Run::start(&self.engine, self.grammar) {
            Ok(run) => run,
            Err(errors) => {
                let mut scan = Scan::begin(self.grammar, self.engine.registry(), self.engine.config());
                let parse = scan.snapshot(started.elapsed());
                let session = EmbeddedSession {
                    grammar: parse.grammar,
                    ast: parse.ast,
                    contexts: Vec::new(),
                    cross_language_references: Vec::new(),
                    validation_results: Vec::new(),
                    context_switches: Vec::new(),
                    symbols: parse.symbols,
                    symbol_levels: Vec::new(),
                    warnings: parse.warnings,
                    metrics: EmbeddedMetrics::default(),
                };
                return EmbeddedOutcome::Failure { session, errors };
            }
        };

        let halted = run.scan_input(input).err();
        let fatal = halted.is_some();
        if let Some(d) = halted {
            run.errors.push(d);
        }
        run.close_frames(fatal);
        if !fatal {
            if let Err(d) = run.scan.check_closed() {
                run.errors.push(d);
            }
        }

        let (session, errors, scan) = run.finish(started);
        tracing::info!(
            grammar = %session.grammar,
            contexts = session.contexts.len(),
            switches = session.context_switches.len(),
            references = session.cross_language_references.len(),
            errors = errors.len(),
            "embedded parse session finished"
        );
        self.engine.retain(scan);
        if errors.is_empty() {
            EmbeddedOutcome::Success(session)
        } else {
            EmbeddedOutcome::Failure { session, errors }
        }
    }
}

// ──────────────────────────────────────────────
// One session
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Trigger {
    Switch(SwitchPattern),
    End(String),
}

impl Trigger {
    fn text(&self) -> &str {
        match self {
            Trigger::Switch(p) => &p.trigger,
            Trigger::End(t) => t,
        }
    }
}

struct PendingReference {
    reference: CrossLanguageReference,
    context: ContextId,
    /// The name resolved to a symbol of the reference's own language.
    local_hit: bool,
}

struct Run<'a, 'r> {
    engine: &'a ContextEngine<'r>,
    grammar: &'a dyn Grammar,
    scan: Scan,
    budget: ScanBudget,
    patterns: Vec<SwitchPattern>,
    end_triggers: BTreeSet<String>,
    primary_tokenizer: Tokenizer,
    tokenizers: HashMap<String, Tokenizer>,
    embedded_grammars: BTreeMap<String, BTreeMap<String, String>>,
    declared: BTreeMap<String, Vec<SymbolInfo>>,
    seeded: BTreeSet<String>,
    frames: Vec<ContextSwitchFrame>,
    history: Vec<ContextSwitchFrame>,
    pending: Vec<PendingReference>,
    errors: Vec<Diagnostic>,
}

fn declared_symbol(decl: &crate::grammar::SymbolDecl) -> SymbolInfo {
    let mut symbol = SymbolInfo::new(
        &decl.name,
        decl.kind.clone(),
        ContextId(0),
        Position::new(decl.line, 0, 0, 0),
    )
    .with_visibility(decl.visibility);
    if let Some(ty) = &decl.value_type {
        symbol = symbol.with_type(ty);
    }
    symbol
}

impl<'a, 'r> Run<'a, 'r> {
    fn start(engine: &'a ContextEngine<'r>, grammar: &'a dyn Grammar) -> Result<Self, Vec<Diagnostic>> {
        let registry = engine.registry();
        let mut scan = Scan::begin(grammar, registry, engine.config());
        let setup = scan.take_setup_errors();
        if !setup.is_empty() {
            return Err(setup);
        }
        let primary_tokenizer = engine.tokenizer_for(grammar).map_err(|d| vec![d])?;
        let primary = grammar.name().to_string();

        let mut patterns = grammar.switch_patterns();
        let mut tokenizers = HashMap::new();
        let mut declared: BTreeMap<String, Vec<SymbolInfo>> = BTreeMap::new();
        let mut embedded_grammars = BTreeMap::new();

        let reachable = |g: &dyn Grammar| -> BTreeMap<String, String> {
            g.embedded_languages()
                .iter()
                .map(|lang| {
                    let name = registry
                        .get(lang)
                        .map(|eg| eg.name.clone())
                        .unwrap_or_else(|| lang.clone());
                    (lang.clone(), name)
                })
                .collect()
        };
        embedded_grammars.insert(primary.clone(), reachable(grammar));

        for decl in grammar.symbol_declarations() {
            if let Some(lang) = decl.language.as_ref().filter(|l| **l != primary) {
                declared
                    .entry(lang.clone())
                    .or_default()
                    .push(declared_symbol(decl));
            }
        }

        for lang in grammar.embedded_languages() {
            let Some(embedded) = registry.get(lang) else {
                scan.warn(Diagnostic::new(
                    codes::EMBEDDED_GRAMMAR_MISSING,
                    Severity::Info,
                    0,
                    format!(
                        "no grammar registered for embedded language '{}'; using the {} tokenizer",
                        lang, primary
                    ),
                ));
                continue;
            };
            tokenizers.insert(
                lang.clone(),
                engine.tokenizer_for(embedded).map_err(|d| vec![d])?,
            );
            embedded_grammars.insert(lang.clone(), reachable(embedded));
            for decl in embedded.symbol_declarations() {
                if decl.language.as_ref().map_or(true, |l| l == lang) {
                    declared
                        .entry(lang.clone())
                        .or_default()
                        .push(declared_symbol(decl));
                }
            }
            for p in embedded.switch_patterns() {
                if !patterns.iter().any(|q| q.trigger == p.trigger) {
                    patterns.push(p);
                }
            }
        }
        patterns.retain(|p| !p.trigger.is_empty() && !p.end_trigger.is_empty());
        let end_triggers = patterns.iter().map(|p| p.end_trigger.clone()).collect();

        Ok(Run {
            engine,
            grammar,
            scan,
            budget: engine.session_budget(),
            patterns,
            end_triggers,
            primary_tokenizer,
            tokenizers,
            embedded_grammars,
            declared,
            seeded: BTreeSet::new(),
            frames: Vec::new(),
            history: Vec::new(),
            pending: Vec::new(),
            errors: Vec::new(),
        })
    }

    /// Earliest trigger in `rest`. Ends of the innermost frame win ties
    /// with switches; otherwise the longer trigger wins. With no frame open,
    /// text that is also a start trigger always opens a region.
    fn next_trigger(&self, rest: &str) -> Option<(usize, Trigger)> {
        let mut best: Option<(usize, usize, Trigger)> = None;
        let mut consider = |at: usize, trigger: Trigger| {
            let len = trigger.text().len();
            let better = match &best {
                None => true,
                Some((b_at, b_len, _)) => at < *b_at || (at == *b_at && len > *b_len),
            };
            if better {
                best = Some((at, len, trigger));
            }
        };

        match self.frames.last() {
            Some(frame) => {
                if let Some(at) = rest.find(&frame.end_trigger) {
                    consider(at, Trigger::End(frame.end_trigger.clone()));
                }
            }
            None => {
                for end in &self.end_triggers {
                    if self.patterns.iter().any(|p| p.trigger == *end) {
                        continue;
                    }
                    if let Some(at) = rest.find(end.as_str()) {
                        consider(at, Trigger::End(end.clone()));
                    }
                }
            }
        }
        for pattern in &self.patterns {
            if let Some(at) = rest.find(&pattern.trigger) {
                consider(at, Trigger::Switch(pattern.clone()));
            }
        }
        best.map(|(at, _, trigger)| (at, trigger))
    }

    fn scan_input(&mut self, input: &str) -> Result<(), Diagnostic> {
        let mut cursor = Cursor::default();
        let mut offset = 0usize;
        loop {
            let rest = &input[offset..];
            let hit = self.next_trigger(rest);
            let segment_end = hit.as_ref().map_or(rest.len(), |(at, _)| *at);
            let segment = &rest[..segment_end];
            self.scan_segment(segment, cursor)?;
            cursor.advance_over(segment);

            let Some((_, trigger)) = hit else {
                return Ok(());
            };
            self.budget.check(cursor.line)?;
            let text = trigger.text().to_string();
            let position = Position::new(cursor.line, cursor.column, cursor.offset, text.len());
            match trigger {
                Trigger::Switch(pattern) => self.switch_in(&pattern, position)?,
                Trigger::End(end) => self.switch_out(&end, position),
            }
            cursor.advance_over(&text);
            offset += segment_end + text.len();
        }
    }

    fn scan_segment(&mut self, text: &str, start: Cursor) -> Result<(), Diagnostic> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let tokens = self
            .tokenizers
            .get(self.scan.current_language())
            .unwrap_or(&self.primary_tokenizer)
            .tokenize_segment(text, start);
        for (i, token) in tokens.iter().enumerate() {
            self.budget.check(token.position.line)?;
            let usage = self.scan.apply_token(
                self.engine.hooks(),
                self.engine.config(),
                token,
                tokens.get(i + 1),
            )?;
            if let Some(usage) = usage {
                self.observe(usage);
            }
        }
        Ok(())
    }

    fn observe(&mut self, usage: IdentifierUse) {
        if usage.defined {
            return;
        }
        let language = self.scan.language_of(usage.context).to_string();
        let Some(frame) = self.frames.last() else {
            return;
        };
        let local_hit = usage
            .resolved_in
            .is_some_and(|id| self.scan.language_of(id) == language);
        self.pending.push(PendingReference {
            reference: CrossLanguageReference {
                id: ReferenceId(0),
                source_language: language,
                target_language: frame.source_language.clone(),
                source_symbol: usage.name.clone(),
                target_symbol: usage.name,
                declared_type: None,
                position: usage.position,
                resolved: false,
                resolved_context: None,
                validation: None,
                origin: ReferenceOrigin::Token,
            },
            context: usage.context,
            local_hit,
        });
    }

    fn switch_in(&mut self, pattern: &SwitchPattern, position: Position) -> Result<(), Diagnostic> {
        let config = self.engine.config();
        if self.frames.len() >= config.max_switch_depth {
            return Err(Diagnostic::error(
                codes::SWITCH_DEPTH_EXCEEDED,
                position.line,
                format!(
                    "embedded-language nesting exceeds the limit of {}",
                    config.max_switch_depth
                ),
            )
            .with_column(position.column)
            .with_suggestion("raise engine.max_switch_depth or close regions sooner"));
        }

        let source_language = self.scan.current_language().to_string();
        self.scan.push_marker(&Token {
            kind: TokenKind::ContextSwitch {
                language: pattern.language.clone(),
                trigger: pattern.trigger.clone(),
                end_trigger: pattern.end_trigger.clone(),
            },
            text: pattern.trigger.clone(),
            position,
        });
        let context = self
            .scan
            .enter_embedded(&pattern.language, position, config.max_scope_depth)?;

        if self.seeded.insert(pattern.language.clone()) {
            for symbol in self.declared.get(&pattern.language).cloned().unwrap_or_default() {
                let mut symbol = symbol;
                symbol.scope = context;
                self.scan.define_in(context, symbol);
            }
        }

        let frame = ContextSwitchFrame {
            source_language,
            target_language: pattern.language.clone(),
            position,
            trigger: pattern.trigger.clone(),
            end_trigger: pattern.end_trigger.clone(),
            nesting_level: self.frames.len() + 1,
            switched_at: OffsetDateTime::now_utc(),
            context,
        };
        tracing::debug!(
            from = %frame.source_language,
            to = %frame.target_language,
            level = frame.nesting_level,
            at = %position,
            "context switch"
        );
        self.frames.push(frame.clone());
        self.history.push(frame);
        Ok(())
    }

    fn switch_out(&mut self, trigger: &str, position: Position) {
        let marker = Token {
            kind: TokenKind::ContextEnd {
                trigger: trigger.to_string(),
            },
            text: trigger.to_string(),
            position,
        };
        match self.frames.pop() {
            Some(frame) => {
                let dangling = self.scan.leave_embedded();
                if dangling > 0 {
                    self.scan.warn(
                        Diagnostic::warning(
                            codes::UNCLOSED_SCOPE,
                            position.line,
                            format!(
                                "{} scope(s) inside the {} region were still open at '{}'",
                                dangling, frame.target_language, trigger
                            ),
                        )
                        .with_column(position.column),
                    );
                }
                self.scan.push_marker(&marker);
            }
            None => {
                self.scan.push_marker(&marker);
                self.errors.push(
                    Diagnostic::error(
                        codes::UNEXPECTED_CONTEXT_END,
                        position.line,
                        format!("'{}' does not close any embedded region", trigger),
                    )
                    .with_column(position.column)
                    .with_suggestion("remove it or add the matching switch trigger"),
                );
            }
        }
    }

    /// Report and unwind frames still open at end of input. After a fatal
    /// error the frames are unwound silently.
    fn close_frames(&mut self, fatal: bool) {
        while let Some(frame) = self.frames.pop() {
            if !fatal {
                self.errors.push(
                    Diagnostic::error(
                        codes::UNTERMINATED_CONTEXT,
                        frame.position.line,
                        format!(
                            "{} region opened by '{}' is never closed",
                            frame.target_language, frame.trigger
                        ),
                    )
                    .with_column(frame.position.column)
                    .with_suggestion(format!("add '{}'", frame.end_trigger)),
                );
            }
            self.scan.leave_embedded();
        }
    }

    fn is_within(&self, ancestor: ContextId, id: ContextId) -> bool {
        let contexts = self.scan.contexts();
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = contexts.get(c.0).and_then(|ctx| ctx.parent);
        }
        false
    }

    fn finish(mut self, started: Instant) -> (EmbeddedSession, Vec<Diagnostic>, Scan) {
        let resolution_started = Instant::now();
        let primary = self.scan.primary_language().to_string();

        // Symbol levels: root for the primary language, one child per
        // embedded language.
        let mut hierarchy = SymbolHierarchy::new(&primary, self.grammar.sharing());
        let root = hierarchy.root();
        for lang in self.grammar.embedded_languages() {
            hierarchy.add_level(lang, root);
        }
        let define_first = |hierarchy: &mut SymbolHierarchy, level: LevelId, symbol: &SymbolInfo| {
            let present = hierarchy
                .level(level)
                .is_some_and(|l| l.symbols.contains_key(&symbol.name));
            if !present {
                hierarchy.define(level, symbol.clone());
            }
        };
        for ctx in self.scan.contexts() {
            let lang = self.scan.language_of(ctx.id);
            let level = if lang == primary {
                root
            } else {
                hierarchy.add_level(lang, root)
            };
            for symbol in ctx.symbols.values() {
                define_first(&mut hierarchy, level, symbol);
            }
        }
        // Declarations for languages that never appeared in the input.
        for (lang, symbols) in &self.declared {
            let level = hierarchy.add_level(lang, root);
            for symbol in symbols {
                define_first(&mut hierarchy, level, symbol);
            }
        }

        // Declared references originate in the root context.
        for decl in self.grammar.reference_declarations() {
            self.pending.push(PendingReference {
                reference: CrossLanguageReference {
                    id: ReferenceId(0),
                    source_language: decl.source_language.clone().unwrap_or_else(|| primary.clone()),
                    target_language: decl.target_language.clone(),
                    source_symbol: decl.target_symbol.clone(),
                    target_symbol: decl.target_symbol.clone(),
                    declared_type: decl.declared_type.clone(),
                    position: Position::new(decl.line, 0, 0, 0),
                    resolved: false,
                    resolved_context: None,
                    validation: None,
                    origin: ReferenceOrigin::Declared,
                },
                context: ContextId(0),
                local_hit: false,
            });
        }

        // Resolution: search the target language's level.
        let rules = self.grammar.validation_rules();
        let mut references = Vec::new();
        let mut queues: BTreeMap<ContextId, Vec<ValidationQueueItem>> = BTreeMap::new();
        let mut owners: BTreeMap<ContextId, Vec<ReferenceId>> = BTreeMap::new();
        for pending in std::mem::take(&mut self.pending) {
            let mut reference = pending.reference;
            let target = hierarchy
                .level_for(&reference.target_language)
                .and_then(|l| hierarchy.level(l))
                .and_then(|l| l.symbols.get(&reference.target_symbol))
                .cloned();
            match &target {
                Some(symbol) => {
                    reference.resolved = true;
                    let in_target_language =
                        self.scan.language_of(symbol.scope) == reference.target_language;
                    reference.resolved_context = in_target_language.then_some(symbol.scope);
                }
                None if pending.local_hit => continue,
                None => {}
            }
            reference.id = ReferenceId(references.len());

            if let Some(symbol) = &target {
                let queue = queues.entry(pending.context).or_default();
                for rule in rules {
                    if rule.applies_to(&reference, symbol.declared_type()) {
                        queue.push(ValidationQueueItem {
                            rule: rule.clone(),
                            reference: reference.id,
                            priority: rule.severity.priority(),
                            scheduled: true,
                            result: None,
                        });
                    }
                }
            } else {
                tracing::debug!(
                    symbol = %reference.target_symbol,
                    language = %reference.target_language,
                    "reference left unresolved"
                );
            }
            owners.entry(pending.context).or_default().push(reference.id);
            references.push(reference);
        }
        for queue in queues.values_mut() {
            queue.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        let contexts: Vec<EmbeddedLanguageContext> = self
            .scan
            .contexts()
            .iter()
            .map(|ctx| {
                let language = self.scan.language_of(ctx.id).to_string();
                EmbeddedLanguageContext {
                    parent_language: ctx.parent.map(|p| self.scan.language_of(p).to_string()),
                    embedded_grammars: self
                        .embedded_grammars
                        .get(&language)
                        .cloned()
                        .unwrap_or_default(),
                    switch_stack: self
                        .history
                        .iter()
                        .filter(|f| self.is_within(f.context, ctx.id))
                        .cloned()
                        .collect(),
                    symbol_level: hierarchy.level_for(&language),
                    references: owners.remove(&ctx.id).unwrap_or_default(),
                    validation_queue: queues.remove(&ctx.id).unwrap_or_default(),
                    context: ctx.clone(),
                    language,
                }
            })
            .collect();

        let parse = self.scan.snapshot(started.elapsed());
        let metrics = EmbeddedMetrics {
            parse: parse.metrics,
            language_switches: self.history.len(),
            max_switch_nesting: self
                .history
                .iter()
                .map(|f| f.nesting_level)
                .max()
                .unwrap_or(0),
            references: references.len(),
            resolved_references: references.iter().filter(|r| r.resolved).count(),
            scheduled_validations: contexts.iter().map(|c| c.validation_queue.len()).sum(),
        };
        tracing::debug!(
            elapsed_us = resolution_started.elapsed().as_micros() as u64,
            resolved = metrics.resolved_references,
            "reference resolution finished"
        );

        let session = EmbeddedSession {
            grammar: parse.grammar,
            ast: parse.ast,
            contexts,
            cross_language_references: references,
            validation_results: Vec::new(),
            context_switches: self.history,
            symbols: parse.symbols,
            symbol_levels: hierarchy.into_levels(),
            warnings: parse.warnings,
            metrics,
        };
        (session, self.errors, self.scan)
    }
}
