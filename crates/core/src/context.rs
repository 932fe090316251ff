//! Parse-context data model: scopes, symbols, and context rules.
//!
//! Contexts live in an arena (`Vec<ParseContext>`) and refer to each other
//! by [`ContextId`], so a finished session can be handed out by value and
//! walked without borrowing the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ──────────────────────────────────────────────
// Identifiers and positions
// ──────────────────────────────────────────────

/// Index of a context in a session's context arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub usize);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub length: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize, length: usize) -> Self {
        Position {
            line,
            column,
            offset,
            length,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ──────────────────────────────────────────────
// Kinds
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Function,
    Class,
    Block,
    Expression,
    Statement,
    Custom(String),
}

impl ScopeKind {
    pub fn parse(s: &str) -> ScopeKind {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => ScopeKind::Global,
            "function" => ScopeKind::Function,
            "class" => ScopeKind::Class,
            "block" => ScopeKind::Block,
            "expression" => ScopeKind::Expression,
            "statement" => ScopeKind::Statement,
            _ => ScopeKind::Custom(s.trim().to_string()),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Global => write!(f, "global"),
            ScopeKind::Function => write!(f, "function"),
            ScopeKind::Class => write!(f, "class"),
            ScopeKind::Block => write!(f, "block"),
            ScopeKind::Expression => write!(f, "expression"),
            ScopeKind::Statement => write!(f, "statement"),
            ScopeKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Interface,
    Type,
    Constant,
    Parameter,
    Label,
    Custom(String),
}

impl SymbolKind {
    /// Parse a declared symbol type. Custom kinds must be spelled
    /// `custom:<name>`; anything else unknown is rejected.
    pub fn parse(s: &str) -> Option<SymbolKind> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("custom:") {
            let rest = rest.trim();
            return if rest.is_empty() {
                None
            } else {
                Some(SymbolKind::Custom(rest.to_string()))
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "variable" | "var" => Some(SymbolKind::Variable),
            "function" | "fn" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "type" => Some(SymbolKind::Type),
            "constant" | "const" => Some(SymbolKind::Constant),
            "parameter" | "param" => Some(SymbolKind::Parameter),
            "label" => Some(SymbolKind::Label),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Variable => write!(f, "variable"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Class => write!(f, "class"),
            SymbolKind::Interface => write!(f, "interface"),
            SymbolKind::Type => write!(f, "type"),
            SymbolKind::Constant => write!(f, "constant"),
            SymbolKind::Parameter => write!(f, "parameter"),
            SymbolKind::Label => write!(f, "label"),
            SymbolKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Internal,
    Local,
}

impl Visibility {
    pub fn parse(s: &str) -> Option<Visibility> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" | "global" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            "internal" => Some(Visibility::Internal),
            "local" => Some(Visibility::Local),
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Symbols
// ──────────────────────────────────────────────

/// Attribute key holding a symbol's declared type (`int`, `string`, ...).
pub const TYPE_ATTRIBUTE: &str = "type";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub scope: ContextId,
    pub defined_at: Position,
    /// Append-only.
    pub references: Vec<Position>,
    pub visibility: Visibility,
    pub attributes: BTreeMap<String, String>,
}

impl SymbolInfo {
    pub fn new(name: &str, kind: SymbolKind, scope: ContextId, defined_at: Position) -> Self {
        SymbolInfo {
            name: name.to_owned(),
            kind,
            scope,
            defined_at,
            references: Vec::new(),
            visibility: Visibility::Local,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_type(mut self, ty: &str) -> Self {
        self.attributes
            .insert(TYPE_ATTRIBUTE.to_string(), ty.to_string());
        self
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.attributes.get(TYPE_ATTRIBUTE).map(String::as_str)
    }

    pub fn record_reference(&mut self, at: Position) {
        self.references.push(at);
    }
}

// ──────────────────────────────────────────────
// Context rules
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCondition {
    /// A symbol with the given name (or, when `None`, named by the current
    /// token) is visible from the current context.
    SymbolExists(Option<String>),
    ScopeType(ScopeKind),
    /// Another rule already fired for the current token.
    RuleMatched(String),
    TokenIs(String),
    /// Named predicate registered on the engine.
    Custom(String),
}

impl RuleCondition {
    /// Parse `symbol-exists[:name]`, `scope:<kind>`, `matched:<rule>`,
    /// `token:<text>` or `custom:<predicate>`.
    pub fn parse(s: &str) -> Option<RuleCondition> {
        let (head, arg) = split_spec(s);
        match (head.as_str(), arg) {
            ("symbol-exists", None) => Some(RuleCondition::SymbolExists(None)),
            ("symbol-exists", Some(name)) => Some(RuleCondition::SymbolExists(Some(name))),
            ("scope", Some(kind)) => Some(RuleCondition::ScopeType(ScopeKind::parse(&kind))),
            ("matched", Some(rule)) => Some(RuleCondition::RuleMatched(rule)),
            ("token", Some(text)) => Some(RuleCondition::TokenIs(text)),
            ("custom", Some(name)) => Some(RuleCondition::Custom(name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleAction {
    /// Define the current token as a symbol of this kind.
    AddSymbol(SymbolKind),
    /// Set an attribute on the symbol named by the current token.
    ModifySymbol { key: String, value: String },
    ChangeScope(ScopeKind),
    /// Run another rule's action.
    ApplyRule(String),
    /// Named executor registered on the engine.
    Custom(String),
}

impl RuleAction {
    /// Parse `add-symbol:<kind>`, `modify-symbol:<key>=<value>`,
    /// `change-scope:<kind>`, `apply-rule:<rule>` or `custom:<executor>`.
    pub fn parse(s: &str) -> Option<RuleAction> {
        let (head, arg) = split_spec(s);
        let arg = arg?;
        match head.as_str() {
            "add-symbol" => SymbolKind::parse(&arg).map(RuleAction::AddSymbol),
            "modify-symbol" => {
                let (key, value) = arg.split_once('=')?;
                Some(RuleAction::ModifySymbol {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            "change-scope" => Some(RuleAction::ChangeScope(ScopeKind::parse(&arg))),
            "apply-rule" => Some(RuleAction::ApplyRule(arg)),
            "custom" => Some(RuleAction::Custom(arg)),
            _ => None,
        }
    }
}

fn split_spec(s: &str) -> (String, Option<String>) {
    match s.split_once(':') {
        Some((head, arg)) => (
            head.trim().to_ascii_lowercase(),
            Some(arg.trim().to_string()).filter(|a| !a.is_empty()),
        ),
        None => (s.trim().to_ascii_lowercase(), None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRule {
    pub name: String,
    pub condition: RuleCondition,
    pub action: RuleAction,
    pub priority: i32,
    pub inherited: bool,
    /// Grammar that declared the rule.
    pub origin: String,
}

impl ContextRule {
    pub fn new(name: &str, condition: RuleCondition, action: RuleAction, priority: i32) -> Self {
        ContextRule {
            name: name.to_owned(),
            condition,
            action,
            priority,
            inherited: false,
            origin: String::new(),
        }
    }

    /// Whether `self` should replace `existing` when both carry the same name.
    ///
    /// A rule declared directly on the derived grammar always beats an
    /// inherited one; otherwise the higher priority wins and ties keep
    /// the existing rule.
    pub fn overrides(&self, existing: &ContextRule) -> bool {
        match (self.inherited, existing.inherited) {
            (false, true) => true,
            (true, false) => false,
            _ => self.priority > existing.priority,
        }
    }
}

// ──────────────────────────────────────────────
// ParseContext
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseContext {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub scope: ScopeKind,
    pub symbols: BTreeMap<String, SymbolInfo>,
    pub rules: BTreeMap<String, ContextRule>,
    pub depth: usize,
    pub position: Position,
    pub attributes: BTreeMap<String, String>,
}

impl ParseContext {
    pub fn root(scope: ScopeKind) -> Self {
        ParseContext {
            id: ContextId(0),
            parent: None,
            scope,
            symbols: BTreeMap::new(),
            rules: BTreeMap::new(),
            depth: 0,
            position: Position::default(),
            attributes: BTreeMap::new(),
        }
    }

    /// A child one level deeper than `parent`.
    pub fn child_of(parent: &ParseContext, id: ContextId, scope: ScopeKind) -> Self {
        ParseContext {
            id,
            parent: Some(parent.id),
            scope,
            symbols: BTreeMap::new(),
            rules: BTreeMap::new(),
            depth: parent.depth + 1,
            position: parent.position,
            attributes: BTreeMap::new(),
        }
    }

    /// Insert `rule` unless a rule with the same name already wins over it.
    /// Returns true when the rule was stored.
    pub fn merge_rule(&mut self, rule: ContextRule) -> bool {
        match self.rules.get(&rule.name) {
            Some(existing) if !rule.overrides(existing) => false,
            _ => {
                self.rules.insert(rule.name.clone(), rule);
                true
            }
        }
    }
}
