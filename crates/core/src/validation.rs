//! Validation-rule declarations and results shared between the embedded
//! language manager (which schedules rules) and the validator (which
//! evaluates them).

use crate::context::Position;
use crate::embedded::{CrossLanguageReference, ReferenceId};
use crate::error::Severity;
use serde::{Deserialize, Serialize};

/// What a validation rule checks once it applies to a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCheck {
    /// Source and target types must be compatible.
    TypeCompatibility,
    /// The target symbol must be visible from the source language.
    Accessibility,
    /// The reference must resolve.
    Resolution,
    /// Applicability alone is checked; a matching, resolved reference passes.
    Pattern,
}

impl RuleCheck {
    /// Infer the check from a rule name such as `type_check` or
    /// `scope_access`.
    pub fn from_rule_name(name: &str) -> RuleCheck {
        let n = name.to_ascii_lowercase();
        if n.contains("type") {
            RuleCheck::TypeCompatibility
        } else if n.contains("scope") || n.contains("visib") || n.contains("access") {
            RuleCheck::Accessibility
        } else if n.contains("resolv") || n.contains("exist") {
            RuleCheck::Resolution
        } else {
            RuleCheck::Pattern
        }
    }

    pub fn parse(s: &str) -> Option<RuleCheck> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type" | "types" | "type-compatibility" => Some(RuleCheck::TypeCompatibility),
            "access" | "accessibility" | "scope" => Some(RuleCheck::Accessibility),
            "resolve" | "resolution" | "exists" => Some(RuleCheck::Resolution),
            "pattern" => Some(RuleCheck::Pattern),
            _ => None,
        }
    }
}

/// A declared `source_pattern -> target_pattern` rule.
///
/// A pattern side matches a reference when it is `*`, or when it
/// glob-matches that side's language, declared type or symbol name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub source_pattern: String,
    pub target_pattern: String,
    pub severity: Severity,
    pub check: RuleCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub line: u32,
}

impl ValidationRule {
    pub fn new(name: &str, source_pattern: &str, target_pattern: &str, severity: Severity) -> Self {
        ValidationRule {
            name: name.to_owned(),
            source_pattern: source_pattern.trim().to_owned(),
            target_pattern: target_pattern.trim().to_owned(),
            severity,
            check: RuleCheck::from_rule_name(name),
            message: None,
            line: 0,
        }
    }

    /// Whether this rule should be evaluated for `reference`.
    /// `target_type` is the resolved target symbol's declared type.
    pub fn applies_to(&self, reference: &CrossLanguageReference, target_type: Option<&str>) -> bool {
        side_matches(
            &self.source_pattern,
            &reference.source_language,
            reference.declared_type.as_deref(),
            &reference.source_symbol,
        ) && side_matches(
            &self.target_pattern,
            &reference.target_language,
            target_type,
            &reference.target_symbol,
        )
    }
}

fn side_matches(pattern: &str, language: &str, ty: Option<&str>, symbol: &str) -> bool {
    if pattern.is_empty() || pattern == "*" {
        return true;
    }
    glob_match(pattern, language)
        || ty.is_some_and(|t| glob_match(pattern, t))
        || glob_match(pattern, symbol)
}

/// Case-insensitive glob match supporting `*` only.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let t: Vec<char> = text.to_ascii_lowercase().chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// Result of evaluating one rule against one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceId>,
    pub valid: bool,
    pub severity: Severity,
    pub message: String,
    pub suggestions: Vec<String>,
    pub related_references: Vec<ReferenceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ValidationResult {
    /// Whether this result counts against success (`valid == false` at
    /// error severity).
    pub fn is_blocking(&self) -> bool {
        !self.valid && self.severity == Severity::Error
    }
}

/// Types compatible with each other as one numeric family.
pub const NUMERIC_TYPES: &[&str] = &[
    "int", "integer", "float", "double", "number", "decimal", "long", "short", "i8", "i16",
    "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "usize", "isize", "bigint",
];

pub const STRING_TYPES: &[&str] = &["string", "str", "text", "char", "&str", "varchar"];

/// Type compatibility used by cross-language checks: identical types,
/// `unknown` on either side, the numeric family and the string family are
/// compatible; everything else is not.
pub fn types_compatible(source: &str, target: &str) -> bool {
    let s = source.trim().to_ascii_lowercase();
    let t = target.trim().to_ascii_lowercase();
    if s == t || s == "unknown" || t == "unknown" {
        return true;
    }
    let numeric = |x: &str| NUMERIC_TYPES.contains(&x);
    let string = |x: &str| STRING_TYPES.contains(&x);
    (numeric(&s) && numeric(&t)) || (string(&s) && string(&t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded::ReferenceOrigin;

    fn reference(src: &str, dst: &str, ty: Option<&str>) -> CrossLanguageReference {
        CrossLanguageReference {
            id: ReferenceId(0),
            source_language: src.into(),
            target_language: dst.into(),
            source_symbol: "handler".into(),
            target_symbol: "handler".into(),
            declared_type: ty.map(str::to_string),
            position: Position::default(),
            resolved: false,
            resolved_context: None,
            validation: None,
            origin: ReferenceOrigin::Token,
        }
    }

    #[test]
    fn glob_supports_star() {
        assert!(glob_match("Java*", "JavaScript"));
        assert!(glob_match("*script", "JavaScript"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("CSS", "JavaScript"));
        assert!(glob_match("on*Click", "onDoubleClick"));
    }

    #[test]
    fn type_families() {
        assert!(types_compatible("int", "f64"));
        assert!(types_compatible("String", "str"));
        assert!(types_compatible("unknown", "bool"));
        assert!(types_compatible("Widget", "widget"));
        assert!(!types_compatible("int", "string"));
        assert!(!types_compatible("bool", "int"));
    }

    #[test]
    fn rule_applies_by_language_or_type() {
        let by_lang = ValidationRule::new("bindings", "HTML", "JavaScript", Severity::Warning);
        assert!(by_lang.applies_to(&reference("HTML", "JavaScript", None), None));
        assert!(!by_lang.applies_to(&reference("CSS", "JavaScript", None), None));

        let by_type = ValidationRule::new("type_check", "int", "string", Severity::Error);
        assert_eq!(by_type.check, RuleCheck::TypeCompatibility);
        assert!(by_type.applies_to(&reference("A", "B", Some("int")), Some("string")));
        assert!(!by_type.applies_to(&reference("A", "B", Some("int")), Some("bool")));
    }

    #[test]
    fn check_inferred_from_name() {
        assert_eq!(RuleCheck::from_rule_name("scope_access"), RuleCheck::Accessibility);
        assert_eq!(RuleCheck::from_rule_name("must_resolve"), RuleCheck::Resolution);
        assert_eq!(RuleCheck::from_rule_name("naming"), RuleCheck::Pattern);
    }
}
