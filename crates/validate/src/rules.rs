//! Rule application pass: grammar `@VALIDATE` rules against references.

use crate::issues::{ReferenceIssueKind, ReferenceValidationResult};
use braid_core::validation::types_compatible;
use braid_core::{CrossLanguageReference, ReferenceId, RuleCheck, ValidationResult, ValidationRule};

/// Evaluate every rule against every reference it applies to. `checked`
/// holds the reference pass results, index-aligned with `references`.
pub(crate) fn apply_rules(
    rules: &[ValidationRule],
    references: &[CrossLanguageReference],
    checked: &[ReferenceValidationResult],
) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    for rule in rules {
        for (reference, check) in references.iter().zip(checked) {
            if !rule.applies_to(reference, check.target_type.as_deref()) {
                continue;
            }
            let (valid, reason) = evaluate(rule, reference, check);
            let suggestions = if valid {
                Vec::new()
            } else {
                check
                    .issues
                    .iter()
                    .filter_map(|i| i.suggestion.clone())
                    .chain(std::iter::once(format!("see rule '{}' (line {})", rule.name, rule.line)))
                    .collect()
            };
            let message = match (&rule.message, valid, reason) {
                (Some(m), _, _) => m.clone(),
                (None, true, _) => format!(
                    "{}: {}.{} -> {}.{} passes",
                    rule.name,
                    reference.source_language,
                    reference.source_symbol,
                    reference.target_language,
                    reference.target_symbol
                ),
                (None, false, reason) => format!(
                    "{}: {}",
                    rule.name,
                    reason.unwrap_or_else(|| "check failed".to_string())
                ),
            };
            tracing::debug!(rule = %rule.name, reference = reference.id.0, valid, "rule applied");
            results.push(ValidationResult {
                rule: rule.name.clone(),
                reference: Some(reference.id),
                valid,
                severity: rule.severity,
                message,
                suggestions,
                related_references: related(reference, references),
                position: Some(reference.position),
            });
        }
    }
    results
}

fn evaluate(
    rule: &ValidationRule,
    reference: &CrossLanguageReference,
    check: &ReferenceValidationResult,
) -> (bool, Option<String>) {
    let unresolved = check.has_issue(ReferenceIssueKind::UnresolvedReference);
    match rule.check {
        RuleCheck::TypeCompatibility => {
            match (reference.declared_type.as_deref(), check.target_type.as_deref()) {
                (Some(source), Some(target)) if !types_compatible(source, target) => (
                    false,
                    Some(format!(
                        "'{}' is {} in {} but {} in {}",
                        reference.target_symbol,
                        source,
                        reference.source_language,
                        target,
                        reference.target_language
                    )),
                ),
                _ => (true, None),
            }
        }
        RuleCheck::Accessibility if check.has_issue(ReferenceIssueKind::ScopeInaccessible) => (
            false,
            Some(format!(
                "'{}' is not accessible from {}",
                reference.target_symbol, reference.source_language
            )),
        ),
        RuleCheck::Accessibility => (true, None),
        RuleCheck::Resolution | RuleCheck::Pattern if unresolved => (
            false,
            Some(format!(
                "'{}' does not resolve in {}",
                reference.target_symbol, reference.target_language
            )),
        ),
        RuleCheck::Resolution | RuleCheck::Pattern => (true, None),
    }
}

/// Other references naming the same source or target symbol.
fn related(reference: &CrossLanguageReference, all: &[CrossLanguageReference]) -> Vec<ReferenceId> {
    all.iter()
        .filter(|r| r.id != reference.id)
        .filter(|r| {
            r.source_symbol == reference.source_symbol || r.target_symbol == reference.target_symbol
        })
        .map(|r| r.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, reference};
    use crate::references::{validate_references, ReferenceCache};
    use braid_core::{Severity, SymbolKind};

    #[test]
    fn type_rule_fails_with_declared_severity() {
        let mut contexts = [context(0, "Expr", &[("label", SymbolKind::Variable)])];
        contexts[0]
            .context
            .symbols
            .get_mut("label")
            .unwrap()
            .attributes
            .insert("type".into(), "string".into());
        let mut r = reference("Expr", "label");
        r.declared_type = Some("int".into());
        let refs = [r];
        let checked = validate_references(&contexts, &refs, &mut ReferenceCache::new(), &mut 0);

        let rule = ValidationRule::new("type_check", "int", "string", Severity::Warning);
        let results = apply_rules(&[rule], &refs, &checked);
        assert_eq!(results.len(), 1);
        assert!(!results[0].valid);
        assert_eq!(results[0].severity, Severity::Warning);
        assert_eq!(results[0].reference, Some(ReferenceId(0)));
        assert!(!results[0].suggestions.is_empty());
    }

    #[test]
    fn rule_only_applies_to_matching_languages() {
        let contexts = [context(0, "Script", &[("go", SymbolKind::Function)])];
        let mut a = reference("Script", "go");
        a.source_language = "Markup".into();
        let mut b = reference("Script", "go");
        b.id = ReferenceId(1);
        b.source_language = "Style".into();
        let refs = [a, b];
        let checked = validate_references(&contexts, &refs, &mut ReferenceCache::new(), &mut 0);

        let rule = ValidationRule::new("bindings", "Markup", "Script", Severity::Error);
        let results = apply_rules(&[rule], &refs, &checked);
        assert_eq!(results.len(), 1);
        assert!(results[0].valid);
        assert_eq!(results[0].related_references, vec![ReferenceId(1)]);
    }

    #[test]
    fn resolution_rule_fails_on_unresolved() {
        let contexts = [context(0, "Script", &[])];
        let refs = [reference("Script", "ghost")];
        let checked = validate_references(&contexts, &refs, &mut ReferenceCache::new(), &mut 0);
        let rule = ValidationRule::new("must_resolve", "*", "*", Severity::Error);
        let results = apply_rules(&[rule], &refs, &checked);
        assert!(results[0].is_blocking());
    }
}
