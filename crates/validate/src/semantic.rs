//! Semantic pass: pluggable per-context rules.

use crate::error::ValidationError;
use crate::issues::{SemanticFindings, SemanticValidationResult};
use braid_core::EmbeddedLanguageContext;

/// A consistency check run against every context whose language it
/// declares. `"*"` in [`SemanticRule::languages`] matches any language.
pub trait SemanticRule {
    fn name(&self) -> &str;

    fn languages(&self) -> &[String];

    fn enabled(&self) -> bool {
        true
    }

    fn check(&self, context: &EmbeddedLanguageContext) -> Result<SemanticFindings, String>;
}

fn applies(rule: &dyn SemanticRule, language: &str) -> bool {
    rule.enabled() && rule.languages().iter().any(|l| l == "*" || l == language)
}

/// Run each applicable rule on each context. The first rule error aborts
/// the pass.
pub(crate) fn validate_semantics(
    rules: &[Box<dyn SemanticRule>],
    contexts: &[EmbeddedLanguageContext],
) -> Result<Vec<SemanticValidationResult>, ValidationError> {
    let mut results = Vec::new();
    for ctx in contexts {
        for rule in rules.iter().filter(|r| applies(r.as_ref(), &ctx.language)) {
            let findings = rule
                .check(ctx)
                .map_err(|message| ValidationError::SemanticRuleFailed {
                    rule: rule.name().to_string(),
                    context: ctx.id,
                    message,
                })?;
            results.push(SemanticValidationResult {
                rule: rule.name().to_string(),
                context: ctx.id,
                language: ctx.language.clone(),
                valid: findings.violations.is_empty(),
                violations: findings.violations,
                warnings: findings.warnings,
                suggestions: findings.suggestions,
            });
        }
    }
    Ok(results)
}

/// Flags symbols whose names are reserved in the rule's languages.
#[derive(Debug, Clone)]
pub struct ReservedNames {
    languages: Vec<String>,
    reserved: Vec<String>,
}

impl ReservedNames {
    pub fn new(languages: &[&str], reserved: &[&str]) -> Self {
        ReservedNames {
            languages: languages.iter().map(|s| s.to_string()).collect(),
            reserved: reserved.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SemanticRule for ReservedNames {
    fn name(&self) -> &str {
        "reserved_names"
    }

    fn languages(&self) -> &[String] {
        &self.languages
    }

    fn check(&self, context: &EmbeddedLanguageContext) -> Result<SemanticFindings, String> {
        let mut findings = SemanticFindings::default();
        for name in context.symbols.keys() {
            if self.reserved.iter().any(|r| r == name) {
                findings
                    .violations
                    .push(format!("'{}' is reserved in {}", name, context.language));
                findings.suggestions.push(format!("rename '{}'", name));
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::context;
    use braid_core::SymbolKind;

    struct Failing;

    impl SemanticRule for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn languages(&self) -> &[String] {
            &[]
        }
        fn check(&self, _: &EmbeddedLanguageContext) -> Result<SemanticFindings, String> {
            Err("boom".into())
        }
    }

    #[test]
    fn rules_run_only_on_their_languages() {
        let rules: Vec<Box<dyn SemanticRule>> = vec![Box::new(ReservedNames::new(&["Script"], &["eval"]))];
        let contexts = [
            context(0, "Markup", &[("eval", SymbolKind::Variable)]),
            context(1, "Script", &[("eval", SymbolKind::Function)]),
        ];
        let results = validate_semantics(&rules, &contexts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].language, "Script");
        assert!(!results[0].valid);
    }

    #[test]
    fn rule_without_languages_never_runs() {
        let rules: Vec<Box<dyn SemanticRule>> = vec![Box::new(Failing)];
        let contexts = [context(0, "Markup", &[])];
        assert!(validate_semantics(&rules, &contexts).unwrap().is_empty());
    }
}
