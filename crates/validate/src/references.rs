//! Reference pass: the ordered resolution pipeline.
//!
//! Each reference goes through target-language existence, target-symbol
//! resolution, type compatibility and scope accessibility, in that order.
//! The first failing step ends the pipeline for that reference.

use crate::issues::{
    ReferenceIssue, ReferenceIssueKind, ReferenceValidationResult, ResolutionStep, StepKind,
};
use braid_core::validation::types_compatible;
use braid_core::{
    ContextId, CrossLanguageReference, EmbeddedLanguageContext, Severity, SymbolInfo, Visibility,
};
use std::collections::{BTreeMap, HashMap};

/// Source language, target language, source symbol, target symbol and
/// declared type.
pub(crate) type ReferenceKey = (String, String, String, String, Option<String>);
pub(crate) type ReferenceCache = HashMap<ReferenceKey, ReferenceValidationResult>;

/// Attribute that marks a symbol as deprecated.
pub const DEPRECATED_ATTRIBUTE: &str = "deprecated";

/// Symbol definitions by language, in context order.
pub(crate) struct TargetIndex<'a> {
    by_language: BTreeMap<&'a str, Vec<(ContextId, &'a SymbolInfo)>>,
}

impl<'a> TargetIndex<'a> {
    pub(crate) fn build(contexts: &'a [EmbeddedLanguageContext]) -> Self {
        let mut by_language: BTreeMap<&str, Vec<(ContextId, &SymbolInfo)>> = BTreeMap::new();
        for ctx in contexts {
            let entry = by_language.entry(ctx.language.as_str()).or_default();
            entry.extend(ctx.symbols.values().map(|s| (ctx.id, s)));
        }
        TargetIndex { by_language }
    }

    fn has_language(&self, language: &str) -> bool {
        self.by_language.contains_key(language)
    }

    fn candidates(&self, language: &str, name: &str) -> Vec<(ContextId, &'a SymbolInfo)> {
        self.by_language
            .get(language)
            .map(|defs| defs.iter().filter(|(_, s)| s.name == name).copied().collect())
            .unwrap_or_default()
    }

    fn closest(&self, language: &str, name: &str) -> Option<&'a str> {
        self.by_language
            .get(language)?
            .iter()
            .map(|(_, s)| (edit_distance(&s.name, name), s.name.as_str()))
            .filter(|(d, _)| *d <= 2)
            .min()
            .map(|(_, n)| n)
    }
}

pub(crate) fn validate_references(
    contexts: &[EmbeddedLanguageContext],
    references: &[CrossLanguageReference],
    cache: &mut ReferenceCache,
    cache_hits: &mut u64,
) -> Vec<ReferenceValidationResult> {
    let index = TargetIndex::build(contexts);
    references
        .iter()
        .map(|reference| {
            let key = (
                reference.source_language.clone(),
                reference.target_language.clone(),
                reference.source_symbol.clone(),
                reference.target_symbol.clone(),
                reference.declared_type.clone(),
            );
            if let Some(cached) = cache.get(&key) {
                *cache_hits += 1;
                let mut result = cached.clone();
                result.reference = reference.id;
                return result;
            }
            let result = check_reference(reference, &index);
            tracing::debug!(
                reference = reference.id.0,
                symbol = %reference.target_symbol,
                target = %reference.target_language,
                valid = result.valid,
                "reference checked"
            );
            cache.insert(key, result.clone());
            result
        })
        .collect()
}

struct Pipeline<'r> {
    reference: &'r CrossLanguageReference,
    steps: Vec<ResolutionStep>,
    issues: Vec<ReferenceIssue>,
    target_context: Option<ContextId>,
    target_type: Option<String>,
}

impl Pipeline<'_> {
    fn pass(&mut self, step: StepKind, detail: impl Into<String>) {
        self.steps.push(ResolutionStep {
            step,
            success: true,
            detail: detail.into(),
        });
    }

    fn fail(&mut self, step: StepKind, detail: impl Into<String>) {
        self.steps.push(ResolutionStep {
            step,
            success: false,
            detail: detail.into(),
        });
    }

    fn issue(&mut self, kind: ReferenceIssueKind, severity: Severity, message: String, suggestion: Option<String>) {
        let mut issue = ReferenceIssue::new(kind, severity, message).at(self.reference.position);
        issue.suggestion = suggestion;
        self.issues.push(issue);
    }

    fn finish(self) -> ReferenceValidationResult {
        let r = self.reference;
        ReferenceValidationResult {
            reference: r.id,
            source_language: r.source_language.clone(),
            target_language: r.target_language.clone(),
            source_symbol: r.source_symbol.clone(),
            target_symbol: r.target_symbol.clone(),
            valid: self.issues.iter().all(|i| i.severity != Severity::Error),
            steps: self.steps,
            issues: self.issues,
            target_context: self.target_context,
            target_type: self.target_type,
        }
    }
}

fn check_reference(reference: &CrossLanguageReference, index: &TargetIndex<'_>) -> ReferenceValidationResult {
    let mut p = Pipeline {
        reference,
        steps: Vec::new(),
        issues: Vec::new(),
        target_context: None,
        target_type: None,
    };
    let target_language = reference.target_language.as_str();
    let name = reference.target_symbol.as_str();

    // 1. target language
    if index.has_language(target_language) {
        p.pass(StepKind::TargetLanguage, format!("{} contexts present", target_language));
    } else if reference.resolved {
        p.pass(
            StepKind::TargetLanguage,
            format!("{} known only from grammar declarations", target_language),
        );
    } else {
        p.fail(
            StepKind::TargetLanguage,
            format!("no context in language {}", target_language),
        );
        p.issue(
            ReferenceIssueKind::LanguageMismatch,
            Severity::Error,
            format!(
                "'{}' targets language {} which does not occur in the input",
                name, target_language
            ),
            Some(format!("embed a {} region or correct the target language", target_language)),
        );
        p.issue(
            ReferenceIssueKind::UnresolvedReference,
            Severity::Error,
            format!("'{}' cannot be resolved in {}", name, target_language),
            None,
        );
        return p.finish();
    }

    // 2. target symbol
    let candidates = index.candidates(target_language, name);
    let Some(&(target_ctx, target)) = candidates.first() else {
        if reference.resolved {
            p.target_context = reference.resolved_context;
            p.pass(
                StepKind::SymbolResolution,
                format!("'{}' resolved against a grammar declaration", name),
            );
            p.pass(StepKind::TypeCompatibility, "target type unknown");
            p.pass(StepKind::ScopeAccessibility, "declared symbols are public");
            return p.finish();
        }
        p.fail(
            StepKind::SymbolResolution,
            format!("no '{}' in any {} context", name, target_language),
        );
        let suggestion = index
            .closest(target_language, name)
            .map(|n| format!("did you mean '{}'?", n))
            .or_else(|| Some(format!("define '{}' in {}", name, target_language)));
        p.issue(
            ReferenceIssueKind::UnresolvedReference,
            Severity::Error,
            format!("'{}' is not defined in {}", name, target_language),
            suggestion,
        );
        return p.finish();
    };
    p.target_context = Some(target_ctx);
    p.target_type = target.declared_type().map(str::to_string);
    p.pass(
        StepKind::SymbolResolution,
        format!("found '{}' in {}", name, target_ctx),
    );
    if candidates.len() > 1 {
        p.issue(
            ReferenceIssueKind::AmbiguousReference,
            Severity::Warning,
            format!(
                "'{}' is defined in {} {} contexts; using {}",
                name,
                candidates.len(),
                target_language,
                target_ctx
            ),
            None,
        );
    }
    if target
        .attributes
        .get(DEPRECATED_ATTRIBUTE)
        .is_some_and(|v| v == "true")
    {
        p.issue(
            ReferenceIssueKind::DeprecatedReference,
            Severity::Warning,
            format!("'{}' is deprecated", name),
            None,
        );
    }

    // 3. types
    match (reference.declared_type.as_deref(), target.declared_type()) {
        (Some(source), Some(dest)) if !types_compatible(source, dest) => {
            p.fail(
                StepKind::TypeCompatibility,
                format!("{} is not compatible with {}", source, dest),
            );
            p.issue(
                ReferenceIssueKind::TypeIncompatibility,
                Severity::Error,
                format!(
                    "'{}' is used as {} but {} declares it {}",
                    name, source, target_language, dest
                ),
                Some(format!("convert the value to {} or change the declared type", dest)),
            );
            return p.finish();
        }
        (Some(source), Some(dest)) => {
            p.pass(StepKind::TypeCompatibility, format!("{} -> {}", source, dest));
        }
        _ => p.pass(StepKind::TypeCompatibility, "type unknown on one side"),
    }

    // 4. accessibility
    let same_language = reference.source_language == reference.target_language;
    let (accessible, detail) = match target.visibility {
        Visibility::Public => (true, "public".to_string()),
        Visibility::Private => (same_language, "private: same language only".to_string()),
        Visibility::Protected => (
            same_language,
            "protected: same language only; protected access across languages is not modeled"
                .to_string(),
        ),
        other => (true, format!("{:?} treated as accessible", other).to_lowercase()),
    };
    if accessible {
        p.pass(StepKind::ScopeAccessibility, detail);
    } else {
        p.fail(StepKind::ScopeAccessibility, detail);
        p.issue(
            ReferenceIssueKind::ScopeInaccessible,
            Severity::Error,
            format!(
                "'{}' is {:?} in {} and cannot be used from {}",
                name, target.visibility, target_language, reference.source_language
            ),
            Some(format!("make '{}' public", name)),
        );
    }
    p.finish()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, reference};
    use braid_core::SymbolKind;

    fn run(contexts: &[EmbeddedLanguageContext], refs: &[CrossLanguageReference]) -> Vec<ReferenceValidationResult> {
        validate_references(contexts, refs, &mut ReferenceCache::new(), &mut 0)
    }

    #[test]
    fn resolved_reference_passes_all_steps() {
        let contexts = [context(0, "Markup", &[("title", SymbolKind::Variable)])];
        let results = run(&contexts, &[reference("Markup", "title")]);
        assert!(results[0].valid);
        assert_eq!(results[0].steps.len(), 4);
        assert!(results[0].steps.iter().all(|s| s.success));
        assert_eq!(results[0].target_context, Some(ContextId(0)));
    }

    #[test]
    fn missing_symbol_is_one_unresolved_issue_with_hint() {
        let contexts = [context(0, "Markup", &[("title", SymbolKind::Variable)])];
        let results = run(&contexts, &[reference("Markup", "titel")]);
        let r = &results[0];
        assert!(!r.valid);
        assert_eq!(r.issues.len(), 1);
        assert_eq!(r.issues[0].kind, ReferenceIssueKind::UnresolvedReference);
        assert_eq!(r.issues[0].suggestion.as_deref(), Some("did you mean 'title'?"));
        assert!(r.step(StepKind::TypeCompatibility).is_none());
    }

    #[test]
    fn unknown_language_is_mismatch_plus_unresolved() {
        let contexts = [context(0, "Markup", &[])];
        let results = run(&contexts, &[reference("Style", "color")]);
        let kinds: Vec<_> = results[0].issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![ReferenceIssueKind::LanguageMismatch, ReferenceIssueKind::UnresolvedReference]
        );
    }

    #[test]
    fn type_incompatibility_stops_pipeline() {
        let mut contexts = [context(0, "Expr", &[("label", SymbolKind::Variable)])];
        let label = contexts[0].context.symbols.get_mut("label").unwrap();
        label.attributes.insert("type".into(), "string".into());
        let mut r = reference("Expr", "label");
        r.declared_type = Some("int".into());
        let results = run(&contexts, &[r]);
        assert_eq!(results[0].issues[0].kind, ReferenceIssueKind::TypeIncompatibility);
        assert!(results[0].step(StepKind::ScopeAccessibility).is_none());
    }

    #[test]
    fn private_and_protected_need_same_language() {
        let mut contexts = [context(0, "Script", &[("secret", SymbolKind::Variable), ("family", SymbolKind::Variable)])];
        contexts[0].context.symbols.get_mut("secret").unwrap().visibility = Visibility::Private;
        contexts[0].context.symbols.get_mut("family").unwrap().visibility = Visibility::Protected;

        let results = run(&contexts, &[reference("Script", "secret"), reference("Script", "family")]);
        assert!(results.iter().all(|r| r.has_issue(ReferenceIssueKind::ScopeInaccessible)));
        let detail = &results[1].step(StepKind::ScopeAccessibility).unwrap().detail;
        assert!(detail.contains("not modeled"));

        let mut inside = reference("Script", "secret");
        inside.source_language = "Script".into();
        assert!(run(&contexts, &[inside])[0].valid);
    }

    #[test]
    fn ambiguous_and_deprecated_are_warnings() {
        let mut contexts = [
            context(0, "Script", &[("old", SymbolKind::Function)]),
            context(1, "Script", &[("old", SymbolKind::Function)]),
        ];
        contexts[0]
            .context
            .symbols
            .get_mut("old")
            .unwrap()
            .attributes
            .insert(DEPRECATED_ATTRIBUTE.into(), "true".into());
        let results = run(&contexts, &[reference("Script", "old")]);
        assert!(results[0].valid);
        assert!(results[0].has_issue(ReferenceIssueKind::AmbiguousReference));
        assert!(results[0].has_issue(ReferenceIssueKind::DeprecatedReference));
    }

    #[test]
    fn identical_references_hit_cache() {
        let contexts = [context(0, "Markup", &[("title", SymbolKind::Variable)])];
        let mut second = reference("Markup", "title");
        second.id = braid_core::ReferenceId(1);
        let mut hits = 0;
        let results = validate_references(
            &contexts,
            &[reference("Markup", "title"), second],
            &mut ReferenceCache::new(),
            &mut hits,
        );
        assert_eq!(hits, 1);
        assert_eq!(results[1].reference, braid_core::ReferenceId(1));
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
