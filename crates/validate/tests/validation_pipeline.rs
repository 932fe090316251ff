//! Parse with the embedded-language manager, then validate the session.

use braid_core::{
    ContextEngine, EmbeddedLanguageContext, EmbeddedLanguageManager, EmbeddedSession, EngineConfig,
    GrammarRegistry, LoadOptions, Severity,
};
use braid_validate::{
    CrossLanguageValidator, ReferenceIssueKind, ReservedNames, SemanticFindings, SemanticRule,
    StepKind, SymbolIssueKind, ValidationOutcome,
};

fn parse(grammar_text: &str, input: &str) -> (EmbeddedSession, CrossLanguageValidator) {
    let mut registry = GrammarRegistry::new();
    let (name, _) = registry
        .load_str(grammar_text, &LoadOptions::default())
        .unwrap();
    let grammar = registry.get(&name).unwrap();
    let validator = CrossLanguageValidator::for_grammar(grammar);
    let engine = ContextEngine::new(&registry, EngineConfig::default());
    let mut manager = EmbeddedLanguageManager::new(engine, grammar);
    let outcome = manager.parse_with_embedded_languages(input);
    assert!(outcome.is_success(), "{:?}", outcome.errors());
    (outcome.into_session(), validator)
}

fn run(grammar_text: &str, input: &str) -> (EmbeddedSession, ValidationOutcome) {
    let (session, mut validator) = parse(grammar_text, input);
    let outcome = validator.validate_session(&session);
    (session, outcome)
}

const PRIMARY: &str = "Grammar: Primary\nEmbeddedLanguages: Expr\n";

// ──────────────────────────────────────────────
// 1. Reference resolution
// ──────────────────────────────────────────────

#[test]
fn missing_target_reports_exactly_one_unresolved_error() {
    let (session, outcome) = run(PRIMARY, "total = 1 @CONTEXT[Expr] y + 1 @ENDCONTEXT");
    let y = session
        .cross_language_references
        .iter()
        .position(|r| r.target_symbol == "y")
        .unwrap();
    let result = &outcome.reference_validation_results[y];
    assert!(!result.valid);
    let unresolved: Vec<_> = result
        .issues
        .iter()
        .filter(|i| i.kind == ReferenceIssueKind::UnresolvedReference)
        .collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].severity, Severity::Error);
    assert!(!outcome.success);
}

#[test]
fn existing_target_resolves_and_matching_rule_passes() {
    let grammar = format!("{PRIMARY}@VALIDATE {{ binding: Expr -> Primary }}\n");
    let (session, outcome) = run(&grammar, "y = 1 @CONTEXT[Expr] y + 1 @ENDCONTEXT");

    assert!(session.cross_language_references.iter().all(|r| r.resolved));
    let result = &outcome.reference_validation_results[0];
    assert!(result.valid, "{:?}", result.issues);
    assert!(!result.has_issue(ReferenceIssueKind::UnresolvedReference));
    assert!(result.step(StepKind::ScopeAccessibility).unwrap().success);

    let rule_results: Vec<_> = outcome
        .validation_results
        .iter()
        .filter(|r| r.rule == "binding")
        .collect();
    assert_eq!(rule_results.len(), 1);
    assert!(rule_results[0].valid);
    assert!(outcome.success);
}

#[test]
fn type_check_rule_fails_with_declared_severity() {
    let grammar = "Grammar: Primary\nEmbeddedLanguages: Expr\n@CONTEXT[Expr] {\n@SYMBOL(name=\"label\", type=\"variable\", valueType=\"string\")\n}\n@REFERENCE(target=\"Expr.label\", type=\"int\")\n@VALIDATE { type_check: int -> string [warning] }\n";
    let (_, outcome) = run(grammar, "@CONTEXT[Expr] label @ENDCONTEXT");

    let type_check = outcome
        .validation_results
        .iter()
        .find(|r| r.rule == "type_check")
        .unwrap();
    assert!(!type_check.valid);
    assert_eq!(type_check.severity, Severity::Warning);
    assert!(outcome.reference_validation_results[0]
        .has_issue(ReferenceIssueKind::TypeIncompatibility));
}

// ──────────────────────────────────────────────
// 2. Symbol checks
// ──────────────────────────────────────────────

#[test]
fn same_name_in_two_contexts_of_one_language_is_redefined() {
    let (_, outcome) = run(
        PRIMARY,
        "@CONTEXT[Expr] let foo @ENDCONTEXT @CONTEXT[Expr] let foo @ENDCONTEXT",
    );
    let foo: Vec<_> = outcome
        .symbol_validation_results
        .iter()
        .filter(|r| r.symbol == "foo")
        .collect();
    assert_eq!(foo.len(), 2);
    assert!(foo.iter().any(|r| r
        .issues
        .iter()
        .any(|i| i.kind == SymbolIssueKind::Redefined && i.severity == Severity::Error)));
    assert!(!outcome.success);
}

#[test]
fn unreferenced_symbol_is_one_unused_warning() {
    let (_, outcome) = run(PRIMARY, "count = 1");
    let unused: Vec<_> = outcome
        .symbol_validation_results
        .iter()
        .flat_map(|r| &r.issues)
        .filter(|i| i.kind == SymbolIssueKind::UnusedSymbol)
        .collect();
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].severity, Severity::Warning);
    assert!(outcome.success);
    assert_eq!(outcome.summary.warnings, 1);
}

// ──────────────────────────────────────────────
// 3. Summary, plug-ins and failure policy
// ──────────────────────────────────────────────

#[test]
fn every_element_validated_once_gives_full_coverage() {
    let (session, outcome) = run(PRIMARY, "y = 1 z = 2 @CONTEXT[Expr] let w y + z @ENDCONTEXT");
    let symbols: usize = session.contexts.iter().map(|c| c.symbols.len()).sum();
    assert_eq!(outcome.summary.total_symbols, symbols);
    assert_eq!(
        outcome.summary.total_references,
        session.cross_language_references.len()
    );
    assert_eq!(outcome.summary.coverage, 100.0);
    assert!(outcome.summary.validated_languages.contains("Expr"));
    assert!(outcome.summary.validated_languages.contains("Primary"));
}

#[test]
fn semantic_rule_runs_per_language() {
    let (session, mut validator) = parse(PRIMARY, "@CONTEXT[Expr] let eval @ENDCONTEXT");
    validator
        .register_semantic_rule(Box::new(ReservedNames::new(&["Expr"], &["eval"])))
        .unwrap();
    let outcome = validator.validate_session(&session);
    assert_eq!(outcome.semantic_validation_results.len(), 1);
    assert!(!outcome.semantic_validation_results[0].valid);
    assert!(!outcome.success);
}

struct Broken(Vec<String>);

impl SemanticRule for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn languages(&self) -> &[String] {
        &self.0
    }

    fn check(&self, _: &EmbeddedLanguageContext) -> Result<SemanticFindings, String> {
        Err("lookup table missing".into())
    }
}

#[test]
fn failing_semantic_rule_discards_partial_results() {
    let (session, mut validator) = parse(PRIMARY, "y = 1 @CONTEXT[Expr] y @ENDCONTEXT");
    validator
        .register_semantic_rule(Box::new(Broken(vec!["Expr".into()])))
        .unwrap();
    let outcome = validator.validate_session(&session);

    assert!(!outcome.success);
    assert_eq!(outcome.validation_results.len(), 1);
    assert_eq!(outcome.validation_results[0].severity, Severity::Error);
    assert!(outcome.validation_results[0].message.contains("broken"));
    assert!(outcome.symbol_validation_results.is_empty());
    assert!(outcome.reference_validation_results.is_empty());
}

#[test]
fn results_write_back_into_validation_queue() {
    let grammar = format!("{PRIMARY}@VALIDATE {{ binding: Expr -> Primary }}\n");
    let mut registry = GrammarRegistry::new();
    let (name, _) = registry.load_str(&grammar, &LoadOptions::default()).unwrap();
    let g = registry.get(&name).unwrap();
    let engine = ContextEngine::new(&registry, EngineConfig::default());
    let mut manager = EmbeddedLanguageManager::new(engine, g);
    let mut parsed = manager.parse_with_embedded_languages("y = 1 @CONTEXT[Expr] y @ENDCONTEXT");

    let outcome = CrossLanguageValidator::for_grammar(g).validate_session(parsed.session());
    parsed.record_results(&outcome.validation_results);

    let queued: Vec<_> = parsed
        .session()
        .contexts
        .iter()
        .flat_map(|c| &c.validation_queue)
        .collect();
    assert!(!queued.is_empty());
    assert!(queued.iter().all(|item| item.result.as_ref().is_some_and(|r| r.valid)));
}
