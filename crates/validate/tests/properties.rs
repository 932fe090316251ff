use braid_core::{
    ContextEngine, EmbeddedLanguageManager, EmbeddedSession, EngineConfig, GrammarRegistry,
    LoadOptions,
};
use braid_validate::{CrossLanguageValidator, ValidationOutcome};
use proptest::prelude::*;

const GRAMMAR: &str = "Grammar: Primary\nEmbeddedLanguages: Expr\n@VALIDATE { binding: Expr -> Primary }\n";

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(str::to_string)
}

/// Some definitions in the primary language followed by one embedded
/// region that uses a mix of defined and undefined names.
fn input() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(name(), 0..4),
        prop::collection::vec(name(), 1..5),
    )
        .prop_map(|(defs, uses)| {
            let mut s = String::new();
            for (i, d) in defs.iter().enumerate() {
                s.push_str(&format!("{} = {} ", d, i));
            }
            s.push_str("@CONTEXT[Expr] ");
            s.push_str(&uses.join(" + "));
            s.push_str(" @ENDCONTEXT");
            s
        })
}

fn parse(input: &str) -> Option<(EmbeddedSession, CrossLanguageValidator)> {
    let mut registry = GrammarRegistry::new();
    let (root, _) = registry.load_str(GRAMMAR, &LoadOptions::default()).ok()?;
    let grammar = registry.get(&root)?;
    let validator = CrossLanguageValidator::for_grammar(grammar);
    let engine = ContextEngine::new(&registry, EngineConfig::default());
    let mut manager = EmbeddedLanguageManager::new(engine, grammar);
    let outcome = manager.parse_with_embedded_languages(input);
    outcome
        .is_success()
        .then(|| (outcome.into_session(), validator))
}

/// Everything but wall-clock timings.
fn comparable(mut outcome: ValidationOutcome) -> ValidationOutcome {
    let m = &mut outcome.performance_metrics;
    m.total_us = 0;
    m.symbol_pass_us = 0;
    m.reference_pass_us = 0;
    m.semantic_pass_us = 0;
    m.rule_pass_us = 0;
    outcome
}

proptest! {
    #[test]
    fn repeated_validation_is_identical(text in input()) {
        let Some((session, mut validator)) = parse(&text) else {
            return Ok(());
        };
        let first = comparable(validator.validate_session(&session));
        let second = comparable(validator.validate_session(&session));
        prop_assert_eq!(&first, &second);

        let json = serde_json::to_value(&first).unwrap();
        prop_assert_eq!(json["success"].as_bool(), Some(first.success));
    }

    #[test]
    fn one_result_per_reference_and_bounded_coverage(text in input()) {
        let Some((session, mut validator)) = parse(&text) else {
            return Ok(());
        };
        let outcome = validator.validate_session(&session);
        prop_assert_eq!(
            outcome.reference_validation_results.len(),
            session.cross_language_references.len()
        );
        prop_assert!(outcome.summary.coverage <= 100.0);
        prop_assert_eq!(outcome.success, outcome.summary.errors == 0);
    }
}
