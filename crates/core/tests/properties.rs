//! Property tests for scope balance, inheritance precedence and lookup
//! caching.

use braid_core::{
    ContextEngine, ContextId, ContextRule, EngineConfig, GrammarRegistry, GrammarSpec,
    RuleAction, RuleCondition, ScopeKind,
};
use proptest::prelude::*;

/// Well-formed input: identifiers and balanced `{ }` blocks.
fn balanced_input() -> impl Strategy<Value = String> {
    let leaf = "v[0-9]{1,3}".prop_map(|s| s);
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(|items| format!("{{ {} }}", items.join(" ")))
    })
}

fn region_rule(scope: ScopeKind, priority: i32) -> ContextRule {
    ContextRule::new(
        "region",
        RuleCondition::TokenIs("region".into()),
        RuleAction::ChangeScope(scope),
        priority,
    )
}

fn filler_rule(n: usize) -> ContextRule {
    ContextRule::new(
        &format!("filler{}", n),
        RuleCondition::TokenIs(format!("never{}", n)),
        RuleAction::ChangeScope(ScopeKind::Block),
        0,
    )
}

proptest! {
    #[test]
    fn well_formed_input_ends_at_depth_zero(parts in prop::collection::vec(balanced_input(), 1..6)) {
        let input = parts.join(" ");
        let registry = GrammarRegistry::new();
        let mut engine = ContextEngine::new(&registry, EngineConfig::default());
        let outcome = engine.parse_with_context(&GrammarSpec::new("Lang"), &input);
        prop_assert!(outcome.is_success(), "{:?}", outcome.errors());
        let session = outcome.session();
        prop_assert_eq!(session.final_depth, 0);
        prop_assert_eq!(session.contexts.len(), 1 + input.matches('{').count());
        for ctx in &session.contexts[1..] {
            let parent = ctx.parent.and_then(|p| session.context(p)).unwrap();
            prop_assert_eq!(ctx.depth, parent.depth + 1);
        }
    }

    #[test]
    fn derived_rule_wins_regardless_of_priority_or_order(
        base_priority in -100i32..100,
        derived_priority in -100i32..100,
        fillers_before in 0usize..3,
        fillers_after in 0usize..3,
    ) {
        let mut registry = GrammarRegistry::new();
        registry.insert(GrammarSpec::new("Base").with_rule(region_rule(ScopeKind::Class, base_priority)));

        let mut derived = GrammarSpec::new("Derived").with_bases(&["Base"]);
        for n in 0..fillers_before {
            derived = derived.with_rule(filler_rule(n));
        }
        derived = derived.with_rule(region_rule(ScopeKind::Function, derived_priority));
        for n in 0..fillers_after {
            derived = derived.with_rule(filler_rule(10 + n));
        }

        let mut engine = ContextEngine::new(&registry, EngineConfig::default());
        let outcome = engine.parse_with_context(&derived, "region { }");
        prop_assert!(outcome.is_success());
        prop_assert_eq!(&outcome.session().contexts[1].scope, &ScopeKind::Function);
        let rule = &outcome.session().contexts[0].rules["region"];
        prop_assert!(!rule.inherited);
    }

    #[test]
    fn repeated_lookups_are_identical_and_hit_the_cache(
        names in prop::collection::btree_set("n[0-9]{1,4}", 1..6),
        repeats in 2usize..6,
    ) {
        let input = names
            .iter()
            .map(|n| format!("{} = 1", n))
            .collect::<Vec<_>>()
            .join(" ")
            + " { }";
        let registry = GrammarRegistry::new();
        let mut engine = ContextEngine::new(&registry, EngineConfig::default());
        let outcome = engine.parse_with_context(&GrammarSpec::new("Lang"), &input);
        prop_assert!(outcome.is_success());

        for name in &names {
            let first = engine.lookup(ContextId(1), name);
            prop_assert!(first.is_some());
            for _ in 1..repeats {
                let hits = engine.cache_stats().hits;
                let again = engine.lookup(ContextId(1), name);
                prop_assert_eq!(&again, &first);
                prop_assert!(engine.cache_stats().hits > hits);
            }
        }
    }
}
