use braid_codegen::detect_cycle;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn lang(i: usize) -> String {
    format!("L{}", i)
}

/// Edges that only point from a lower to a higher index.
fn forward_edges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0usize..8, 0usize..8), 0..20).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(a, b)| a < b)
            .collect()
    })
}

fn graph(edges: &[(usize, usize)]) -> BTreeMap<String, BTreeSet<String>> {
    let mut g: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (a, b) in edges {
        g.entry(lang(*a)).or_default().insert(lang(*b));
    }
    g
}

proptest! {
    #[test]
    fn forward_only_graphs_are_acyclic(edges in forward_edges()) {
        prop_assert!(detect_cycle(&graph(&edges)).is_none());
    }

    #[test]
    fn a_back_edge_closes_a_reported_cycle(edges in forward_edges(), a in 0usize..7, span in 1usize..4) {
        let b = (a + span).min(7);
        let mut edges = edges;
        edges.push((a, b));
        edges.push((b, a));
        let g = graph(&edges);

        let cycle = detect_cycle(&g).expect("back edge must form a cycle");
        prop_assert!(cycle.len() >= 3);
        prop_assert_eq!(cycle.first(), cycle.last());
        for pair in cycle.windows(2) {
            prop_assert!(g[&pair[0]].contains(&pair[1]), "{} -> {} is not an edge", pair[0], pair[1]);
        }
    }
}
