//! Property-based tests for ancestor resolution and the descendant query

use hrbac::{Hrbac, Parents, RoleGraph};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashSet;

/// Random DAG: role `i` picks its parents among roles `0..i`
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..40).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..4).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

fn label(i: usize) -> String {
    format!("role_{}", i)
}

fn build(edges: &[Vec<usize>]) -> RoleGraph {
    let mut graph = RoleGraph::new();
    for (i, parents) in edges.iter().enumerate() {
        let parents: Vec<String> = parents.iter().map(|p| label(*p)).collect();
        let parents = if parents.is_empty() {
            Parents::None
        } else {
            Parents::Many(parents)
        };
        graph.add_role(&label(i), parents).unwrap();
    }
    graph
}

/// Reference closure computed by plain recursion
fn reachable(edges: &[Vec<usize>], from: usize, seen: &mut HashSet<usize>) {
    if seen.insert(from) {
        for parent in &edges[from] {
            reachable(edges, *parent, seen);
        }
    }
}

proptest! {
    #[test]
    fn test_ancestors_match_reference_closure(edges in dag()) {
        let graph = build(&edges);

        for role in 0..edges.len() {
            let mut expected = HashSet::new();
            reachable(&edges, role, &mut expected);
            let expected: HashSet<String> = expected.into_iter().map(label).collect();

            prop_assert_eq!(graph.ancestors_of([label(role)]), expected);
        }
    }

    #[test]
    fn test_ancestors_are_closed_under_parents(edges in dag()) {
        let graph = build(&edges);

        for role in 0..edges.len() {
            let ancestors = graph.ancestors_of([label(role)]);
            prop_assert!(ancestors.contains(&label(role)));
            for ancestor in &ancestors {
                for parent in graph.parents_of(ancestor).unwrap() {
                    prop_assert!(ancestors.contains(parent));
                }
            }
        }
    }

    #[test]
    fn test_is_descendant_consistent_with_ancestors(edges in dag()) {
        let hrbac: Hrbac<Value> = Hrbac::new();
        for (i, parents) in edges.iter().enumerate() {
            let parents: Vec<String> = parents.iter().map(|p| label(*p)).collect();
            let parents = if parents.is_empty() { Parents::None } else { Parents::Many(parents) };
            hrbac.add_role(&label(i), parents).unwrap();
        }

        for child in 0..edges.len() {
            let ancestors = hrbac.ancestors_of([label(child)]);
            for ancestor in 0..edges.len() {
                let expected = child != ancestor && ancestors.contains(&label(ancestor));
                prop_assert_eq!(
                    hrbac.is_descendant(&label(child), &label(ancestor)).unwrap(),
                    expected
                );
            }
        }
    }
}
