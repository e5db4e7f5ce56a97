//! Property checks for closure tables over generated hierarchies.
//!
//! Each hierarchy is a random DAG where every concept only points at
//! concepts created before it, so no cycles can occur.

use snomed_hierarchy::{
    CancellationToken, ClosureBuilder, ClosureConfig, ClosureTable, Concept, ConceptGraph, GraphConfig,
    HierarchyError, HierarchyTraverser, Relationship,
};

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// `n` concepts with SCTIDs shuffled relative to creation order, each
/// below one to three earlier concepts.
fn random_dag(seed: u64, n: u64) -> (Vec<Concept>, Vec<Relationship>) {
    let mut rng = Lcg(seed);
    let id = |i: u64| 1_000_000 + (i * 7919) % 100_003;

    let concepts = (0..n).map(|i| Concept::new(id(i))).collect();
    let mut relationships = Vec::new();
    let mut rel_id = 1;
    for i in 1..n {
        let parents = 1 + rng.below(3);
        for _ in 0..parents {
            let parent = rng.below(i);
            relationships.push(Relationship::is_a(rel_id, id(i), id(parent)));
            rel_id += 1;
        }
    }
    (concepts, relationships)
}

fn build(graph: &ConceptGraph, config: ClosureConfig) -> ClosureTable {
    ClosureBuilder::new(config)
        .build(graph, &CancellationToken::new())
        .unwrap()
}

fn load(seed: u64, n: u64) -> ConceptGraph {
    let (concepts, relationships) = random_dag(seed, n);
    ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap()
}

fn ids(graph: &ConceptGraph) -> Vec<u64> {
    graph.concepts().map(|c| c.id).collect()
}

#[test]
fn test_ancestors_match_live_traversal() {
    let graph = load(7, 300);
    let closure = build(&graph, ClosureConfig::default());
    let traverser = HierarchyTraverser::new(&graph);

    for id in ids(&graph) {
        let mut expected: Vec<u64> = traverser.ancestors(id).into_iter().collect();
        expected.sort_unstable();
        assert_eq!(closure.ancestors(id).unwrap().to_sorted_ids(), expected, "ancestors of {id}");

        let mut expected: Vec<u64> = traverser.descendants(id).into_iter().collect();
        expected.sort_unstable();
        assert_eq!(closure.descendants(id).unwrap().to_sorted_ids(), expected, "descendants of {id}");
    }
}

#[test]
fn test_transitive_and_irreflexive() {
    let graph = load(11, 200);
    let closure = build(&graph, ClosureConfig::default());
    let all = ids(&graph);

    for &a in &all {
        assert!(!closure.is_ancestor_of(a, a));
        let ancestors = closure.ancestors(a).unwrap();
        for b in ancestors.iter() {
            // Everything above an ancestor is above `a` too
            for c in closure.ancestors(b).unwrap().iter() {
                assert!(closure.is_ancestor_of(c, a), "{c} > {b} > {a}");
            }
            // Strict order: never both directions
            assert!(!closure.is_ancestor_of(a, b));
        }
    }
}

#[test]
fn test_descendants_mirror_ancestors() {
    let graph = load(23, 150);
    let closure = build(&graph, ClosureConfig::default());
    let all = ids(&graph);

    for &a in &all {
        for &b in &all {
            let down = closure.descendants(a).unwrap().contains(b);
            assert_eq!(down, closure.is_ancestor_of(a, b));
        }
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let graph = load(42, 250);
    let first = build(&graph, ClosureConfig::default());
    let second = build(&graph, ClosureConfig::default());
    let sequential = build(&graph, ClosureConfig::default().with_parallel(false));

    for index in 0..graph.concept_count() as u32 {
        assert_eq!(first.ancestor_row(index), second.ancestor_row(index));
        assert_eq!(first.ancestor_row(index), sequential.ancestor_row(index));
        assert_eq!(first.descendant_row(index), sequential.descendant_row(index));
    }
}

#[test]
fn test_input_order_does_not_matter() {
    let (concepts, relationships) = random_dag(5, 120);
    let forward = ConceptGraph::load(concepts.clone(), relationships.clone(), &GraphConfig::default()).unwrap();
    let reversed = ConceptGraph::load(
        concepts.into_iter().rev(),
        relationships.into_iter().rev(),
        &GraphConfig::default(),
    )
    .unwrap();

    let a = build(&forward, ClosureConfig::default());
    let b = build(&reversed, ClosureConfig::default());
    for id in ids(&forward) {
        assert_eq!(
            a.ancestors(id).unwrap().to_sorted_ids(),
            b.ancestors(id).unwrap().to_sorted_ids()
        );
        assert_eq!(a.depth(id), b.depth(id));
    }
}

#[test]
fn test_back_edge_makes_cycle() {
    let (concepts, mut relationships) = random_dag(9, 50);
    let root = concepts[0].id;
    let deepest = relationships.last().unwrap().source_id;
    relationships.push(Relationship::is_a(9_999, root, deepest));

    let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();
    let err = ClosureBuilder::new(ClosureConfig::default())
        .build(&graph, &CancellationToken::new())
        .err()
        .unwrap();
    assert!(matches!(err, HierarchyError::CycleDetected { .. }));
}
