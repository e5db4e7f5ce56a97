use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snomed_hierarchy::{
    CancellationToken, ClosureBuilder, ClosureConfig, Concept, ConceptGraph, GraphConfig, Relationship, SctId,
};

/// A layered poly-hierarchy: each concept has up to three parents in the band above.
fn layered_graph(bands: u64, width: u64) -> ConceptGraph {
    let mut concepts = vec![Concept::new(1)];
    let mut relationships = Vec::new();
    let mut previous: Vec<SctId> = vec![1];
    let mut rel_id = 1;

    for band in 1..=bands {
        let current: Vec<SctId> = (0..width).map(|j| band * 1_000_000 + j).collect();
        for (j, &id) in current.iter().enumerate() {
            concepts.push(Concept::new(id));
            for k in 0..3 {
                let parent = previous[(j * 7 + k) % previous.len()];
                relationships.push(Relationship::is_a(rel_id, id, parent));
                rel_id += 1;
            }
        }
        previous = current;
    }

    ConceptGraph::load(concepts, relationships, &GraphConfig::default()).expect("valid benchmark graph")
}

fn bench_closure_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("closure_build");
    group.sample_size(10);

    for &(bands, width) in &[(8u64, 500u64), (12, 2_000)] {
        let graph = layered_graph(bands, width);
        let label = format!("{}x{}", bands, width);

        for parallel in [false, true] {
            let config = ClosureConfig::new().with_parallel(parallel);
            let name = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(name, &label), &graph, |b, graph| {
                b.iter(|| {
                    ClosureBuilder::new(config.clone())
                        .build(black_box(graph), &CancellationToken::new())
                        .expect("acyclic")
                })
            });
        }
    }

    group.finish();
}

fn bench_subsumption(c: &mut Criterion) {
    let graph = layered_graph(10, 1_000);
    let closure = ClosureBuilder::default()
        .build(&graph, &CancellationToken::new())
        .expect("acyclic");

    c.bench_function("is_ancestor_of", |b| {
        b.iter(|| closure.is_ancestor_of(black_box(1), black_box(10_000_500)))
    });
}

criterion_group!(benches, bench_closure_build, bench_subsumption);
criterion_main!(benches);
