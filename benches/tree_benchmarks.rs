//! Benchmarks for the tree engine
//!
//! Measures performance of:
//! - Pre-order and post-order traversal
//! - Traversal while the visitor edits the tree
//! - Pattern matching and rule rewriting
//! - Mutation batches against wide child lists

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use sanitree::ir::quasi::{Pattern, Rewriter, Rule, RuleSet, parse_tree};
use sanitree::ir::{KindTag, Node, NodeKind, NodeRef, visitor_fn};

// ============================================================================
// Sample trees
// ============================================================================

/// A block of `count` statements mixing calls, assignments and conditionals.
fn sample_program(count: usize) -> NodeRef {
    let mut source = String::from("(Block");
    for i in 0..count {
        let stmt = match i % 3 {
            0 => format!("(ExpressionStmt (Operation call eval (Operation + \"x\" (NumberLiteral {}))))", i),
            1 => format!("(Declaration (Identifier v{}) (Operation * (Operation + a 0) b))", i),
            _ => format!("(Conditional (Operation < i (NumberLiteral {})) (Block (ExpressionStmt (Operation = i 0))))", i),
        };
        source.push(' ');
        source.push_str(&stmt);
    }
    source.push(')');
    parse_tree(&source).unwrap()
}

fn rules() -> RuleSet {
    RuleSet::new()
        .with_rule(Rule::parse("guard-eval", "(Operation call eval @args*)", "(Operation call (Operation . __safe eval) @args*)").unwrap())
        .with_rule(Rule::parse("fold-add-zero", "(Operation + @x 0)", "@x").unwrap())
}

// ============================================================================
// Traversal
// ============================================================================

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    for size in [10, 100, 1000] {
        let tree = sample_program(size);

        group.bench_with_input(BenchmarkId::new("pre_order", size), &tree, |b, tree| {
            b.iter(|| {
                let mut count = 0usize;
                tree.accept_pre_order(
                    &mut visitor_fn(|_| {
                        count += 1;
                        true
                    }),
                    None,
                );
                black_box(count)
            })
        });

        group.bench_with_input(BenchmarkId::new("post_order", size), &tree, |b, tree| {
            b.iter(|| {
                let mut deepest = 0usize;
                tree.accept_post_order(
                    &mut visitor_fn(|chain| {
                        deepest = deepest.max(chain.depth());
                        true
                    }),
                    None,
                );
                black_box(deepest)
            })
        });

        // Removes every conditional while walking, forcing cursor resyncs.
        group.bench_with_input(BenchmarkId::new("pre_order_with_removal", size), &size, |b, &size| {
            b.iter_batched(
                || sample_program(size),
                |tree| {
                    tree.accept_pre_order(
                        &mut visitor_fn(|chain| {
                            if chain.node().tag() == KindTag::Conditional {
                                let _ = chain.remove();
                                return false;
                            }
                            true
                        }),
                        None,
                    );
                    black_box(tree.child_count())
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Matching and rewriting
// ============================================================================

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");
    let pattern = Pattern::parse("(Operation call eval @args*)").unwrap();
    let hit = parse_tree("(Operation call eval a b c)").unwrap();
    let miss = parse_tree("(Operation call evaluate a b c)").unwrap();
    let repeated = Pattern::parse("(Operation + @x @x)").unwrap();
    let deep = sample_program(50);
    let pair = Node::new(NodeKind::Operation(sanitree::ir::Operator::Add), [deep.deep_clone(), deep.deep_clone()]);

    group.bench_function("spread_hit", |b| b.iter(|| black_box(pattern.match_node(&hit))));
    group.bench_function("spread_miss", |b| b.iter(|| black_box(pattern.match_node(&miss))));
    if let Ok(pair) = pair {
        group.bench_function("repeated_hole_deep_equality", |b| b.iter(|| black_box(repeated.match_node(&pair))));
    }

    let rules = rules();
    for size in [10, 100] {
        group.bench_with_input(BenchmarkId::new("rewrite_program", size), &size, |b, &size| {
            b.iter_batched(
                || sample_program(size),
                |tree| black_box(Rewriter::new(&rules).rewrite(&tree).map(|outcome| outcome.applied.len())),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Mutation
// ============================================================================

fn bench_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation");

    group.bench_function("append_1000", |b| {
        b.iter(|| {
            let block = Node::new(NodeKind::Block, []).unwrap();
            for _ in 0..1000 {
                let _ = block.append_child(Node::noop());
            }
            black_box(block.child_count())
        })
    });

    group.bench_function("batch_insert_remove_wide", |b| {
        b.iter_batched(
            || sample_program(500),
            |tree| {
                let middle = tree.child(250).unwrap();
                let result = tree.mutate().insert_before(Node::noop(), Some(&middle)).remove_child(&middle).execute();
                black_box(result)
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1));
    targets =
        bench_traversal,
        bench_matching,
        bench_mutation
}

criterion_main!(benches);
