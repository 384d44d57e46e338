//! 决策树遍历基准测试
//!
//! 覆盖浅层与深层嵌套门的遍历开销，以及模型重建开销。

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};

use rule_tree::{Node, Operator, OperatorSpec, Result, Tree, TreeBuilder, register};

struct QuantityGt;

impl Operator for QuantityGt {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        let threshold = node.operand_as::<i64>()?;
        Ok(value
            .get("quantity")
            .and_then(Value::as_i64)
            .map(|quantity| quantity > threshold)
            .unwrap_or(false))
    }
}

fn register_operators() {
    register([OperatorSpec::new("quantity_gt", QuantityGt)]);
}

/// 宽度为 breadth 的单层 and 树
fn build_flat_tree(breadth: usize) -> Tree {
    TreeBuilder::new("flat", Value::Null)
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                for i in 0..breadth {
                    gb.add_condition("quantity_gt", &i.to_string());
                }
            });
        })
        .build()
        .unwrap()
}

/// depth 层嵌套、每层一个 or 门的树
fn build_nested_tree(depth: usize) -> Tree {
    fn add_level(gb: &mut rule_tree::GateBuilder, depth: usize) {
        gb.add_condition("quantity_gt", "10");
        if depth == 0 {
            gb.add_condition("quantity_gt", "20");
        } else {
            gb.add_gate("or", |inner| add_level(inner, depth - 1));
        }
    }

    TreeBuilder::new("nested", Value::Null)
        .with_root(|nb| {
            nb.as_gate("or", |gb| add_level(gb, depth));
        })
        .build()
        .unwrap()
}

fn bench_flat_traversal(c: &mut Criterion) {
    register_operators();
    let value = json!({"quantity": 1_000_000});

    let mut group = c.benchmark_group("flat_traversal");
    for breadth in [4usize, 16, 64] {
        let tree = build_flat_tree(breadth);
        group.bench_with_input(BenchmarkId::from_parameter(breadth), &tree, |b, tree| {
            b.iter(|| black_box(tree.evaluate(black_box(&value)).unwrap()));
        });
    }
    group.finish();
}

fn bench_nested_traversal(c: &mut Criterion) {
    register_operators();
    let value = json!({"quantity": 5});

    let mut group = c.benchmark_group("nested_traversal");
    for depth in [4usize, 16, 64] {
        let tree = build_nested_tree(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &tree, |b, tree| {
            b.iter(|| black_box(tree.evaluate(black_box(&value)).unwrap()));
        });
    }
    group.finish();
}

fn bench_model_rebuild(c: &mut Criterion) {
    register_operators();
    let model = build_nested_tree(16).to_model();

    c.bench_function("model_rebuild_depth_16", |b| {
        b.iter(|| black_box(Tree::from_model(black_box(&model)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_flat_traversal,
    bench_nested_traversal,
    bench_model_rebuild
);
criterion_main!(benches);
