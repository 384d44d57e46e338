//! 遍历集成测试
//!
//! 覆盖端到端遍历场景、门真值表与生效窗口检查。

mod common;

use chrono::{Duration, Utc};
use serde_json::{Value, json};

use common::register_defaults;
use rule_tree::{Tree, TreeBuilder, TreeError};

/// and( quantity_gt("10"), or( product_id_in("1,2"), product_id_in("3") ) )
fn build_order_tree() -> Tree {
    TreeBuilder::new("order-promo", json!({"score": 42}))
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                gb.add_condition("quantity_gt", "10");
                gb.add_gate("or", |or| {
                    or.add_condition("product_id_in", "1,2");
                    or.add_condition("product_id_in", "3");
                });
            });
        })
        .build()
        .unwrap()
}

fn gate_of(gate: &str, inputs: &[bool]) -> Tree {
    TreeBuilder::new("truth-table", Value::Null)
        .with_root(|nb| {
            nb.as_gate(gate, |gb| {
                for input in inputs {
                    gb.add_condition(if *input { "always_true" } else { "always_false" }, "");
                }
            });
        })
        .build()
        .unwrap()
}

#[test]
fn test_order_tree_matches() {
    register_defaults();
    let tree = build_order_tree();

    assert!(tree.evaluate(&json!({"quantity": 11, "productId": 2})).unwrap());
}

#[test]
fn test_order_tree_product_miss() {
    register_defaults();
    let tree = build_order_tree();

    assert!(!tree.evaluate(&json!({"quantity": 11, "productId": 9})).unwrap());
}

#[test]
fn test_order_tree_quantity_short_circuits() {
    register_defaults();
    let tree = build_order_tree();

    // 外层 and 在 quantity_gt 失败处短路
    assert!(!tree.evaluate(&json!({"quantity": 5, "productId": 2})).unwrap());
}

#[test]
fn test_and_or_identity() {
    register_defaults();
    let value = json!({});

    // 同一条件重复两次，and/or 都应等于条件本身
    for condition in ["always_true", "always_false"] {
        let expected = condition == "always_true";
        for gate in ["and", "or"] {
            let tree = TreeBuilder::new("identity", Value::Null)
                .with_root(|nb| {
                    nb.as_gate(gate, |gb| {
                        gb.add_condition(condition, "");
                        gb.add_condition(condition, "");
                    });
                })
                .build()
                .unwrap();
            assert_eq!(
                tree.evaluate(&value).unwrap(),
                expected,
                "gate {gate} over two {condition}"
            );
        }
    }
}

#[test]
fn test_gate_truth_tables() {
    register_defaults();
    let value = json!({});

    let cases: Vec<(&str, Vec<bool>, bool)> = vec![
        ("and", vec![true, true, true], true),
        ("and", vec![true, false, true], false),
        ("nand", vec![false, false], true),
        ("nand", vec![true, false], false),
        ("or", vec![false, false, true], true),
        ("or", vec![false, false], false),
        ("nor", vec![false, false], true),
        ("nor", vec![false, true], false),
        // 奇数个真
        ("xor", vec![true, true, true, false], true),
        ("xor", vec![true, true], false),
        // 偶数个真（含零个）
        ("xnor", vec![true, true], true),
        ("xnor", vec![false, false], true),
        ("xnor", vec![true, false], false),
    ];

    for (gate, inputs, expected) in cases {
        let tree = gate_of(gate, &inputs);
        assert_eq!(
            tree.evaluate(&value).unwrap(),
            expected,
            "gate {gate} over {inputs:?}"
        );
    }
}

#[test]
fn test_inactive_tree_is_never_satisfied() {
    register_defaults();
    let mut tree = gate_of("and", &[true, true]);
    tree.active = false;

    assert!(!tree.evaluate(&json!({})).unwrap());
}

#[test]
fn test_future_start_is_not_satisfied() {
    register_defaults();
    let tree = TreeBuilder::new("pending", Value::Null)
        .with_start(Some(Utc::now() + Duration::hours(1)))
        .with_end(Some(Utc::now() + Duration::hours(2)))
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                gb.add_condition("always_true", "");
                gb.add_condition("always_true", "");
            });
        })
        .build()
        .unwrap();

    assert!(tree.active);
    assert!(!tree.evaluate(&json!({})).unwrap());
}

#[test]
fn test_past_end_is_not_satisfied() {
    register_defaults();
    let tree = TreeBuilder::new("expired", Value::Null)
        .with_start(Some(Utc::now() - Duration::hours(2)))
        .with_end(Some(Utc::now() - Duration::hours(1)))
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                gb.add_condition("always_true", "");
                gb.add_condition("always_true", "");
            });
        })
        .build()
        .unwrap();

    assert!(!tree.evaluate(&json!({})).unwrap());
}

#[test]
fn test_open_window_in_effect() {
    register_defaults();
    let tree = TreeBuilder::new("in-window", Value::Null)
        .with_start(Some(Utc::now() - Duration::hours(1)))
        .with_end(Some(Utc::now() + Duration::hours(1)))
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                gb.add_condition("always_true", "");
                gb.add_condition("always_true", "");
            });
        })
        .build()
        .unwrap();

    assert!(tree.evaluate(&json!({})).unwrap());
}

#[test]
fn test_operator_error_aborts_traversal() {
    register_defaults();
    // or 门短路前遇到错误子节点，错误必须向上传播而非当作 false
    let tree = TreeBuilder::new("failing", Value::Null)
        .with_root(|nb| {
            nb.as_gate("or", |gb| {
                gb.add_condition("failing", "");
                gb.add_condition("always_true", "");
            });
        })
        .build()
        .unwrap();

    let err = tree.evaluate(&json!({})).unwrap_err();
    assert!(matches!(err, TreeError::Evaluation(_)));
}

#[test]
fn test_missing_value_field_is_not_satisfied() {
    register_defaults();
    let tree = build_order_tree();

    // 运行时值缺字段时条件按尽力而为返回 false
    assert!(!tree.evaluate(&json!({})).unwrap());
}
