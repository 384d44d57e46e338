//! 注册表生命周期测试
//!
//! 注册表是进程级单例且本用例要整体替换条件集，
//! 因此全部断言按顺序放在同一个测试函数里，避免并行干扰。

use serde_json::{Value, json};

use rule_tree::{
    Node, Operator, OperatorSpec, Result, Tree, TreeBuilder, TreeError, register, registry,
};

struct ConstCondition(bool);

impl Operator for ConstCondition {
    fn is_satisfied(&self, _node: &Node, _value: &Value) -> Result<bool> {
        Ok(self.0)
    }
}

#[test]
fn test_registry_lifecycle() {
    // 1. 未安装注册表时构建失败
    let err = TreeBuilder::new("too-early", Value::Null)
        .with_root(|nb| {
            nb.as_condition("cond_a", "");
        })
        .build()
        .unwrap_err();
    assert!(matches!(err, TreeError::RegistryNotInstalled));

    // 2. 注册集合 A
    register([
        OperatorSpec::new("cond_a", ConstCondition(true)),
        OperatorSpec::new("cond_b", ConstCondition(false)),
    ]);

    let reg = registry::installed().unwrap();
    assert!(reg.is_condition("cond_a"));
    assert!(reg.is_condition("cond_b"));
    assert!(reg.is_gate("and"));
    assert!(!reg.is_gate("cond_a"));
    assert!(!reg.is_condition("and"));

    let tree = TreeBuilder::new("with-a", json!({"score": 1}))
        .with_root(|nb| {
            nb.as_gate("and", |gb| {
                gb.add_condition("cond_a", "");
                gb.add_condition("cond_a", "");
            });
        })
        .build()
        .unwrap();
    assert!(tree.evaluate(&json!({})).unwrap());

    // 3. 用集合 B 整体替换：A 的条件消失，门保留
    register([OperatorSpec::new("cond_c", ConstCondition(true))]);

    let reg = registry::installed().unwrap();
    assert!(!reg.is_condition("cond_a"));
    assert!(!reg.is_condition("cond_b"));
    assert!(reg.is_condition("cond_c"));

    let mut gates = reg.gate_operators();
    gates.sort();
    assert_eq!(gates, vec!["and", "nand", "nor", "or", "xnor", "xor"]);
    assert_eq!(reg.condition_operators(), vec!["cond_c".to_string()]);

    // 4. 替换前构建的树在遍历时命中 operator-not-found
    let err = tree.evaluate(&json!({})).unwrap_err();
    match err {
        TreeError::OperatorNotFound(name) => assert_eq!(name, "cond_a"),
        other => panic!("expected operator-not-found, got {other:?}"),
    }

    // 5. 已失效的条件名也无法再通过构建器校验
    let err = TreeBuilder::new("stale", Value::Null)
        .with_root(|nb| {
            nb.as_condition("cond_a", "");
        })
        .build()
        .unwrap_err();
    assert!(matches!(err, TreeError::Validation(_)));

    // 6. 模型重建同样依赖当前注册表
    let model = tree.to_model();
    assert!(Tree::from_model(&model).is_err());
}
