//! 集成测试共用的条件操作符
//!
//! 同一测试二进制内的用例并行执行，且注册表是进程级单例，
//! 因此所有用例都注册同一组操作符，重复注册收敛到相同状态。

use serde_json::Value;

use rule_tree::{Node, Operator, OperatorSpec, Result, TreeError, register};

/// 数量大于：操作数为整数阈值，取 value.quantity 比较
pub struct QuantityGt;

impl Operator for QuantityGt {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        // 操作数解析失败按尽力而为策略视为不满足
        let threshold = match node.operand_as::<i64>() {
            Ok(threshold) => threshold,
            Err(_) => return Ok(false),
        };

        Ok(value
            .get("quantity")
            .and_then(Value::as_i64)
            .map(|quantity| quantity > threshold)
            .unwrap_or(false))
    }
}

/// 商品命中：操作数为逗号分隔的 id 列表，取 value.productId 判断归属
pub struct ProductIdIn;

impl Operator for ProductIdIn {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        let ids = match node.operand_as::<Vec<i64>>() {
            Ok(ids) => ids,
            Err(_) => return Ok(false),
        };

        Ok(value
            .get("productId")
            .and_then(Value::as_i64)
            .map(|id| ids.contains(&id))
            .unwrap_or(false))
    }
}

/// 常量条件，用于门真值表测试
pub struct ConstCondition(pub bool);

impl Operator for ConstCondition {
    fn is_satisfied(&self, _node: &Node, _value: &Value) -> Result<bool> {
        Ok(self.0)
    }
}

/// 总是返回求值错误的条件，用于错误传播测试
pub struct FailingCondition;

impl Operator for FailingCondition {
    fn is_satisfied(&self, _node: &Node, _value: &Value) -> Result<bool> {
        Err(TreeError::Evaluation("backing store unavailable".to_string()))
    }
}

/// 注册测试全集
pub fn register_defaults() {
    register([
        OperatorSpec::new("quantity_gt", QuantityGt),
        OperatorSpec::new("product_id_in", ProductIdIn),
        OperatorSpec::new("always_true", ConstCondition(true)),
        OperatorSpec::new("always_false", ConstCondition(false)),
        OperatorSpec::new("failing", FailingCondition),
    ]);
}
