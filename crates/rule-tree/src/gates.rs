//! 门操作符
//!
//! 六个内置布尔组合器。每个门通过一次性游标消费子节点结果，
//! 子节点从左到右求值；子节点返回的错误立即中止本门并向上传播。
//!
//! 真值表与短路规则：
//!
//! | 门   | 为真条件          | 短路点           |
//! |------|-------------------|------------------|
//! | and  | 所有子节点为真    | 第一个假         |
//! | nand | 所有子节点为假    | 第一个真（得假） |
//! | or   | 任一子节点为真    | 第一个真         |
//! | nor  | 所有子节点为假    | 第一个真（得假） |
//! | xor  | 奇数个子节点为真  | 无，须全量计数   |
//! | xnor | 偶数个子节点为真  | 无，须全量计数   |

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::node::Node;
use crate::operator::Operator;

pub const AND_GATE: &str = "and";
pub const NAND_GATE: &str = "nand";
pub const OR_GATE: &str = "or";
pub const NOR_GATE: &str = "nor";
pub const XOR_GATE: &str = "xor";
pub const XNOR_GATE: &str = "xnor";

/// 内置门操作符表
pub(crate) fn gate_table() -> HashMap<&'static str, Arc<dyn Operator>> {
    HashMap::from([
        (AND_GATE, Arc::new(And) as Arc<dyn Operator>),
        (NAND_GATE, Arc::new(Nand) as Arc<dyn Operator>),
        (OR_GATE, Arc::new(Or) as Arc<dyn Operator>),
        (NOR_GATE, Arc::new(Nor) as Arc<dyn Operator>),
        (XOR_GATE, Arc::new(Xor) as Arc<dyn Operator>),
        (XNOR_GATE, Arc::new(Xnor) as Arc<dyn Operator>),
    ])
}

pub struct And;

impl Operator for And {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        for child in node.cursor() {
            if !child.is_satisfied(value)? {
                return Ok(false);
            }
        }
        // 所有子节点均满足
        Ok(true)
    }
}

pub struct Nand;

impl Operator for Nand {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        for child in node.cursor() {
            if child.is_satisfied(value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct Or;

impl Operator for Or {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        for child in node.cursor() {
            if child.is_satisfied(value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct Nor;

impl Operator for Nor {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        for child in node.cursor() {
            if child.is_satisfied(value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct Xor;

impl Operator for Xor {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        let mut true_count = 0usize;
        for child in node.cursor() {
            if child.is_satisfied(value)? {
                true_count += 1;
            }
        }
        // 多操作数 XOR：奇数个子节点为真时为真
        Ok(true_count % 2 == 1)
    }
}

pub struct Xnor;

impl Operator for Xnor {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool> {
        let mut true_count = 0usize;
        for child in node.cursor() {
            if child.is_satisfied(value)? {
                true_count += 1;
            }
        }
        // 多操作数 XNOR：偶数个（含零个）子节点为真时为真
        Ok(true_count % 2 == 0)
    }
}
