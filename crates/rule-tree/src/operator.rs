//! 操作符能力定义
//!
//! 门操作符与条件操作符共用同一个能力集：给定节点与运行时值，
//! 判定是否满足。实现必须是无状态、可重入的纯值。

use serde_json::Value;

use crate::error::Result;
use crate::node::Node;

/// 命名纯谓词
///
/// 门操作符消费节点的子节点序列，从不读取操作数；
/// 条件操作符解析节点的操作数字符串并与运行时值比较。
/// 解析失败时条件按尽力而为策略返回 false，除非实现显式返回错误；
/// 操作符错误会中止整棵树的遍历并向调用方传播。
pub trait Operator: Send + Sync {
    fn is_satisfied(&self, node: &Node, value: &Value) -> Result<bool>;
}
