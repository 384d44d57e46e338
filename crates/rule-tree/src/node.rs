//! 树节点
//!
//! 节点一经构建即不可变。门节点持有有序子节点序列，
//! 条件节点持有操作数字符串，两者都通过操作符名与注册表关联。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TreeError};
use crate::registry;

/// 节点种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Gate,
    Condition,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gate => write!(f, "gate"),
            Self::Condition => write!(f, "condition"),
        }
    }
}

/// 决策树节点
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    operator: String,
    operand: String,
    children: Vec<Node>,
}

impl Node {
    /// 构造条件节点，只应由 builder 在校验后调用
    pub(crate) fn condition(operator: impl Into<String>, operand: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Condition,
            operator: operator.into(),
            operand: operand.into(),
            children: Vec::new(),
        }
    }

    /// 构造门节点，只应由 builder 在校验后调用
    pub(crate) fn gate(operator: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Gate,
            operator: operator.into(),
            operand: String::new(),
            children,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn operand(&self) -> &str {
        &self.operand
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// 一次性前向子节点游标
    ///
    /// 条件节点不产出任何子节点。门操作符通过游标逐个消费子节点结果，
    /// 不得假设游标可重置。
    pub fn cursor(&self) -> ChildCursor<'_> {
        ChildCursor {
            node: self,
            visited: 0,
        }
    }

    /// 对运行时值求值
    ///
    /// 经注册表解析操作符名后委托给对应实现，
    /// 未注册的操作符名中止遍历。
    pub fn is_satisfied(&self, value: &Value) -> Result<bool> {
        let reg = registry::installed()?;
        let op = reg
            .get(&self.operator)
            .ok_or_else(|| TreeError::OperatorNotFound(self.operator.clone()))?;
        op.is_satisfied(self, value)
    }
}

/// 单次使用的前向子节点游标
pub struct ChildCursor<'a> {
    node: &'a Node,
    visited: usize,
}

impl<'a> Iterator for ChildCursor<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        // 条件节点没有可遍历的子节点
        if self.node.kind == NodeKind::Condition {
            return None;
        }
        let child = self.node.children.get(self.visited)?;
        self.visited += 1;
        Some(child)
    }
}
