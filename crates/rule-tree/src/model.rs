//! 持久化模型与转换
//!
//! 树以 `{id, name, active, start?, end?, result, structure}` 的 JSON
//! 文档存储，`structure` 是递归编码的根节点。模型到树的转换按
//! 深度优先规则进行：没有子节点的模型节点是条件，否则是门——
//! 除此之外不做任何猜测，操作符的归类以构建期的注册表判定为准。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::builder::{GateBuilder, NodeBuilder, TreeBuilder};
use crate::error::Result;
use crate::node::{Node, NodeKind};
use crate::tree::Tree;

/// 树的持久化形态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeModel {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub result: Value,
    pub structure: NodeModel,
}

/// 节点的持久化形态
///
/// `type` 字段是序列化时写出的冗余标注；转换只看 children 是否为空。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeModel {
    pub operator: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operand: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeModel>,
}

impl TreeModel {
    /// 从 JSON 文档解析模型
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// 序列化为 JSON 文档
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Tree {
    /// 从持久化模型重建树
    ///
    /// 全程走构建器，因此经过与手工构建完全相同的校验。
    pub fn from_model(model: &TreeModel) -> Result<Tree> {
        TreeBuilder::new(&model.name, model.result.clone())
            .with_id(&model.id)
            .with_active(model.active)
            .with_start(model.start)
            .with_end(model.end)
            .with_root(|nb| build_node(nb, &model.structure))
            .build()
    }

    /// 导出持久化模型
    pub fn to_model(&self) -> TreeModel {
        TreeModel {
            id: self.id.clone(),
            name: self.name.clone(),
            active: self.active,
            start: self.start,
            end: self.end,
            result: self.result.clone(),
            structure: node_to_model(&self.root),
        }
    }
}

fn build_node(nb: &mut NodeBuilder, model: &NodeModel) {
    if model.children.is_empty() {
        nb.as_condition(&model.operator, &model.operand);
    } else {
        nb.as_gate(&model.operator, |gb| {
            for child in &model.children {
                add_child(gb, child);
            }
        });
    }
}

fn add_child(gb: &mut GateBuilder, model: &NodeModel) {
    if model.children.is_empty() {
        gb.add_condition(&model.operator, &model.operand);
    } else {
        gb.add_gate(&model.operator, |inner| {
            for child in &model.children {
                add_child(inner, child);
            }
        });
    }
}

fn node_to_model(node: &Node) -> NodeModel {
    NodeModel {
        operator: node.operator().to_string(),
        operand: node.operand().to_string(),
        kind: Some(node.kind()),
        children: node.children().iter().map(node_to_model).collect(),
    }
}
