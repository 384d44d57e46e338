//! 流式树构建器
//!
//! 构建器持有遇到的第一个错误：一旦某步失败，后续链式调用全部
//! 变为空操作，错误只在终结的 `build()` 处统一浮出。这让递归的
//! 模型转换可以无顾虑地组合构建步骤。
//!
//! 校验规则：
//! - 条件操作符必须非空、非门名、且已注册；
//! - 门操作符必须是六个内置门之一；
//! - 门至少两个子节点；
//! - 根节点必须存在；start 不得晚于 end。

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::registry;
use crate::tree::Tree;

/// 树构建器
pub struct TreeBuilder {
    id: String,
    name: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    active: bool,
    result: Value,
    root: Option<Node>,
    err: Option<TreeError>,
}

impl TreeBuilder {
    /// 以结果负载开始构建，默认生效
    pub fn new(name: impl Into<String>, result: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            start: None,
            end: None,
            active: true,
            result,
            root: None,
            err: None,
        }
    }

    /// 覆盖自动生成的 id（从持久化模型重建时使用）
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 覆盖存储的生效标记（从持久化模型重建时使用）
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// 设置生效起点，None 为空操作
    pub fn with_start(mut self, start: Option<DateTime<Utc>>) -> Self {
        if let Some(start) = start {
            self.start = Some(start);
        }
        self
    }

    /// 设置生效终点，None 为空操作
    pub fn with_end(mut self, end: Option<DateTime<Utc>>) -> Self {
        if let Some(end) = end {
            self.end = Some(end);
        }
        self
    }

    /// 通过闭包构建根节点
    pub fn with_root(mut self, f: impl FnOnce(&mut NodeBuilder)) -> Self {
        if self.err.is_some() {
            return self;
        }

        let mut nb = NodeBuilder::new();
        f(&mut nb);
        match nb.build() {
            Ok(root) => self.root = Some(root),
            Err(e) => self.err = Some(e),
        }
        self
    }

    /// 校验并产出树
    ///
    /// 幂等：重复调用返回等价的树。
    ///
    /// 生效标记的推导规则：设置了 end 则沿用存储值；只设置了 start
    /// 则视为待生效（false，等待外部调度器激活）；两者皆无则生效。
    pub fn build(&self) -> Result<Tree> {
        if let Some(err) = &self.err {
            return Err(clone_error(err));
        }

        let root = self
            .root
            .clone()
            .ok_or_else(|| TreeError::Validation("root node is required".to_string()))?;

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(TreeError::Validation(
                    "start time cannot be after end time".to_string(),
                ));
            }
        }

        let active = if self.end.is_some() {
            self.active
        } else {
            self.start.is_none()
        };

        Ok(Tree {
            id: self.id.clone(),
            name: self.name.clone(),
            start: self.start,
            end: self.end,
            active,
            result: self.result.clone(),
            root,
        })
    }
}

/// TreeError 不派生 Clone（变体携带 serde_json::Error），
/// 粘滞错误在重复 build 时以同内容重建。
fn clone_error(err: &TreeError) -> TreeError {
    match err {
        TreeError::Validation(msg) => TreeError::Validation(msg.clone()),
        TreeError::OperatorNotFound(name) => TreeError::OperatorNotFound(name.clone()),
        TreeError::OperandParse(msg) => TreeError::OperandParse(msg.clone()),
        TreeError::Evaluation(msg) => TreeError::Evaluation(msg.clone()),
        TreeError::RegistryNotInstalled => TreeError::RegistryNotInstalled,
        TreeError::Json(e) => TreeError::Validation(e.to_string()),
    }
}

/// 节点构建器
///
/// 在条件与门之间二选一；两者都未选择时 build 失败。
pub struct NodeBuilder {
    node: Option<Node>,
    err: Option<TreeError>,
}

impl NodeBuilder {
    fn new() -> Self {
        Self {
            node: None,
            err: None,
        }
    }

    /// 构建条件节点
    ///
    /// 与门同名的操作符在此被拒绝：先问"是门吗"再问"是条件吗"。
    pub fn as_condition(&mut self, operator: &str, operand: &str) -> &mut Self {
        if self.err.is_some() {
            return self;
        }

        if operator.is_empty() {
            self.err = Some(TreeError::Validation(
                "operator is required for condition".to_string(),
            ));
            return self;
        }

        let reg = match registry::installed() {
            Ok(reg) => reg,
            Err(e) => {
                self.err = Some(e);
                return self;
            }
        };

        if reg.is_gate(operator) {
            self.err = Some(TreeError::Validation(format!(
                "operator {operator} is a gate, not a condition"
            )));
            return self;
        }
        if !reg.is_condition(operator) {
            self.err = Some(TreeError::Validation(format!(
                "condition operator {operator} is not registered"
            )));
            return self;
        }

        self.node = Some(Node::condition(operator, operand));
        self
    }

    /// 构建门节点，闭包填充子节点
    pub fn as_gate(&mut self, gate: &str, f: impl FnOnce(&mut GateBuilder)) -> &mut Self {
        if self.err.is_some() {
            return self;
        }

        let reg = match registry::installed() {
            Ok(reg) => reg,
            Err(e) => {
                self.err = Some(e);
                return self;
            }
        };

        if !reg.is_gate(gate) {
            self.err = Some(TreeError::Validation(format!(
                "invalid gate operator {gate}"
            )));
            return self;
        }

        let mut gb = GateBuilder::new(gate);
        f(&mut gb);
        match gb.build() {
            Ok(node) => self.node = Some(node),
            Err(e) => self.err = Some(e),
        }
        self
    }

    fn build(self) -> Result<Node> {
        if let Some(err) = self.err {
            return Err(err);
        }
        self.node.ok_or_else(|| {
            TreeError::Validation(
                "node type must be specified. select either condition or gate".to_string(),
            )
        })
    }
}

/// 门构建器，累积子节点
pub struct GateBuilder {
    gate: String,
    children: Vec<Node>,
    err: Option<TreeError>,
}

impl GateBuilder {
    fn new(gate: &str) -> Self {
        Self {
            gate: gate.to_string(),
            children: Vec::new(),
            err: None,
        }
    }

    /// 追加条件子节点
    pub fn add_condition(&mut self, operator: &str, operand: &str) -> &mut Self {
        if self.err.is_some() {
            return self;
        }

        let mut nb = NodeBuilder::new();
        nb.as_condition(operator, operand);
        match nb.build() {
            Ok(node) => self.children.push(node),
            Err(e) => self.err = Some(e),
        }
        self
    }

    /// 追加门子节点
    pub fn add_gate(&mut self, gate: &str, f: impl FnOnce(&mut GateBuilder)) -> &mut Self {
        if self.err.is_some() {
            return self;
        }

        let mut nb = NodeBuilder::new();
        nb.as_gate(gate, f);
        match nb.build() {
            Ok(node) => self.children.push(node),
            Err(e) => self.err = Some(e),
        }
        self
    }

    fn build(self) -> Result<Node> {
        if let Some(err) = self.err {
            return Err(err);
        }
        if self.gate.is_empty() {
            return Err(TreeError::Validation("gate operator is required".to_string()));
        }
        if self.children.len() < 2 {
            return Err(TreeError::Validation(
                "gate must have at least 2 children".to_string(),
            ));
        }
        Ok(Node::gate(self.gate, self.children))
    }
}
