//! 操作符注册表
//!
//! 进程级单例：门操作符表内置且不可变，条件操作符表由每次
//! `register` 调用整体替换。注册应在进程启动、任何遍历开始之前完成；
//! 遍历期间再注册属未定义行为。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{Result, TreeError};
use crate::gates;
use crate::operator::Operator;

/// 未绑定的条件操作符规格
///
/// 仅在传入 `register` 后生效。
pub struct OperatorSpec {
    name: String,
    operator: Arc<dyn Operator>,
}

impl OperatorSpec {
    pub fn new(name: impl Into<String>, operator: impl Operator + 'static) -> Self {
        Self {
            name: name.into(),
            operator: Arc::new(operator),
        }
    }
}

/// 分类注册表
///
/// 门与条件分表存放，查找时门表优先，因此与门同名的条件永远不可达，
/// 构建器也会在校验阶段直接拒绝这类名字。
pub struct Registry {
    gates: HashMap<&'static str, Arc<dyn Operator>>,
    conditions: HashMap<String, Arc<dyn Operator>>,
}

impl Registry {
    fn new(specs: impl IntoIterator<Item = OperatorSpec>) -> Self {
        let mut conditions: HashMap<String, Arc<dyn Operator>> = HashMap::new();
        for spec in specs {
            conditions.insert(spec.name, spec.operator);
        }
        Self {
            gates: gates::gate_table(),
            conditions,
        }
    }

    /// O(1) 查找，门表优先
    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.gates
            .get(name)
            .or_else(|| self.conditions.get(name))
            .cloned()
    }

    pub fn is_gate(&self, name: &str) -> bool {
        self.gates.contains_key(name)
    }

    pub fn is_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn gate_operators(&self) -> Vec<String> {
        self.gates.keys().map(|k| k.to_string()).collect()
    }

    pub fn condition_operators(&self) -> Vec<String> {
        self.conditions.keys().cloned().collect()
    }
}

/// 已安装的注册表
///
/// 写入只发生在 `register`，之后读者克隆 Arc 即可无锁并发使用。
static INSTALLED: RwLock<Option<Arc<Registry>>> = RwLock::new(None);

/// 注册条件操作符并安装注册表
///
/// 条件表被整体替换：未出现在本次调用中的旧条件随之失效。
/// 门表始终保留。
pub fn register(specs: impl IntoIterator<Item = OperatorSpec>) {
    let registry = Arc::new(Registry::new(specs));
    info!(
        conditions = registry.conditions.len(),
        gates = registry.gates.len(),
        "操作符注册表已安装"
    );
    *INSTALLED.write() = Some(registry);
}

/// 取当前安装的注册表
pub fn installed() -> Result<Arc<Registry>> {
    INSTALLED
        .read()
        .clone()
        .ok_or(TreeError::RegistryNotInstalled)
}
