//! 决策树
//!
//! 树在节点之上附加生效窗口与结果负载。遍历先做窗口检查，
//! 再委托根节点求值。树的生命周期（待生效 → 生效 → 过期）
//! 完全由字段推导，引擎本身无状态；待生效到生效的切换
//! 由外部调度进程负责。

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::node::Node;

/// 决策树
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub id: String,
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub active: bool,
    /// 遍历结论为真时附带的结果负载，引擎不解释其内容
    pub result: Value,
    pub root: Node,
}

impl Tree {
    /// 对运行时值遍历整棵树
    ///
    /// 未生效、尚未到 start 或已过 end 的树一律返回 false，
    /// 不触发任何节点求值。
    pub fn evaluate(&self, value: &Value) -> Result<bool> {
        if !self.active {
            return Ok(false);
        }

        let now = Utc::now();
        if let Some(start) = self.start {
            if now < start {
                return Ok(false);
            }
        }
        if let Some(end) = self.end {
            if now > end {
                return Ok(false);
            }
        }

        self.root.is_satisfied(value)
    }
}
