//! 类型化操作数提取
//!
//! 操作数在节点上以字符串存储，条件操作符通过 `Node::operand_as`
//! 按目标类型解析。解析策略集中在这里，各操作符不应自行拆字符串。

use crate::error::{Result, TreeError};
use crate::node::Node;

/// 可由操作数字符串解析的类型
///
/// 列表形式按逗号分割，逐个 token 去除首尾空白后解析。
pub trait FromOperand: Sized {
    /// 用于错误信息的类型名
    const TYPE_NAME: &'static str;

    fn parse(raw: &str) -> Option<Self>;
}

impl FromOperand for String {
    const TYPE_NAME: &'static str = "string";

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl FromOperand for i32 {
    const TYPE_NAME: &'static str = "i32";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromOperand for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromOperand for u32 {
    const TYPE_NAME: &'static str = "u32";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromOperand for u64 {
    const TYPE_NAME: &'static str = "u64";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromOperand for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromOperand for bool {
    const TYPE_NAME: &'static str = "bool";

    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Some(true),
            "0" | "f" | "false" => Some(false),
            _ => None,
        }
    }
}

impl FromOperand for Vec<i64> {
    const TYPE_NAME: &'static str = "Vec<i64>";

    fn parse(raw: &str) -> Option<Self> {
        raw.split(',')
            .map(|token| token.trim().parse().ok())
            .collect()
    }
}

impl FromOperand for Vec<String> {
    const TYPE_NAME: &'static str = "Vec<String>";

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.split(',').map(|token| token.trim().to_string()).collect())
    }
}

impl Node {
    /// 将操作数解析为目标类型
    ///
    /// 空操作数视为错误；解析失败的错误信息携带操作符名与节点种类，
    /// 便于定位问题出在哪棵树的哪个节点。
    pub fn operand_as<T: FromOperand>(&self) -> Result<T> {
        if self.operand().is_empty() {
            return Err(TreeError::OperandParse(format!(
                "operand for node [operator:{}, kind:{}] is empty",
                self.operator(),
                self.kind()
            )));
        }

        T::parse(self.operand()).ok_or_else(|| {
            TreeError::OperandParse(format!(
                "operand for node [operator:{}, kind:{}] must be {} [actual: {}]",
                self.operator(),
                self.kind(),
                T::TYPE_NAME,
                self.operand()
            ))
        })
    }
}
