//! 决策树错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// 构建期校验失败，由 `build()` 统一抛出
    #[error("validation failed: {0}")]
    Validation(String),

    /// 遍历时遇到注册表中不存在的操作符名
    #[error("operator {0} not found")]
    OperatorNotFound(String),

    /// 类型化操作数解析失败
    #[error("operand parse failed: {0}")]
    OperandParse(String),

    /// 条件操作符自身的求值错误（如外部数据不可用）
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// 尚未调用 register 安装操作符注册表
    #[error("operator registry is not installed")]
    RegistryNotInstalled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TreeError>;
