//! RabbitMQ 客户端错误类型
//!
//! `RejectError` 是唯一受支持的"毒丸"信号：处理器把永远不可能
//! 成功的消息包进它，消费管线据此 reject（不重入队），
//! 消息走死信路由而非无限重试。

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RabbitError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// 当前没有可用连接（尚未拨号或已断开）
    #[error("no active connection")]
    NotConnected,

    /// 发布者通道池容量为 0，未启用发布功能
    #[error("publisher channel pool is not configured")]
    PublisherNotConfigured,
}

pub type Result<T> = std::result::Result<T, RabbitError>;

/// 毒丸错误包装
///
/// 处理器返回 `RejectError::wrap(err)` 表示该消息永远无法成功，
/// 消费管线将 reject（requeue=false）而非 nack。
#[derive(Debug)]
pub struct RejectError(anyhow::Error);

impl RejectError {
    /// 把任意错误标记为毒丸
    pub fn wrap(err: impl Into<anyhow::Error>) -> anyhow::Error {
        anyhow::Error::new(Self(err.into()))
    }
}

impl fmt::Display for RejectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reject error: {}", self.0)
    }
}

impl std::error::Error for RejectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// 错误链中任一环是 RejectError 即视为毒丸
///
/// 处理器可能在 RejectError 外再包一层上下文，因此沿整条链检查。
pub fn is_reject_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<RejectError>().is_some())
}
