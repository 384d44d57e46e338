//! 弹性 Kafka 消费客户端
//!
//! 在 rdkafka 之上提供长驻消费会话：按 topic 注册处理器、
//! 自动重连并重订阅、逐消息的请求标识与延迟指标、
//! 处理失败不提交位点（依赖重平衡后重投）。

pub mod classify;
pub mod consumer;
pub mod error;
pub mod handlers;
pub mod message;

pub use classify::{ErrorDisposition, classify};
pub use consumer::Consumer;
pub use error::{KafkaClientError, Result};
pub use handlers::{HandlerContext, HandlerFn, HandlerRegistry};
pub use message::{Message, TimestampKind};
