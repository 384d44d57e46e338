//! 弹性 RabbitMQ 客户端
//!
//! 在 lapin 之上提供长驻会话：声明式的交换机/队列/消费者拓扑、
//! 死信与重试死信语法糖、断线自动重连、发布者通道池，
//! 以及逐消息的请求标识与延迟指标。
//!
//! 处理器结果到确认动作的映射：
//! - `Ok` → ack；
//! - 错误链中含 [`RejectError`] → reject（不重入队，毒丸消息）；
//! - 其他错误 → nack（是否重入队由消费者配置决定）。

pub mod client;
pub mod consumer;
pub mod error;
pub mod message;
pub mod publisher;
pub mod topology;

pub use client::RabbitClient;
pub use consumer::ConsumerContext;
pub use error::{RabbitError, RejectError, Result, is_reject_error};
pub use message::{Message, OutboundMessage};
pub use topology::{ConsumerDef, ExchangeDef, QueueArg, QueueDef, Topology};
