//! Kafka 客户端错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KafkaClientError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// 同一 topic 不允许注册第二个处理器
    #[error("topic {0} has already a registered handler")]
    DuplicateTopic(String),

    /// 重连次数用尽（max_retries > 0 时才可能发生）
    #[error("max reconnection attempts ({0}) exceeded")]
    ReconnectExhausted(u32),
}

pub type Result<T> = std::result::Result<T, KafkaClientError>;
