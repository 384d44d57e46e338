//! 消息信封
//!
//! 入站信封把 lapin 投递转换为拥有所有权的结构体；
//! 出站信封在发布时固定补上新生成的 messageId，
//! 投递模式默认非持久（deliveryMode=1），可显式覆盖。

use chrono::{DateTime, Utc};
use lapin::BasicProperties;
use lapin::message::Delivery;
use uuid::Uuid;

/// 消费到的消息
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub(crate) fn from_delivery(delivery: &Delivery) -> Self {
        Self::from_parts(delivery.data.clone(), &delivery.properties)
    }

    /// 从消息体与 AMQP 属性组装信封
    pub(crate) fn from_parts(body: Vec<u8>, properties: &BasicProperties) -> Self {
        Self {
            body,
            content_type: properties.content_type().as_ref().map(|v| v.to_string()),
            content_encoding: properties
                .content_encoding()
                .as_ref()
                .map(|v| v.to_string()),
            priority: *properties.priority(),
            correlation_id: properties.correlation_id().as_ref().map(|v| v.to_string()),
            reply_to: properties.reply_to().as_ref().map(|v| v.to_string()),
            expiration: properties.expiration().as_ref().map(|v| v.to_string()),
            // AMQP 时间戳是 Unix 秒
            timestamp: properties
                .timestamp()
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
        }
    }
}

/// 待发布的消息
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// true 时以持久模式（deliveryMode=2）投递
    pub persistent: bool,
}

impl OutboundMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// 拆解为消息体与发布属性
    ///
    /// 每次发布都生成全新的 messageId。
    pub(crate) fn into_parts(self) -> (Vec<u8>, BasicProperties) {
        let mut properties = BasicProperties::default()
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_delivery_mode(if self.persistent { 2 } else { 1 });

        if let Some(content_type) = self.content_type {
            properties = properties.with_content_type(content_type.into());
        }
        if let Some(content_encoding) = self.content_encoding {
            properties = properties.with_content_encoding(content_encoding.into());
        }
        if let Some(priority) = self.priority {
            properties = properties.with_priority(priority);
        }
        if let Some(correlation_id) = self.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = self.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }
        if let Some(expiration) = self.expiration {
            properties = properties.with_expiration(expiration.into());
        }
        if let Some(timestamp) = self.timestamp {
            properties = properties.with_timestamp(timestamp.timestamp() as u64);
        }

        (self.body, properties)
    }
}
