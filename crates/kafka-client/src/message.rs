//! 消息信封
//!
//! 把 rdkafka 的借用消息（带生命周期约束）转换为拥有所有权的结构体，
//! 使消息可以安全地跨 await 点传递给异步处理函数。

use chrono::{DateTime, Utc};
use rdkafka::Timestamp;
use rdkafka::message::{BorrowedMessage, Message as RdMessage};

/// 消息时间戳来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    /// 生产者写入时间
    CreateTime,
    /// broker 落盘时间
    LogAppendTime,
    /// broker 未提供时间戳
    NotAvailable,
}

/// 消费到的 Kafka 消息的统一表示
#[derive(Debug, Clone)]
pub struct Message {
    pub data: Vec<u8>,
    pub topic: String,
    pub offset: i64,
    pub partition: i32,
    pub timestamp: Option<DateTime<Utc>>,
    pub timestamp_kind: TimestampKind,
    /// "partition.offset"，分区内唯一
    pub id: String,
}

impl Message {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    pub(crate) fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let (timestamp_kind, timestamp) = split_timestamp(msg.timestamp());

        Self {
            data: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
            topic: msg.topic().to_string(),
            offset: msg.offset(),
            partition: msg.partition(),
            timestamp,
            timestamp_kind,
            id: message_id(msg.partition(), msg.offset()),
        }
    }
}

/// 分区内消息标识："partition.offset"
pub(crate) fn message_id(partition: i32, offset: i64) -> String {
    format!("{partition}.{offset}")
}

/// 拆解 rdkafka 时间戳为来源种类与 UTC 时间
pub(crate) fn split_timestamp(ts: Timestamp) -> (TimestampKind, Option<DateTime<Utc>>) {
    match ts {
        Timestamp::NotAvailable => (TimestampKind::NotAvailable, None),
        Timestamp::CreateTime(millis) => (
            TimestampKind::CreateTime,
            DateTime::from_timestamp_millis(millis),
        ),
        Timestamp::LogAppendTime(millis) => (
            TimestampKind::LogAppendTime,
            DateTime::from_timestamp_millis(millis),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_format() {
        assert_eq!(message_id(3, 42), "3.42");
        assert_eq!(message_id(0, 0), "0.0");
    }

    #[test]
    fn test_split_timestamp_create_time() {
        let (kind, ts) = split_timestamp(Timestamp::CreateTime(1_700_000_000_000));
        assert_eq!(kind, TimestampKind::CreateTime);
        assert_eq!(ts.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_split_timestamp_log_append_time() {
        let (kind, ts) = split_timestamp(Timestamp::LogAppendTime(1_700_000_000_000));
        assert_eq!(kind, TimestampKind::LogAppendTime);
        assert!(ts.is_some());
    }

    #[test]
    fn test_split_timestamp_not_available() {
        let (kind, ts) = split_timestamp(Timestamp::NotAvailable);
        assert_eq!(kind, TimestampKind::NotAvailable);
        assert!(ts.is_none());
    }
}
