//! broker 错误分类
//!
//! 消费循环遇到的错误分为两类：瞬时的良性错误（继续轮询即可）
//! 与连接级故障（必须重建连接）。此表是消费循环的契约，
//! 未列出的错误码一律按连接故障处理。

use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, error, warn};

/// 错误处置方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// 记录后继续轮询
    Benign,
    /// 触发重连
    Reconnect,
}

/// 按错误码分类
pub fn classify(code: RDKafkaErrorCode) -> ErrorDisposition {
    use RDKafkaErrorCode::*;

    match code {
        // 轮询超时：没有新消息，属正常现象
        OperationTimedOut => ErrorDisposition::Benign,
        // 重平衡进行中：临时状态，等待即可
        RebalanceInProgress => ErrorDisposition::Benign,

        NetworkException
        | BrokerNotAvailable
        | AllBrokersDown
        | Authentication
        | InvalidSessionTimeout
        | OffsetOutOfRange
        | UnknownTopicOrPartition
        | InvalidMessage
        | InvalidMessageSize
        | InvalidPartitions
        | InvalidReplicationFactor
        | InvalidReplicaAssignment
        | InvalidConfig
        | NotController
        | InvalidRequiredAcks
        | IllegalGeneration
        | InconsistentGroupProtocol
        | InvalidGroupId
        | UnknownMemberId
        | InvalidCommitOffsetSize
        | TopicAuthorizationFailed
        | GroupAuthorizationFailed
        | ClusterAuthorizationFailed
        | InvalidTimestamp
        | UnsupportedSASLMechanism
        | IllegalSASLState
        | UnsupportedVersion
        | InvalidTopic
        | MessageBatchTooLarge
        | NotEnoughReplicas
        | NotEnoughReplicasAfterAppend => ErrorDisposition::Reconnect,

        // 未知错误码按连接故障处理
        _ => ErrorDisposition::Reconnect,
    }
}

/// 分类并按处置方式记录日志
pub(crate) fn classify_and_log(err: &KafkaError) -> ErrorDisposition {
    let Some(code) = err.rdkafka_error_code() else {
        // 非 broker 侧错误，按连接故障处理
        error!(error = %err, "non-broker kafka error");
        return ErrorDisposition::Reconnect;
    };

    let disposition = classify(code);
    match disposition {
        ErrorDisposition::Benign => {
            if code == RDKafkaErrorCode::RebalanceInProgress {
                warn!(error = %err, "rebalance in progress");
            } else {
                debug!(error = %err, "poll timeout, no new messages were received");
            }
        }
        ErrorDisposition::Reconnect => {
            error!(error = %err, code = ?code, "kafka connection error");
        }
    }
    disposition
}
