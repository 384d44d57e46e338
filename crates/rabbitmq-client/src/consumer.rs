//! 消费者任务与逐消息管线
//!
//! 每个配置的消费者独占一条通道：设置 prefetch QoS 后开始投递，
//! 每条投递在独立任务中处理，因此同通道消息之间不保证处理顺序。
//! 通道关闭时任务退出，由连接监视器负责后续重建。

use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::FieldTable;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::client::RabbitClient;
use crate::error::is_reject_error;
use crate::message::Message;
use crate::topology::ConsumerDef;

/// 随消息传入处理器的请求上下文
#[derive(Debug, Clone)]
pub struct ConsumerContext {
    /// 本条消息的关联标识，每条消息独立生成
    pub request_id: String,
    /// 消费者的完整作用域名
    pub parent_method: String,
}

/// 处理结果到确认动作的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckDecision {
    Ack,
    /// 毒丸：永久拒绝，不重入队
    Reject,
    Nack {
        requeue: bool,
    },
}

pub(crate) fn decide(result: &anyhow::Result<()>, requeue: bool) -> AckDecision {
    match result {
        Ok(()) => AckDecision::Ack,
        Err(err) if is_reject_error(err) => AckDecision::Reject,
        Err(_) => AckDecision::Nack { requeue },
    }
}

/// 消费者任务主体
pub(crate) async fn run_consumer(
    client: Arc<RabbitClient>,
    queue_name: String,
    consumer: ConsumerDef,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(conn) = client.current_connection() else {
        error!(queue = %queue_name, "no register connection, consumer not started");
        return;
    };

    let channel = match conn.create_channel().await {
        Ok(channel) => channel,
        Err(e) => {
            error!(error = %e, queue = %queue_name, "failed to open channel for consumer");
            return;
        }
    };

    if let Err(e) = channel
        .basic_qos(consumer.prefetch_count(), BasicQosOptions { global: true })
        .await
    {
        error!(error = %e, queue = %queue_name, "failed to set QoS");
        return;
    }

    let scoped_name = consumer.scoped_name(client.app_name(), client.host_name());
    let mut deliveries = match channel
        .basic_consume(
            &queue_name,
            &scoped_name,
            BasicConsumeOptions {
                no_ack: consumer.is_auto_ack(),
                exclusive: consumer.is_exclusive(),
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
    {
        Ok(deliveries) => deliveries,
        Err(e) => {
            error!(error = %e, queue = %queue_name, "failed to consume");
            return;
        }
    };

    info!(queue = %queue_name, consumer = %scoped_name, "consumer started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait_for(|stop| *stop) => {
                info!(queue = %queue_name, consumer = %scoped_name, "consumer stopped");
                return;
            }

            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        // 处理任务彼此独立，同通道消息之间不保证顺序
                        tokio::spawn(handle_delivery(
                            scoped_name.clone(),
                            consumer.clone(),
                            delivery,
                        ));
                    }
                    Some(Err(e)) => {
                        error!(error = %e, queue = %queue_name, "failed to receive delivery");
                    }
                    None => {
                        // 通道关闭：退出并交由连接监视器处理
                        error!(queue = %queue_name, consumer = %scoped_name, "AMQP channel closed");
                        return;
                    }
                }
            }
        }
    }
}

/// 逐消息处理管线
///
/// 每条消息生成独立的 request_id 并连同消费者名进入日志上下文；
/// 延迟直方图覆盖成功与失败两条路径。
async fn handle_delivery(scoped_name: String, consumer: ConsumerDef, delivery: Delivery) {
    let ctx = ConsumerContext {
        request_id: Uuid::new_v4().to_string(),
        parent_method: scoped_name.clone(),
    };
    let span = info_span!(
        "rabbitmq_message",
        request_id = %ctx.request_id,
        parent_method = %ctx.parent_method,
    );

    let start = Instant::now();
    let mut failed = false;

    async {
        let message = Message::from_delivery(&delivery);
        let result = (consumer.handler)(ctx, message).await;
        failed = result.is_err();

        if let Err(err) = &result {
            error!(error = %err, "handler error");
        }

        // 自动确认模式下 broker 已记为完成，无需手动表态
        if consumer.is_auto_ack() {
            return;
        }

        match decide(&result, consumer.should_requeue()) {
            AckDecision::Ack => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(error = %e, "ack error");
                }
            }
            AckDecision::Reject => {
                info!("message rejected");
                if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                    error!(error = %e, "reject error");
                }
            }
            AckDecision::Nack { requeue } => {
                info!(requeue, "message nacked");
                if let Err(e) = delivery
                    .nack(BasicNackOptions {
                        requeue,
                        multiple: false,
                    })
                    .await
                {
                    error!(error = %e, "nack error");
                }
            }
        }
    }
    .instrument(span)
    .await;

    metrics::histogram!(
        "rabbitmq_consumer_duration_seconds",
        "method" => scoped_name,
        "error" => failed.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}
