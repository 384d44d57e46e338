//! RabbitMQ 客户端
//!
//! `run` 拨号后用一条短命通道声明全部拓扑、为每个配置的消费者
//! 启动独立任务，并交由后台监视器盯住连接：连接异常关闭时进入
//! 重连循环（每 5 秒一次直到成功或收到关闭信号），成功后启动
//! 新监视器。连接指针以读写锁保护、Arc 克隆读取，发布者与监视器
//! 互不阻塞。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use flowgate_shared::config::RabbitConfig;

use crate::consumer::run_consumer;
use crate::error::{RabbitError, Result};
use crate::message::OutboundMessage;
use crate::publisher::ChannelPool;
use crate::topology::{QueueArg, Topology};

/// 重连循环两次尝试之间的间隔
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

static DESCRIBE_METRICS: Once = Once::new();

fn describe_metrics() {
    DESCRIBE_METRICS.call_once(|| {
        metrics::describe_histogram!(
            "rabbitmq_consumer_duration_seconds",
            "Duration of rabbitmq handlers"
        );
        metrics::describe_gauge!(
            "rabbitmq_connection_state",
            "RabbitMQ connection state: 1 = connected, 0 = disconnected"
        );
        metrics::describe_counter!(
            "rabbitmq_reconnect_attempts_total",
            "Total number of RabbitMQ reconnection attempts"
        );
    });
}

/// 弹性 RabbitMQ 客户端
pub struct RabbitClient {
    url: String,
    app_name: String,
    host_name: String,
    topology: Topology,
    connection: parking_lot::RwLock<Option<Arc<Connection>>>,
    publisher: ChannelPool<Channel>,
    /// 同一客户端同时只允许一个重连循环
    reconnecting: AtomicBool,
}

impl RabbitClient {
    /// 创建客户端，拓扑在此定稿（重试死信标记展开）
    pub fn new(config: &RabbitConfig, topology: Topology) -> Arc<Self> {
        describe_metrics();

        Arc::new(Self {
            url: config.url(),
            app_name: config.app_name.clone(),
            host_name: config.host_name.clone(),
            topology: topology.finalize(),
            connection: parking_lot::RwLock::new(None),
            publisher: ChannelPool::new(config.publisher_channel_pool_size),
            reconnecting: AtomicBool::new(false),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// 拨号、声明拓扑、启动消费者与连接监视器
    ///
    /// 已有存活连接时是空操作（重连循环重入时的保护）。
    pub async fn run(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let conn = Connection::connect(&self.url, ConnectionProperties::default()).await?;

        // 连接异常关闭时通知监视器
        let (close_tx, close_rx) = mpsc::channel::<lapin::Error>(1);
        conn.on_error(move |err| {
            let _ = close_tx.try_send(err);
        });

        let conn = Arc::new(conn);
        *self.connection.write() = Some(Arc::clone(&conn));

        if let Err(e) = self.declare_topology(&conn, &shutdown).await {
            // 声明失败的连接不可用，放弃并上报
            if let Err(close_err) = conn.close(320, "topology declaration failed").await {
                error!(error = %close_err, "failed to close the connection");
            }
            *self.connection.write() = None;
            self.set_gauge(false);
            return Err(e);
        }

        info!(appname = %self.app_name, "connected to RabbitMQ and successfully built objects");
        self.set_gauge(true);

        tokio::spawn(monitor(Arc::clone(self), close_rx, shutdown));
        Ok(())
    }

    /// 用一条短命通道声明交换机、队列与绑定，并启动消费者任务
    async fn declare_topology(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<()> {
        let channel = conn.create_channel().await?;

        for exchange in self.topology.exchanges() {
            channel
                .exchange_declare(
                    exchange.name(),
                    exchange_kind(exchange.kind()),
                    ExchangeDeclareOptions {
                        durable: exchange.is_durable(),
                        auto_delete: exchange.is_auto_delete(),
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            info!(exchange = exchange.name(), "exchange declared successfully");

            for queue in exchange.queues() {
                let queue_name = queue.effective_name(&self.host_name);
                channel
                    .queue_declare(
                        &queue_name,
                        QueueDeclareOptions {
                            durable: queue.is_durable(),
                            auto_delete: queue.is_auto_delete(),
                            exclusive: queue.is_exclusive(),
                            ..Default::default()
                        },
                        field_table(queue.args()),
                    )
                    .await?;
                info!(queue = %queue_name, "queue declared successfully");

                channel
                    .queue_bind(
                        &queue_name,
                        exchange.name(),
                        queue.routing_key(),
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await?;
                info!(
                    queue = %queue_name,
                    exchange = exchange.name(),
                    "bound queue to exchange successfully"
                );

                for consumer in queue.consumers() {
                    tokio::spawn(run_consumer(
                        Arc::clone(self),
                        queue_name.clone(),
                        consumer.clone(),
                        shutdown.clone(),
                    ));
                }
            }
        }

        // 声明完毕，长连接保留，声明通道关闭
        if let Err(e) = channel.close(200, "setup complete").await {
            warn!(error = %e, "failed to close setup channel");
        }
        Ok(())
    }

    /// 关闭连接，连接状态归零
    pub async fn close(&self) -> Result<()> {
        let conn = self.connection.write().take();
        if let Some(conn) = conn {
            conn.close(200, "client shutdown").await?;
        }
        self.set_gauge(false);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.current_connection()
            .map(|conn| conn.status().connected())
            .unwrap_or(false)
    }

    pub(crate) fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().clone()
    }

    /// 发布消息但不等待 broker 确认
    ///
    /// mandatory 恒为 true：不可路由的消息以 Basic.Return 返回，
    /// 由后台任务记录日志；immediate 已废弃，恒为 false。
    /// 通道取自发布者池，用毕归还；发布路径本身不阻塞在确认上。
    pub async fn unsafe_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<()> {
        let channel = self.publisher.get(|| self.open_publisher_channel()).await?;

        let (body, properties) = message.into_parts();
        let published = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    immediate: false,
                },
                &body,
                properties,
            )
            .await;

        // 无论发布成败都归还通道
        self.publisher.put(channel);
        let confirm = published?;

        // Basic.Return 的记录不阻塞发布方
        let exchange = exchange.to_string();
        let routing_key = routing_key.to_string();
        tokio::spawn(async move {
            match confirm.await {
                Ok(Confirmation::Ack(Some(returned)))
                | Ok(Confirmation::Nack(Some(returned))) => {
                    warn!(
                        exchange = %exchange,
                        routing_key = %routing_key,
                        message = ?returned,
                        "AMQP return received, message was undeliverable"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "publisher confirm listener closed");
                }
            }
        });

        Ok(())
    }

    /// 为发布者池新开通道
    ///
    /// 开启确认模式，使 mandatory 投递失败的 Basic.Return
    /// 能随确认一并返回并被记录。
    async fn open_publisher_channel(&self) -> Result<Channel> {
        let conn = self.current_connection().ok_or(RabbitError::NotConnected)?;
        let channel = conn.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(channel)
    }

    /// 重连循环：每 5 秒一次直到成功或收到关闭信号
    fn reconnect_loop<'a>(
        self: &'a Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if self.reconnecting.swap(true, Ordering::SeqCst) {
                return;
            }

            loop {
                if *shutdown.borrow() {
                    if let Err(e) = self.close().await {
                        error!(error = %e, "error while closing rabbitmq connection");
                    }
                    break;
                }

                info!("attempting to reconnect...");
                metrics::counter!(
                    "rabbitmq_reconnect_attempts_total",
                    "appname" => self.app_name.clone(),
                    "status" => "attempt",
                )
                .increment(1);

                // 成功的 run 会启动新的连接监视器
                match self.run(shutdown.clone()).await {
                    Ok(()) => {
                        info!("reconnected successfully");
                        metrics::counter!(
                            "rabbitmq_reconnect_attempts_total",
                            "appname" => self.app_name.clone(),
                            "status" => "success",
                        )
                        .increment(1);
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "reconnect failed");
                        metrics::counter!(
                            "rabbitmq_reconnect_attempts_total",
                            "appname" => self.app_name.clone(),
                            "status" => "failed",
                        )
                        .increment(1);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }

            self.reconnecting.store(false, Ordering::SeqCst);
        })
    }

    fn set_gauge(&self, connected: bool) {
        metrics::gauge!(
            "rabbitmq_connection_state",
            "appname" => self.app_name.clone(),
        )
        .set(if connected { 1.0 } else { 0.0 });
    }
}

/// 连接监视器
///
/// 等待关闭信号或连接异常关闭通知：前者优雅关闭，
/// 后者进入重连循环。
async fn monitor(
    client: Arc<RabbitClient>,
    mut close_rx: mpsc::Receiver<lapin::Error>,
    mut shutdown: watch::Receiver<bool>,
) {
    let shutdown_for_reconnect = shutdown.clone();
    tokio::select! {
        biased;

        _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
            info!("rabbitmq shutdown signal received, closing connection");
            if let Err(e) = client.close().await {
                error!(error = %e, "error while closing rabbitmq connection");
            }
        }

        closed = close_rx.recv() => {
            if let Some(err) = closed {
                error!(error = %err, "rabbitmq connection closed");
                client.set_gauge(false);
                client.reconnect_loop(shutdown_for_reconnect).await;
            }
        }
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "topic" => ExchangeKind::Topic,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// 组装队列参数表
fn field_table(args: &BTreeMap<String, QueueArg>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in args {
        let amqp_value = match value {
            QueueArg::Str(s) => AMQPValue::LongString(s.clone().into()),
            QueueArg::UInt(n) => AMQPValue::LongUInt(*n),
        };
        table.insert(key.clone().into(), amqp_value);
    }
    table
}
