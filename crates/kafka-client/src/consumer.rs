//! 长驻消费会话
//!
//! 构造时拨号一次，此后由 `listen` 驱动主循环直到收到关闭信号。
//! 连接故障触发重连：关闭旧句柄、以完全相同的配置重新拨号、
//! 重订阅处理器表中全部 topic。位点手动提交，处理失败不提交，
//! 消息在重平衡后由 broker 重新投递。

use std::sync::Once;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message as _};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use flowgate_shared::config::KafkaConfig;

use crate::classify::{ErrorDisposition, classify_and_log};
use crate::error::{KafkaClientError, Result};
use crate::handlers::{HandlerContext, HandlerRegistry};
use crate::message::Message;

/// 单次阻塞轮询的上限，超时属良性错误
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// 重连循环本身失败后，主循环再次尝试前的等待
const RECONNECT_FAILURE_BACKOFF: Duration = Duration::from_secs(5);

static DESCRIBE_METRICS: Once = Once::new();

fn describe_metrics() {
    DESCRIBE_METRICS.call_once(|| {
        metrics::describe_histogram!(
            "kafka_consumer_duration_seconds",
            "Duration of kafka consumers"
        );
        metrics::describe_gauge!(
            "kafka_connection_state",
            "Kafka connection state: 1 = connected, 0 = disconnected"
        );
        metrics::describe_counter!(
            "kafka_reconnect_attempts_total",
            "Total number of Kafka reconnection attempts"
        );
    });
}

/// 弹性 Kafka 消费者
pub struct Consumer {
    app_name: String,
    bootstrap_servers: String,
    username: String,
    password: String,
    max_retries: u32,
    retry_interval: Duration,
    /// 重连时整体替换，读路径持读锁跨 await 接收消息
    inner: tokio::sync::RwLock<Option<StreamConsumer>>,
    handlers: HandlerRegistry,
    connected: parking_lot::RwLock<bool>,
}

impl Consumer {
    /// 创建消费者并拨号一次，拨号失败即返回错误
    pub async fn connect(config: &KafkaConfig) -> Result<Self> {
        describe_metrics();

        let consumer = Self {
            app_name: config.group_id.clone(),
            bootstrap_servers: config.bootstrap_servers(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
            retry_interval: config.retry_interval(),
            inner: tokio::sync::RwLock::new(None),
            handlers: HandlerRegistry::new(),
            connected: parking_lot::RwLock::new(false),
        };

        consumer.dial().await?;
        Ok(consumer)
    }

    /// 注册 topic 处理器
    ///
    /// 同一 topic 重复注册被拒绝。注册成功后立即把订阅
    /// 更新为处理器表的全集。
    pub async fn subscribe<F, Fut>(&self, topic: &str, name: &str, handler: F) -> Result<()>
    where
        F: Fn(HandlerContext, Message) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.handlers.register(topic, name, handler)?;

        let guard = self.inner.read().await;
        if let Some(consumer) = guard.as_ref() {
            let topics = self.handlers.topics();
            let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer.subscribe(&refs)?;
            info!(topic, handler = name, "已订阅 Kafka topic");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    /// 关闭会话：释放底层消费者、清空处理器表、连接状态归零
    pub async fn close(&self) {
        let mut guard = self.inner.write().await;
        // drop 底层句柄即离组并断开
        *guard = None;
        self.handlers.clear();
        drop(guard);

        self.set_connected(false);
        info!(appname = %self.app_name, "kafka consumer closed");
    }

    /// 驱动主循环直到收到关闭信号
    ///
    /// 轮询超时与重平衡属良性错误，记录后继续；其余错误触发重连。
    /// listen 是唯一的重连驱动方，同一客户端不会有并发的重连循环。
    pub async fn listen(&self, mut shutdown: watch::Receiver<bool>) {
        info!(appname = %self.app_name, "kafka 消费循环已启动");

        loop {
            if *shutdown.borrow() {
                info!("kafka consumer shutdown signal received, cleaning up...");
                self.close().await;
                return;
            }

            if !self.is_connected() {
                warn!("kafka not connected, attempting to reconnect...");
                if let Err(e) = self.reconnect().await {
                    error!(error = %e, "failed to reconnect");
                    tokio::time::sleep(RECONNECT_FAILURE_BACKOFF).await;
                }
                continue;
            }

            let disposition = {
                let guard = self.inner.read().await;
                let Some(consumer) = guard.as_ref() else {
                    self.set_connected(false);
                    continue;
                };

                tokio::select! {
                    // 关闭信号优先于消息接收
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            // 发送端消失等价于关闭
                            drop(guard);
                            self.close().await;
                            return;
                        }
                        None
                    }

                    polled = tokio::time::timeout(POLL_TIMEOUT, consumer.recv()) => {
                        match polled {
                            // 轮询超时：没有新消息
                            Err(_) => {
                                debug!("poll timeout, no new messages were received");
                                None
                            }
                            Ok(Ok(msg)) => {
                                self.handle_message(consumer, &msg).await;
                                None
                            }
                            Ok(Err(e)) => Some(classify_and_log(&e)),
                        }
                    }
                }
            };

            if disposition == Some(ErrorDisposition::Reconnect) {
                warn!("kafka connection lost, attempting to reconnect...");
                self.set_connected(false);
            }
        }
    }

    /// 逐消息处理管线
    ///
    /// 每条消息生成独立的 request_id 并连同处理器名进入日志上下文；
    /// 处理成功才提交位点；延迟直方图覆盖成功与失败两条路径。
    async fn handle_message(&self, consumer: &StreamConsumer, msg: &BorrowedMessage<'_>) {
        let topic = msg.topic().to_string();
        let Some(handler) = self.handlers.get(&topic) else {
            error!(topic, offset = msg.offset(), "no handler registered for topic");
            return;
        };

        let envelope = Message::from_borrowed(msg);
        let ctx = HandlerContext {
            request_id: Uuid::new_v4().to_string(),
            method: handler.name.clone(),
        };
        let span = info_span!(
            "kafka_message",
            request_id = %ctx.request_id,
            method = %ctx.method,
            topic = %topic,
        );

        let start = Instant::now();
        let mut failed = false;
        let offset = envelope.offset;

        async {
            if let Err(e) = (handler.func)(ctx, envelope).await {
                failed = true;
                // 不提交位点，消息在重平衡后重新投递
                error!(error = %e, offset, "handler error");
                return;
            }

            if let Err(e) = consumer.commit_message(msg, CommitMode::Sync) {
                failed = true;
                error!(error = %e, offset, "failed to commit message");
                return;
            }

            info!(offset, "committed message");
        }
        .instrument(span)
        .await;

        metrics::histogram!(
            "kafka_consumer_duration_seconds",
            "method" => handler.name.clone(),
            "error" => failed.to_string(),
        )
        .record(start.elapsed().as_secs_f64());
    }

    /// 以完全相同的配置拨号并重订阅
    ///
    /// 写锁整体替换旧句柄，旧连接随替换关闭；
    /// 写锁同时序列化了可能并发的拨号请求。
    async fn dial(&self) -> Result<()> {
        let mut guard = self.inner.write().await;

        let created: std::result::Result<StreamConsumer, _> = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.app_name)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "10000")
            .set("max.poll.interval.ms", "300000")
            .set("fetch.min.bytes", "1")
            .set("security.protocol", "SASL_PLAINTEXT")
            .set("sasl.mechanism", "PLAIN")
            .set("sasl.username", &self.username)
            .set("sasl.password", &self.password)
            .create();

        let consumer = match created {
            Ok(consumer) => consumer,
            Err(e) => {
                *guard = None;
                drop(guard);
                self.set_connected(false);
                return Err(KafkaClientError::Kafka(e));
            }
        };

        // 重订阅处理器表中全部 topic
        let topics = self.handlers.topics();
        if !topics.is_empty() {
            let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            if let Err(e) = consumer.subscribe(&refs) {
                error!(?topics, error = %e, "failed to resubscribe to topics");
                *guard = None;
                drop(guard);
                self.set_connected(false);
                return Err(KafkaClientError::Kafka(e));
            }
        }

        *guard = Some(consumer);
        drop(guard);

        self.set_connected(true);
        info!(appname = %self.app_name, ?topics, "kafka connected successfully");
        Ok(())
    }

    /// 重连循环
    ///
    /// 每次尝试都计入 attempt 计数；max_retries 为 0 时无限重试，
    /// 否则超限后计入 failed 并返回错误、连接状态归零。
    async fn reconnect(&self) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if self.max_retries > 0 && attempt > self.max_retries {
                error!(attempts = attempt - 1, "max reconnection attempts exceeded");
                metrics::counter!(
                    "kafka_reconnect_attempts_total",
                    "appname" => self.app_name.clone(),
                    "status" => "failed",
                )
                .increment(1);
                return Err(KafkaClientError::ReconnectExhausted(self.max_retries));
            }

            info!(attempt, interval = ?self.retry_interval, "attempting to reconnect");
            metrics::counter!(
                "kafka_reconnect_attempts_total",
                "appname" => self.app_name.clone(),
                "status" => "attempt",
            )
            .increment(1);

            match self.dial().await {
                Ok(()) => {
                    info!(attempt, "reconnected successfully");
                    metrics::counter!(
                        "kafka_reconnect_attempts_total",
                        "appname" => self.app_name.clone(),
                        "status" => "success",
                    )
                    .increment(1);
                    return Ok(());
                }
                Err(e) => {
                    error!(attempt, error = %e, "reconnection failed");
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    fn set_connected(&self, connected: bool) {
        *self.connected.write() = connected;
        metrics::gauge!(
            "kafka_connection_state",
            "appname" => self.app_name.clone(),
        )
        .set(if connected { 1.0 } else { 0.0 });
    }
}
