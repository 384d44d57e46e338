//! 声明式拓扑
//!
//! 交换机 → 队列 → 消费者三层结构在拨号前组装完毕，
//! 连接建立后由客户端用一条短命通道依序声明。
//! 队列参数表承载死信路由与消息 TTL；`with_retry_dead_letter`
//! 标记的队列在定稿时展开为专用的重试死信交换机/队列对，
//! 过期消息经 DLQ 回流原交换机，形成约 10 秒的延迟重试环。

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::consumer::ConsumerContext;
use crate::message::Message;

/// 重试死信交换机名
pub const RETRY_DLX: &str = "dlx.retry.exchange";

/// 重试死信队列的消息停留时间
const RETRY_TTL_SECS: u32 = 10;

pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const DEAD_LETTER_ROUTING_KEY_ARG: &str = "x-dead-letter-routing-key";
pub const MESSAGE_TTL_ARG: &str = "x-message-ttl";

/// 队列参数值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueArg {
    Str(String),
    UInt(u32),
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(ConsumerContext, Message) -> HandlerFuture + Send + Sync>;

/// 整体拓扑
#[derive(Default, Clone)]
pub struct Topology {
    exchanges: Vec<ExchangeDef>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加交换机；同名交换机只保留第一次的定义，其队列合并
    pub fn exchange(mut self, exchange: ExchangeDef) -> Self {
        match self.exchanges.iter_mut().find(|e| e.name == exchange.name) {
            Some(existing) => {
                for queue in exchange.queues {
                    existing.push_queue(queue);
                }
            }
            None => self.exchanges.push(exchange),
        }
        self
    }

    pub fn exchanges(&self) -> &[ExchangeDef] {
        &self.exchanges
    }

    /// 展开重试死信标记
    ///
    /// 对每个标记队列：
    /// 1. 原队列的死信指向 `dlx.retry.exchange`，路由键 `<交换机>-<队列>`；
    /// 2. 确保重试交换机存在，并在其下声明 `dlq.retry.<队列>`：
    ///    TTL 10 秒，自身死信回指原交换机/路由键。
    /// 净效果：被 nack 的消息约 10 秒后回流原队列。重复定稿是幂等的。
    pub fn finalize(mut self) -> Self {
        let mut marks: Vec<(String, String, String)> = Vec::new();
        for exchange in &self.exchanges {
            for queue in &exchange.queues {
                if queue.retry_dead_letter {
                    marks.push((
                        exchange.name.clone(),
                        queue.name.clone(),
                        queue.routing_key.clone(),
                    ));
                }
            }
        }

        for (exchange_name, queue_name, routing_key) in marks {
            let dlq_routing_key = format!("{exchange_name}-{queue_name}");

            if let Some(queue) = self.queue_mut(&exchange_name, &queue_name) {
                queue.set_dead_letter(RETRY_DLX, &dlq_routing_key);
            }

            let dlq = QueueDef::new(format!("dlq.retry.{queue_name}"), &dlq_routing_key)
                .with_dead_letter(&exchange_name, &routing_key)
                .with_message_ttl(RETRY_TTL_SECS);

            self = self.exchange(ExchangeDef::direct(RETRY_DLX).queue(dlq));
        }

        self
    }

    fn queue_mut(&mut self, exchange_name: &str, queue_name: &str) -> Option<&mut QueueDef> {
        self.exchanges
            .iter_mut()
            .find(|e| e.name == exchange_name)?
            .queues
            .iter_mut()
            .find(|q| q.name == queue_name)
    }
}

/// 交换机定义
#[derive(Clone)]
pub struct ExchangeDef {
    name: String,
    kind: String,
    durable: bool,
    auto_delete: bool,
    queues: Vec<QueueDef>,
}

impl ExchangeDef {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            durable: false,
            auto_delete: false,
            queues: Vec::new(),
        }
    }

    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, "direct")
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, "topic")
    }

    pub fn fanout(name: impl Into<String>) -> Self {
        Self::new(name, "fanout")
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    /// 追加队列；同名队列只保留第一次的定义
    pub fn queue(mut self, queue: QueueDef) -> Self {
        self.push_queue(queue);
        self
    }

    fn push_queue(&mut self, queue: QueueDef) {
        if !self.queues.iter().any(|q| q.name == queue.name) {
            self.queues.push(queue);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn queues(&self) -> &[QueueDef] {
        &self.queues
    }
}

/// 队列定义
#[derive(Clone)]
pub struct QueueDef {
    name: String,
    routing_key: String,
    durable: bool,
    auto_delete: bool,
    exclusive: bool,
    retry_dead_letter: bool,
    args: BTreeMap<String, QueueArg>,
    consumers: Vec<ConsumerDef>,
}

impl QueueDef {
    pub fn new(name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routing_key: routing_key.into(),
            durable: false,
            auto_delete: false,
            exclusive: false,
            retry_dead_letter: false,
            args: BTreeMap::new(),
            consumers: Vec::new(),
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    /// 声明为独占队列：声明时名字追加 `-<host_name>` 后缀，
    /// 保证每个实例独享一份
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// 写入死信交换机与路由键
    pub fn with_dead_letter(
        mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.set_dead_letter(&exchange.into(), &routing_key.into());
        self
    }

    fn set_dead_letter(&mut self, exchange: &str, routing_key: &str) {
        self.args.insert(
            DEAD_LETTER_EXCHANGE_ARG.to_string(),
            QueueArg::Str(exchange.to_string()),
        );
        self.args.insert(
            DEAD_LETTER_ROUTING_KEY_ARG.to_string(),
            QueueArg::Str(routing_key.to_string()),
        );
    }

    /// 设置消息 TTL，broker 侧以毫秒计
    pub fn with_message_ttl(mut self, ttl_secs: u32) -> Self {
        self.args
            .insert(MESSAGE_TTL_ARG.to_string(), QueueArg::UInt(ttl_secs * 1000));
        self
    }

    /// 标记走重试死信环，定稿时展开
    pub fn with_retry_dead_letter(mut self) -> Self {
        self.retry_dead_letter = true;
        self
    }

    /// 追加消费者；同名消费者只保留第一次的定义
    pub fn consumer(mut self, consumer: ConsumerDef) -> Self {
        if !self.consumers.iter().any(|c| c.name == consumer.name) {
            self.consumers.push(consumer);
        }
        self
    }

    /// 声明到 broker 时使用的队列名
    pub fn effective_name(&self, host_name: &str) -> String {
        if self.exclusive {
            format!("{}-{host_name}", self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn args(&self) -> &BTreeMap<String, QueueArg> {
        &self.args
    }

    pub fn consumers(&self) -> &[ConsumerDef] {
        &self.consumers
    }
}

/// 消费者定义
#[derive(Clone)]
pub struct ConsumerDef {
    name: String,
    auto_ack: bool,
    exclusive: bool,
    /// nack 时是否重入队（毒丸 reject 永不重入队）
    requeue: bool,
    prefetch_count: u16,
    pub(crate) handler: HandlerFn,
}

impl ConsumerDef {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ConsumerContext, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            auto_ack: false,
            exclusive: false,
            requeue: false,
            prefetch_count: 1,
            handler: Arc::new(move |ctx, msg| Box::pin(handler(ctx, msg))),
        }
    }

    pub fn auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn requeue(mut self, requeue: bool) -> Self {
        self.requeue = requeue;
        self
    }

    pub fn prefetch(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// 注册到 broker 时使用的消费者名
    pub fn scoped_name(&self, app_name: &str, host_name: &str) -> String {
        format!("{app_name}.{}.{host_name}", self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_auto_ack(&self) -> bool {
        self.auto_ack
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn should_requeue(&self) -> bool {
        self.requeue
    }

    pub fn prefetch_count(&self) -> u16 {
        self.prefetch_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_consumer(name: &str) -> ConsumerDef {
        ConsumerDef::new(name, |_ctx, _msg| std::future::ready(Ok(())))
    }

    fn find_queue<'a>(topology: &'a Topology, exchange: &str, queue: &str) -> &'a QueueDef {
        topology
            .exchanges()
            .iter()
            .find(|e| e.name() == exchange)
            .unwrap_or_else(|| panic!("exchange {exchange} not declared"))
            .queues()
            .iter()
            .find(|q| q.name() == queue)
            .unwrap_or_else(|| panic!("queue {queue} not declared"))
    }

    #[test]
    fn test_dead_letter_args() {
        let queue = QueueDef::new("orders.q", "orders.created").with_dead_letter("dlx", "dl-key");

        assert_eq!(
            queue.args().get(DEAD_LETTER_EXCHANGE_ARG),
            Some(&QueueArg::Str("dlx".to_string()))
        );
        assert_eq!(
            queue.args().get(DEAD_LETTER_ROUTING_KEY_ARG),
            Some(&QueueArg::Str("dl-key".to_string()))
        );
    }

    #[test]
    fn test_message_ttl_is_stored_in_millis() {
        let queue = QueueDef::new("q", "k").with_message_ttl(10);
        assert_eq!(queue.args().get(MESSAGE_TTL_ARG), Some(&QueueArg::UInt(10_000)));
    }

    #[test]
    fn test_retry_dead_letter_expansion() {
        let topology = Topology::new()
            .exchange(
                ExchangeDef::direct("orders").queue(
                    QueueDef::new("orders.q", "orders.created").with_retry_dead_letter(),
                ),
            )
            .finalize();

        // 原队列死信指向重试交换机
        let original = find_queue(&topology, "orders", "orders.q");
        assert_eq!(
            original.args().get(DEAD_LETTER_EXCHANGE_ARG),
            Some(&QueueArg::Str(RETRY_DLX.to_string()))
        );
        assert_eq!(
            original.args().get(DEAD_LETTER_ROUTING_KEY_ARG),
            Some(&QueueArg::Str("orders-orders.q".to_string()))
        );

        // 重试 DLQ：TTL 10 秒，死信回指原交换机/路由键
        let dlq = find_queue(&topology, RETRY_DLX, "dlq.retry.orders.q");
        assert_eq!(dlq.routing_key(), "orders-orders.q");
        assert_eq!(dlq.args().get(MESSAGE_TTL_ARG), Some(&QueueArg::UInt(10_000)));
        assert_eq!(
            dlq.args().get(DEAD_LETTER_EXCHANGE_ARG),
            Some(&QueueArg::Str("orders".to_string()))
        );
        assert_eq!(
            dlq.args().get(DEAD_LETTER_ROUTING_KEY_ARG),
            Some(&QueueArg::Str("orders.created".to_string()))
        );
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let topology = Topology::new()
            .exchange(
                ExchangeDef::direct("orders")
                    .queue(QueueDef::new("orders.q", "k").with_retry_dead_letter()),
            )
            .finalize()
            .finalize();

        let retry_exchange = topology
            .exchanges()
            .iter()
            .filter(|e| e.name() == RETRY_DLX)
            .count();
        assert_eq!(retry_exchange, 1);

        let dlq_count = topology
            .exchanges()
            .iter()
            .flat_map(|e| e.queues())
            .filter(|q| q.name() == "dlq.retry.orders.q")
            .count();
        assert_eq!(dlq_count, 1);
    }

    #[test]
    fn test_two_marked_queues_share_retry_exchange() {
        let topology = Topology::new()
            .exchange(
                ExchangeDef::direct("orders")
                    .queue(QueueDef::new("a.q", "a").with_retry_dead_letter())
                    .queue(QueueDef::new("b.q", "b").with_retry_dead_letter()),
            )
            .finalize();

        let retry_exchanges: Vec<_> = topology
            .exchanges()
            .iter()
            .filter(|e| e.name() == RETRY_DLX)
            .collect();
        assert_eq!(retry_exchanges.len(), 1);
        assert_eq!(retry_exchanges[0].queues().len(), 2);
    }

    #[test]
    fn test_duplicate_exchange_merges_queues() {
        let topology = Topology::new()
            .exchange(ExchangeDef::direct("orders").queue(QueueDef::new("a.q", "a")))
            .exchange(ExchangeDef::direct("orders").queue(QueueDef::new("b.q", "b")));

        assert_eq!(topology.exchanges().len(), 1);
        assert_eq!(topology.exchanges()[0].queues().len(), 2);
    }

    #[test]
    fn test_duplicate_queue_keeps_first() {
        let exchange = ExchangeDef::direct("orders")
            .queue(QueueDef::new("a.q", "first"))
            .queue(QueueDef::new("a.q", "second"));

        assert_eq!(exchange.queues().len(), 1);
        assert_eq!(exchange.queues()[0].routing_key(), "first");
    }

    #[test]
    fn test_duplicate_consumer_is_idempotent() {
        let queue = QueueDef::new("a.q", "a")
            .consumer(noop_consumer("worker"))
            .consumer(noop_consumer("worker"));

        assert_eq!(queue.consumers().len(), 1);
    }

    #[test]
    fn test_exclusive_queue_name_suffix() {
        let queue = QueueDef::new("session.q", "k").exclusive();
        assert_eq!(queue.effective_name("host-7"), "session.q-host-7");

        let plain = QueueDef::new("shared.q", "k");
        assert_eq!(plain.effective_name("host-7"), "shared.q");
    }

    #[test]
    fn test_consumer_scoped_name() {
        let consumer = noop_consumer("order-worker");
        assert_eq!(
            consumer.scoped_name("billing", "host-7"),
            "billing.order-worker.host-7"
        );
    }
}
