//! 处理器注册表
//!
//! topic 到处理器的映射，读多写少，用读写锁保护。
//! 同一 topic 不允许重复注册；重订阅时取全部已注册 topic 的并集。

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{KafkaClientError, Result};
use crate::message::Message;

/// 随消息传入处理器的请求上下文
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// 本条消息的关联标识，每条消息独立生成
    pub request_id: String,
    /// 处理器注册名
    pub method: String,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type HandlerFn = Arc<dyn Fn(HandlerContext, Message) -> HandlerFuture + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Handler {
    pub(crate) name: String,
    pub(crate) func: HandlerFn,
}

/// topic → 处理器映射
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<HashMap<String, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，重复 topic 被拒绝
    pub fn register<F, Fut>(&self, topic: &str, name: &str, handler: F) -> Result<()>
    where
        F: Fn(HandlerContext, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut inner = self.inner.write();
        if inner.contains_key(topic) {
            return Err(KafkaClientError::DuplicateTopic(topic.to_string()));
        }

        let func: HandlerFn = Arc::new(move |ctx, msg| Box::pin(handler(ctx, msg)));
        inner.insert(
            topic.to_string(),
            Handler {
                name: name.to_string(),
                func,
            },
        );
        Ok(())
    }

    /// 取 topic 对应的处理器
    pub(crate) fn get(&self, topic: &str) -> Option<Handler> {
        self.inner.read().get(topic).cloned()
    }

    /// 当前注册的全部 topic，重连后重订阅用
    pub fn topics(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// 清空注册表，关闭时调用
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(HandlerContext, Message) -> std::future::Ready<anyhow::Result<()>> {
        |_ctx, _msg| std::future::ready(Ok(()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        registry.register("orders", "order-handler", noop()).unwrap();

        let handler = registry.get("orders").unwrap();
        assert_eq!(handler.name, "order-handler");
        assert!(registry.get("payments").is_none());
    }

    #[test]
    fn test_duplicate_topic_is_rejected() {
        let registry = HandlerRegistry::new();
        registry.register("orders", "first", noop()).unwrap();

        let err = registry.register("orders", "second", noop()).unwrap_err();
        assert!(matches!(err, KafkaClientError::DuplicateTopic(topic) if topic == "orders"));
    }

    #[test]
    fn test_topics_union_for_resubscribe() {
        let registry = HandlerRegistry::new();
        registry.register("topic-a", "a", noop()).unwrap();
        registry.register("topic-b", "b", noop()).unwrap();

        let mut topics = registry.topics();
        topics.sort();
        assert_eq!(topics, vec!["topic-a".to_string(), "topic-b".to_string()]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let registry = HandlerRegistry::new();
        registry.register("topic-a", "a", noop()).unwrap();
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.topics().is_empty());
    }
}
