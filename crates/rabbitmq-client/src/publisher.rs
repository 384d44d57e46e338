//! 发布者通道池
//!
//! 有界通道池：未达容量前按需新建，达到容量后复用归还的通道；
//! 池中取出的通道若已被 broker 关闭则弃用并补建，计数随之回退。
//! 池空且容量用尽时，取用方等待其他发布者归还。

use std::future::Future;

use tokio::sync::{Mutex, mpsc};
use tracing::warn;

use crate::error::{RabbitError, Result};

/// 池中条目自报存活状态
pub(crate) trait PoolItem {
    fn is_open(&self) -> bool;
}

impl PoolItem for lapin::Channel {
    fn is_open(&self) -> bool {
        self.status().connected()
    }
}

pub(crate) struct ChannelPool<C> {
    capacity: usize,
    /// 已创建数量；互斥锁保护容量增长决策，持锁跨 await 保证决策与创建原子
    created: Mutex<usize>,
    tx: mpsc::Sender<C>,
    rx: Mutex<mpsc::Receiver<C>>,
}

impl<C: PoolItem> ChannelPool<C> {
    pub(crate) fn new(capacity: usize) -> Self {
        // mpsc 不接受零容量，容量为 0 时池处于未启用状态，get 直接报错
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            capacity,
            created: Mutex::new(0),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// 取用通道
    pub(crate) async fn get<F, Fut>(&self, factory: F) -> Result<C>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        if self.capacity == 0 {
            return Err(RabbitError::PublisherNotConfigured);
        }

        let mut created = self.created.lock().await;

        if *created < self.capacity {
            let channel = factory().await?;
            *created += 1;
            return Ok(channel);
        }

        let channel = {
            let mut rx = self.rx.lock().await;
            // tx 持有在 self 上，recv 只会因进程退出而失败
            match rx.recv().await {
                Some(channel) => channel,
                None => return Err(RabbitError::PublisherNotConfigured),
            }
        };

        if channel.is_open() {
            return Ok(channel);
        }

        // 池中的通道已被 broker 关闭：弃用并补建
        *created -= 1;
        let fresh = factory().await?;
        *created += 1;
        Ok(fresh)
    }

    /// 归还通道
    pub(crate) fn put(&self, channel: C) {
        if self.tx.try_send(channel).is_err() {
            // 归还数受 created 计数约束，满池归还说明计数逻辑被破坏
            warn!("publisher channel pool is full, dropping returned channel");
        }
    }

    #[cfg(test)]
    pub(crate) async fn created_count(&self) -> usize {
        *self.created.lock().await
    }
}
