//! 漏桶批处理
//!
//! 单写者、时间与容量双触发的批处理原语：生产者非阻塞投递，
//! 唯一的 watcher 任务独占缓冲区（无需加锁），攒满容量或超时后
//! 把整批交给下游 sink。队列满时丢弃新条目形成背压，
//! sink 的 panic 被隔离吞掉，不影响后续批次。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error};

/// 批次落地的下游
///
/// 实现必须可跨任务共享；返回错误只会被记录，该批次仍视为已交付。
#[async_trait]
pub trait LeakSink<T>: Send + Sync + 'static {
    async fn on_leak(&self, items: Vec<T>) -> anyhow::Result<()>;
}

/// 漏桶句柄
///
/// `new` 即启动 watcher 任务；句柄全部释放后 watcher 冲刷残余缓冲并退出。
pub struct Bucket<T> {
    name: String,
    size: usize,
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> Bucket<T> {
    /// 创建并启动漏桶
    ///
    /// `size` 同时是输入队列容量与批次上限；`timeout_secs` 是
    /// 无新批次时的兜底冲刷周期。
    pub fn new(
        size: usize,
        timeout_secs: u64,
        name: impl Into<String>,
        sink: impl LeakSink<T>,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(size);

        tokio::spawn(watcher(
            rx,
            size,
            Duration::from_secs(timeout_secs),
            name.clone(),
            Arc::new(sink),
        ));

        Self { name, size, tx }
    }

    /// 非阻塞投递
    ///
    /// 队列满时丢弃该条目并记录错误日志，绝不阻塞调用方。
    pub fn add(&self, item: T) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                error!(
                    bucket_name = %self.name,
                    buffer_size = self.size,
                    "bucket is full, dropping the message"
                );
            }
            Err(TrySendError::Closed(_)) => {
                error!(bucket_name = %self.name, "bucket watcher has exited, dropping the message");
            }
        }
    }
}

/// 唯一的缓冲区属主
///
/// 两个唤醒源：输入队列与周期滴答。容量触发的冲刷会重置滴答周期，
/// 保证下一次超时冲刷距离本次冲刷不早于完整周期。
/// 冲刷在本任务内串行执行，任意时刻至多一次在途。
async fn watcher<T: Send + 'static>(
    mut rx: mpsc::Receiver<T>,
    size: usize,
    period: Duration,
    name: String,
    sink: Arc<dyn LeakSink<T>>,
) {
    let mut buffer: Vec<T> = Vec::with_capacity(size);
    // 首次滴答在一个完整周期之后
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush(&mut buffer, &sink, &name).await;
            }

            item = rx.recv() => {
                match item {
                    Some(item) => {
                        buffer.push(item);
                        if buffer.len() >= size {
                            flush(&mut buffer, &sink, &name).await;
                            ticker.reset();
                        }
                    }
                    None => {
                        // 句柄全部释放：冲刷残余后退出
                        flush(&mut buffer, &sink, &name).await;
                        debug!(bucket_name = %name, "bucket watcher exited");
                        return;
                    }
                }
            }
        }
    }
}

/// 冲刷当前缓冲
///
/// 空缓冲是空操作。sink 在独立任务中执行，panic 经 join 错误捕获后
/// 记录并吞掉；返回错误同样只记录。无论结果如何缓冲都已清空，
/// 该批次视为已交付。
async fn flush<T: Send + 'static>(buffer: &mut Vec<T>, sink: &Arc<dyn LeakSink<T>>, name: &str) {
    if buffer.is_empty() {
        return;
    }

    let items = std::mem::take(buffer);
    let count = items.len();
    let sink = Arc::clone(sink);

    let outcome = tokio::spawn(async move { sink.on_leak(items).await }).await;
    match outcome {
        Ok(Ok(())) => {
            debug!(bucket_name = %name, count, "bucket leaked");
        }
        Ok(Err(e)) => {
            error!(
                bucket_name = %name,
                count,
                error = %e,
                "calling leak handler returned an error"
            );
        }
        Err(join_err) if join_err.is_panic() => {
            error!(bucket_name = %name, count, "panic happened in bucket leak handler");
        }
        Err(join_err) => {
            error!(bucket_name = %name, count, error = %join_err, "leak handler task failed");
        }
    }
}
