//! 单通道 FIFO 队列

use domain::{ChannelId, Reading};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tokio::sync::Notify;
use tracing::debug;

/// 队列容量策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueCapacity {
    /// 不限深度（消费落后时队列持续增长）
    #[default]
    Unbounded,
    /// 有界队列，满时丢弃最旧的读数
    DropOldest(NonZeroUsize),
}

impl QueueCapacity {
    /// 从配置值构造：0 表示不限深度。
    pub fn from_limit(limit: usize) -> Self {
        match NonZeroUsize::new(limit) {
            Some(limit) => Self::DropOldest(limit),
            None => Self::Unbounded,
        }
    }

    fn limit(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::DropOldest(limit) => Some(limit.get()),
        }
    }
}

/// 单个监控点位的读数通道
///
/// 队列只由轮询生产者追加，只由读属性消费者（或停机清理）从队头取出。
pub struct Channel {
    id: ChannelId,
    capacity: QueueCapacity,
    queue: Mutex<VecDeque<Reading>>,
    ready: Notify,
    drained: Notify,
}

impl Channel {
    /// 创建空通道
    pub fn new(id: ChannelId, capacity: QueueCapacity) -> Self {
        Self {
            id,
            capacity,
            queue: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            drained: Notify::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// 追加读数到队尾，并唤醒等待就绪的任务。
    ///
    /// 有界队列已满时先移除最旧的读数并返回，由调用方计数。
    pub fn push(&self, value: Reading) -> Option<Reading> {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = match self.capacity.limit() {
                Some(limit) if queue.len() >= limit => queue.pop_front(),
                _ => None,
            };
            queue.push_back(value);
            evicted
        };

        if let Some(evicted) = evicted {
            debug!(
                target: "gw.channel",
                channel = %self.id,
                evicted = evicted.value(),
                "channel_reading_evicted"
            );
        }
        self.ready.notify_waiters();
        evicted
    }

    /// 取出队头读数；队列为空时立即返回 None。
    pub fn try_pop(&self) -> Option<Reading> {
        let (value, now_empty) = {
            let mut queue = self.queue.lock();
            let value = queue.pop_front();
            (value, value.is_some() && queue.is_empty())
        };

        if now_empty {
            self.drained.notify_waiters();
        }
        value
    }

    /// 等待队列被消费完。
    ///
    /// 队列已空时立即返回；否则等待取走最后一个元素的操作广播 drained。
    pub async fn drain_wait(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.is_empty() {
                return;
            }
            drained.await;
        }
    }

    /// 等待队列中出现读数。
    pub async fn wait_ready(&self) {
        loop {
            let ready = self.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();
            if !self.is_empty() {
                return;
            }
            ready.await;
        }
    }

    /// 丢弃所有未消费的读数，返回丢弃数量。
    pub fn clear(&self) -> usize {
        let discarded = {
            let mut queue = self.queue.lock();
            let discarded = queue.len();
            queue.clear();
            discarded
        };
        self.drained.notify_waiters();
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_from_limit() {
        assert_eq!(QueueCapacity::from_limit(0), QueueCapacity::Unbounded);
        assert_eq!(QueueCapacity::from_limit(3).limit(), Some(3));
    }

    #[test]
    fn clear_reports_discarded() {
        let channel = Channel::new(ChannelId(0), QueueCapacity::Unbounded);
        channel.push(Reading(1));
        channel.push(Reading(2));

        assert_eq!(channel.clear(), 2);
        assert!(channel.is_empty());
        assert_eq!(channel.clear(), 0);
    }
}
