//! 通道集合

use crate::channel::{Channel, QueueCapacity};
use domain::{ChannelId, ChannelLayout};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 停机排空结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 在期限内被消费完的通道数
    pub drained_channels: usize,
    /// 超时后被丢弃的读数总数
    pub discarded_readings: usize,
}

/// 进程生命周期内固定数量的通道
///
/// 每条通道独立加锁，对一条通道的操作不会因另一条通道的竞争而阻塞。
pub struct ChannelSet {
    layout: ChannelLayout,
    channels: Vec<Channel>,
}

impl ChannelSet {
    /// 按布局创建全部空通道
    pub fn new(layout: ChannelLayout, capacity: QueueCapacity) -> Self {
        let channels = layout
            .channels()
            .map(|id| Channel::new(id, capacity))
            .collect();
        Self { layout, channels }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// 查找通道；编号越界时返回 None。
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// 所有通道中待消费读数的总数
    pub fn pending(&self) -> usize {
        self.channels.iter().map(Channel::len).sum()
    }

    /// 停机排空：在共同期限内逐个等待通道消费完，超时的通道直接清空。
    pub async fn drain_all(&self, timeout: Duration) -> DrainReport {
        let deadline = Instant::now() + timeout;
        let mut report = DrainReport::default();

        for channel in &self.channels {
            match tokio::time::timeout_at(deadline, channel.drain_wait()).await {
                Ok(()) => report.drained_channels += 1,
                Err(_) => {
                    let discarded = channel.clear();
                    warn!(
                        target: "gw.channel",
                        channel = %channel.id(),
                        discarded,
                        "channel_drain_timeout"
                    );
                    report.discarded_readings += discarded;
                }
            }
        }

        info!(
            target: "gw.channel",
            drained_channels = report.drained_channels,
            discarded_readings = report.discarded_readings,
            "channels_drained"
        );
        report
    }
}
