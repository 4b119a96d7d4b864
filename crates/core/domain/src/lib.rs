pub mod data;

pub use data::{ChannelId, Reading};

/// 网关拓扑：生产者与消费者共享的通道约定。
///
/// 生产者把批次中第 i 个值写入通道 i，消费者把 Analog Input 实例 i 解析为通道 i，
/// 两端必须对通道数量达成一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    pub channel_count: usize,
}

impl ChannelLayout {
    /// 构造固定通道数量的布局。
    pub fn new(channel_count: usize) -> Self {
        Self { channel_count }
    }

    /// 批次位置映射到通道；超出通道范围的位置返回 None。
    pub fn channel_for_position(&self, position: usize) -> Option<ChannelId> {
        (position < self.channel_count).then_some(ChannelId(position))
    }

    /// 对象实例号映射到通道（实例号与通道编号一一对应）。
    pub fn channel_for_instance(&self, instance: u32) -> Option<ChannelId> {
        let index = usize::try_from(instance).ok()?;
        self.channel_for_position(index)
    }

    /// 所有通道编号。
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> {
        (0..self.channel_count).map(ChannelId)
    }
}
