use std::fmt;

/// 通道编号（0..N-1，启动时确定）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// 一次轮询得到的寄存器读数。
///
/// 读数没有独立身份，所属通道由所在队列隐式决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading(pub u16);

impl Reading {
    pub fn value(self) -> u16 {
        self.0
    }

    /// 以 REAL 形式对外呈现的值。
    pub fn as_real(self) -> f32 {
        f32::from(self.0)
    }
}

impl From<u16> for Reading {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
