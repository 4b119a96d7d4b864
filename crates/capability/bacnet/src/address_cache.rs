//! 设备地址缓存：从 I-Am 学习的设备实例 → 网络地址绑定
//!
//! 每个条目带剩余存活时间，由粗定时器按经过的时间递减，归零即淘汰。

use crate::npdu::NetAddress;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// 对端地址：B/IP MAC 加可选的远端网络地址
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub mac: SocketAddr,
    pub network: Option<NetAddress>,
}

impl PeerAddress {
    pub fn local(mac: SocketAddr) -> Self {
        Self { mac, network: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub address: PeerAddress,
    pub max_apdu: u32,
    remaining: Duration,
}

impl Binding {
    pub fn remaining(&self) -> Duration {
        self.remaining
    }
}

#[derive(Debug)]
pub struct AddressCache {
    entries: HashMap<u32, Binding>,
    ttl: Duration,
    capacity: usize,
}

impl AddressCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_CAPACITY: usize = 255;

    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// 绑定或刷新；缓存已满时淘汰剩余时间最短的条目
    pub fn bind(&mut self, device: u32, address: PeerAddress, max_apdu: u32) {
        if !self.entries.contains_key(&device) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, binding)| binding.remaining)
                .map(|(device, _)| *device);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            device,
            Binding {
                address,
                max_apdu,
                remaining: self.ttl,
            },
        );
    }

    pub fn lookup(&self, device: u32) -> Option<&Binding> {
        self.entries.get(&device)
    }

    /// 按经过时间递减存活时间，返回被淘汰的条目数
    pub fn expire(&mut self, elapsed: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, binding| {
            binding.remaining = binding.remaining.saturating_sub(elapsed);
            !binding.remaining.is_zero()
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY)
    }
}
