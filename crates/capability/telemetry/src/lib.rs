//! 日志初始化与网关计数指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub poll_failures: u64,
    pub reconnects: u64,
    pub readings_pushed: u64,
    pub readings_evicted: u64,
    pub readings_discarded: u64,
    pub reads_fresh: u64,
    pub reads_stale: u64,
    pub datagrams_dispatched: u64,
    pub datagrams_dropped: u64,
    pub fine_ticks: u64,
    pub coarse_ticks: u64,
}

impl MetricsSnapshot {
    /// 以单行 JSON 输出（停机日志使用）。
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 网关计数指标。
pub struct GatewayMetrics {
    polls: AtomicU64,
    poll_failures: AtomicU64,
    reconnects: AtomicU64,
    readings_pushed: AtomicU64,
    readings_evicted: AtomicU64,
    readings_discarded: AtomicU64,
    reads_fresh: AtomicU64,
    reads_stale: AtomicU64,
    datagrams_dispatched: AtomicU64,
    datagrams_dropped: AtomicU64,
    fine_ticks: AtomicU64,
    coarse_ticks: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            poll_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            readings_pushed: AtomicU64::new(0),
            readings_evicted: AtomicU64::new(0),
            readings_discarded: AtomicU64::new(0),
            reads_fresh: AtomicU64::new(0),
            reads_stale: AtomicU64::new(0),
            datagrams_dispatched: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            fine_ticks: AtomicU64::new(0),
            coarse_ticks: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            readings_pushed: self.readings_pushed.load(Ordering::Relaxed),
            readings_evicted: self.readings_evicted.load(Ordering::Relaxed),
            readings_discarded: self.readings_discarded.load(Ordering::Relaxed),
            reads_fresh: self.reads_fresh.load(Ordering::Relaxed),
            reads_stale: self.reads_stale.load(Ordering::Relaxed),
            datagrams_dispatched: self.datagrams_dispatched.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            fine_ticks: self.fine_ticks.load(Ordering::Relaxed),
            coarse_ticks: self.coarse_ticks.load(Ordering::Relaxed),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static GatewayMetrics {
    METRICS.get_or_init(GatewayMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录一次成功的批量轮询。
pub fn record_poll() {
    metrics().polls.fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询失败（连接或读取）。
pub fn record_poll_failure() {
    metrics().poll_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连次数。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入通道的读数。
pub fn record_readings_pushed(count: u64) {
    metrics().readings_pushed.fetch_add(count, Ordering::Relaxed);
}

/// 记录因队列已满被挤出的读数。
pub fn record_reading_evicted() {
    metrics().readings_evicted.fetch_add(1, Ordering::Relaxed);
}

/// 记录超出通道范围或停机时被丢弃的读数。
pub fn record_readings_discarded(count: u64) {
    metrics().readings_discarded.fetch_add(count, Ordering::Relaxed);
}

/// 记录读属性请求取到了新值。
pub fn record_read_fresh() {
    metrics().reads_fresh.fetch_add(1, Ordering::Relaxed);
}

/// 记录读属性请求沿用旧值。
pub fn record_read_stale() {
    metrics().reads_stale.fetch_add(1, Ordering::Relaxed);
}

/// 记录已分发的入站报文。
pub fn record_datagram_dispatched() {
    metrics().datagrams_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录无法解析而丢弃的入站报文。
pub fn record_datagram_dropped() {
    metrics().datagrams_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录细粒度定时器滴答。
pub fn record_fine_tick() {
    metrics().fine_ticks.fetch_add(1, Ordering::Relaxed);
}

/// 记录粗粒度定时器滴答。
pub fn record_coarse_tick() {
    metrics().coarse_ticks.fetch_add(1, Ordering::Relaxed);
}
