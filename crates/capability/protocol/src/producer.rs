//! 轮询生产者
//!
//! 独立的长生命周期任务：周期性批量读取寄存器，把第 i 个值写入通道 i。
//! 不持有协议栈锁，每次只短暂持有单个通道的锁。

use crate::backoff::Backoff;
use crate::error::ProtocolError;
use crate::types::{RegisterConnector, RegisterSource};
use domain::Reading;
use gw_channel::ChannelSet;
use gw_telemetry::{
    record_poll, record_poll_failure, record_reading_evicted, record_readings_discarded,
    record_readings_pushed, record_reconnect,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 轮询参数
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// 起始寄存器地址 A
    pub register_address: u16,
    /// 批大小 B
    pub batch_size: u16,
    /// 轮询间隔
    pub interval: Duration,
    /// 连接/重连退避
    pub reconnect: Backoff,
    /// 连续读取失败多少次后重连（0 表示从不重连）
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            register_address: 48,
            batch_size: 10,
            interval: Duration::from_millis(100),
            reconnect: Backoff::default(),
            max_consecutive_failures: 5,
        }
    }
}

/// 单批读数的分发结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub pushed: usize,
    pub evicted: usize,
    pub discarded: usize,
}

/// 轮询生产者
pub struct PollProducer {
    connector: Arc<dyn RegisterConnector>,
    channels: Arc<ChannelSet>,
    config: PollConfig,
}

impl PollProducer {
    pub fn new(
        connector: Arc<dyn RegisterConnector>,
        channels: Arc<ChannelSet>,
        config: PollConfig,
    ) -> Self {
        Self {
            connector,
            channels,
            config,
        }
    }

    /// 在后台任务中运行
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<(), ProtocolError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// 运行采集循环，直到取消或连接无法恢复
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ProtocolError> {
        let endpoint = self.connector.endpoint();
        let Some(mut source) = self.connect_with_backoff(&cancel).await? else {
            info!(target: "gw.poll", %endpoint, "poll_producer_cancelled");
            return Ok(());
        };

        info!(
            target: "gw.poll",
            %endpoint,
            register = self.config.register_address,
            batch_size = self.config.batch_size,
            channels = self.channels.len(),
            "poll_producer_started"
        );

        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match source
                .read_registers(self.config.register_address, self.config.batch_size)
                .await
            {
                Ok(values) => {
                    failures = 0;
                    record_poll();
                    self.publish(&values);
                }
                Err(err) => {
                    failures += 1;
                    record_poll_failure();
                    warn!(
                        target: "gw.poll",
                        %endpoint,
                        register = self.config.register_address,
                        consecutive_failures = failures,
                        error = %err,
                        "modbus_read_failed"
                    );

                    let threshold = self.config.max_consecutive_failures;
                    if threshold > 0 && failures >= threshold {
                        warn!(target: "gw.poll", %endpoint, "modbus_reconnecting");
                        drop(source);
                        record_reconnect();
                        source = match self.connect_with_backoff(&cancel).await? {
                            Some(source) => source,
                            None => return Ok(()),
                        };
                        failures = 0;
                    }
                }
            }
        }

        info!(target: "gw.poll", %endpoint, "poll_producer_stopped");
        Ok(())
    }

    /// 把一批寄存器值按位置写入通道；超出通道范围的值被丢弃。
    pub fn publish(&self, values: &[u16]) -> PublishSummary {
        let layout = self.channels.layout();
        let take = values.len().min(usize::from(self.config.batch_size));
        let mut summary = PublishSummary::default();

        for (position, value) in values.iter().take(take).enumerate() {
            let channel = layout
                .channel_for_position(position)
                .and_then(|id| self.channels.get(id));
            match channel {
                Some(channel) => {
                    if channel.push(Reading(*value)).is_some() {
                        summary.evicted += 1;
                        record_reading_evicted();
                    }
                    summary.pushed += 1;
                }
                None => summary.discarded += 1,
            }
        }

        record_readings_pushed(summary.pushed as u64);
        record_readings_discarded(summary.discarded as u64);
        debug!(
            target: "gw.poll",
            pushed = summary.pushed,
            evicted = summary.evicted,
            discarded = summary.discarded,
            "poll_batch_published"
        );
        summary
    }

    /// 按退避策略建立连接；被取消时返回 None。
    async fn connect_with_backoff(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn RegisterSource>>, ProtocolError> {
        let endpoint = self.connector.endpoint();
        let backoff = self.config.reconnect;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = self.connector.connect() => result,
            };

            let err = match result {
                Ok(source) => return Ok(Some(source)),
                Err(err) => err,
            };

            if !backoff.allows_retry_after(attempt) {
                error!(
                    target: "gw.poll",
                    %endpoint,
                    attempts = attempt,
                    error = %err,
                    "modbus_connect_failed"
                );
                return Err(err);
            }

            let delay = backoff.delay_after(attempt);
            warn!(
                target: "gw.poll",
                %endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "modbus_connect_retry"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
