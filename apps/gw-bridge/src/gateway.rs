//! 网关装配与生命周期。
//!
//! 启动顺序：解析地址 → 建立通道集合 → 构造协议栈（读属性消费者接管模拟输入）
//! → 向 BBMD 注册并广播 I-Am → 启动分发循环与两个维护定时器 → 启动轮询生产者。
//!
//! 生产者失败只结束生产者自身，协议栈任务继续运行并对外提供最后的值。

use crate::read_consumer::QueuedAnalogInputs;
use domain::ChannelLayout;
use gw_bacnet::{
    DeviceInfo, DispatchLoop, StackConfig, StackLock, StackState, register_default_handlers,
    spawn_coarse_timer, spawn_fine_timer,
};
use gw_channel::{ChannelSet, DrainReport, QueueCapacity};
use gw_config::GatewayConfig;
use gw_protocol::{Backoff, PollConfig, PollProducer, RegisterConnector};
use gw_telemetry::record_readings_discarded;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 启动错误。
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("unresolvable address: {0}")]
    Unresolvable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 运行中的网关。
pub struct Gateway {
    channels: Arc<ChannelSet>,
    lock: StackLock,
    local_addr: SocketAddr,
    producer_cancel: CancellationToken,
    stack_cancel: CancellationToken,
    producer: JoinHandle<()>,
    stack_tasks: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl Gateway {
    pub async fn start(
        config: &GatewayConfig,
        connector: Arc<dyn RegisterConnector>,
    ) -> Result<Self, StartupError> {
        let bind = resolve(&config.bacnet_bind, config.bacnet_port).await?;
        let broadcast = resolve(&config.bacnet_broadcast, config.bacnet_port).await?;
        let bbmd = match &config.bbmd_addr {
            Some(host) => Some(resolve(host, config.bbmd_port).await?),
            None => None,
        };

        let channels = Arc::new(ChannelSet::new(
            ChannelLayout::new(config.channel_count),
            QueueCapacity::from_limit(config.channel_capacity),
        ));

        let mut stack_config = StackConfig::new(
            DeviceInfo::new(
                config.device_instance,
                config.device_name.clone(),
                config.vendor_id,
            ),
            broadcast,
        );
        stack_config.bbmd = bbmd;
        stack_config.bbmd_ttl_seconds = config.bbmd_ttl_seconds;

        let inputs = QueuedAnalogInputs::new(Arc::clone(&channels));
        let (mut state, outbox) = StackState::new(stack_config, vec![Box::new(inputs)]);
        register_default_handlers(&mut state);
        if state.register_with_bbmd() {
            info!(target: "gw.bridge", bbmd = ?bbmd, "foreign_device_registration_started");
        }
        state.send_i_am();

        let lock = StackLock::new(state);
        let dispatch =
            DispatchLoop::bind(bind, lock.clone(), outbox, config.receive_timeout()).await?;
        let local_addr = dispatch.local_addr()?;

        let stack_cancel = CancellationToken::new();
        let stack_tasks = vec![
            dispatch.spawn(stack_cancel.clone()),
            spawn_fine_timer(lock.clone(), config.fine_tick(), stack_cancel.clone()),
            spawn_coarse_timer(lock.clone(), config.coarse_tick(), stack_cancel.clone()),
        ];

        let poll = PollConfig {
            register_address: config.register_address,
            batch_size: config.batch_size,
            interval: Duration::from_millis(config.poll_interval_ms),
            reconnect: Backoff::new(
                Duration::from_millis(config.reconnect_initial_ms),
                Duration::from_millis(config.reconnect_max_ms),
                config.reconnect_max_attempts,
            ),
            max_consecutive_failures: config.max_consecutive_read_failures,
        };
        let producer_cancel = CancellationToken::new();
        let producer_task = PollProducer::new(connector, Arc::clone(&channels), poll)
            .spawn(producer_cancel.clone());
        let producer = tokio::spawn(async move {
            match producer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(target: "gw.bridge", error = %err, "poll_producer_failed");
                }
                Err(err) => {
                    error!(target: "gw.bridge", error = %err, "poll_producer_panicked");
                }
            }
        });

        info!(
            target: "gw.bridge",
            %local_addr,
            device_instance = config.device_instance,
            channels = channels.len(),
            "gateway_started"
        );

        Ok(Self {
            channels,
            lock,
            local_addr,
            producer_cancel,
            stack_cancel,
            producer,
            stack_tasks,
            drain_timeout: config.shutdown_drain_timeout(),
        })
    }

    /// 分发循环实际绑定的地址
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[cfg(test)]
    pub fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    #[cfg(test)]
    pub fn lock(&self) -> &StackLock {
        &self.lock
    }

    /// 生产者任务是否已经结束（取消或连接无法恢复）
    #[cfg(test)]
    pub fn producer_finished(&self) -> bool {
        self.producer.is_finished()
    }

    /// 停机：先停生产者，在分发循环仍在服务时排空通道，最后停协议栈任务。
    pub async fn shutdown(self) -> DrainReport {
        self.producer_cancel.cancel();
        if let Err(err) = self.producer.await {
            warn!(target: "gw.bridge", error = %err, "poll_producer_join_failed");
        }

        let report = self.channels.drain_all(self.drain_timeout).await;
        record_readings_discarded(report.discarded_readings as u64);

        self.stack_cancel.cancel();
        for task in self.stack_tasks {
            if let Err(err) = task.await {
                warn!(target: "gw.bridge", error = %err, "stack_task_join_failed");
            }
        }

        info!(
            target: "gw.bridge",
            drained_channels = report.drained_channels,
            discarded_readings = report.discarded_readings,
            max_lock_holders = self.lock.max_concurrent_holders(),
            "gateway_stopped"
        );
        report
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, StartupError> {
    lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| StartupError::Unresolvable(format!("{}:{}", host, port)))
}
