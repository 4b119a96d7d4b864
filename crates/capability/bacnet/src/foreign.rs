//! 外部设备（foreign device）注册状态机
//!
//! 向 BBMD 发送 Register-Foreign-Device，等待 BVLC-Result。
//! 细定时器驱动超时重传与租约倒计时，粗定时器周期性续约。

use crate::bvlc::{self, result_code};
use crate::stack::Outgoing;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// 未确认的注册请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRegistration {
    /// 已发送次数（首发为 1）
    pub attempt: u16,
    pub remaining: Duration,
}

#[derive(Debug)]
pub struct ForeignDeviceRegistration {
    bbmd: SocketAddr,
    ttl_seconds: u16,
    apdu_timeout: Duration,
    apdu_retries: u8,
    lease: Duration,
    pending: Option<PendingRegistration>,
}

impl ForeignDeviceRegistration {
    pub fn new(
        bbmd: SocketAddr,
        ttl_seconds: u16,
        apdu_timeout: Duration,
        apdu_retries: u8,
    ) -> Self {
        Self {
            bbmd,
            ttl_seconds,
            apdu_timeout,
            apdu_retries,
            lease: Duration::ZERO,
            pending: None,
        }
    }

    pub fn bbmd(&self) -> SocketAddr {
        self.bbmd
    }

    /// 租约仍有效（续约期间保持有效）
    pub fn is_registered(&self) -> bool {
        !self.lease.is_zero()
    }

    pub fn lease_remaining(&self) -> Duration {
        self.lease
    }

    pub fn pending(&self) -> Option<PendingRegistration> {
        self.pending
    }

    /// 发起注册或续约，返回待发送的请求
    pub fn request(&mut self) -> Outgoing {
        self.pending = Some(PendingRegistration {
            attempt: 1,
            remaining: self.apdu_timeout,
        });
        self.frame()
    }

    fn frame(&self) -> Outgoing {
        Outgoing {
            to: self.bbmd,
            datagram: bvlc::register_foreign_device(self.ttl_seconds),
        }
    }

    /// 处理 BVLC-Result；来源不是 BBMD 时返回 false
    pub fn on_result(&mut self, from: SocketAddr, code: u16) -> bool {
        if from != self.bbmd {
            return false;
        }

        match code {
            result_code::SUCCESSFUL_COMPLETION => {
                self.pending = None;
                self.lease = Duration::from_secs(u64::from(self.ttl_seconds));
                info!(
                    target: "gw.bacnet",
                    bbmd = %self.bbmd,
                    ttl_seconds = self.ttl_seconds,
                    "foreign_device_registered"
                );
            }
            result_code::REGISTER_FOREIGN_DEVICE_NAK => {
                self.pending = None;
                self.lease = Duration::ZERO;
                warn!(target: "gw.bacnet", bbmd = %self.bbmd, "foreign_device_registration_nak");
            }
            code => {
                warn!(
                    target: "gw.bacnet",
                    bbmd = %self.bbmd,
                    result = format_args!("{:#06x}", code),
                    "bvlc_result_ignored"
                );
            }
        }
        true
    }

    /// 细定时器推进：租约倒计时、未确认请求超时重传
    pub fn tick(&mut self, elapsed: Duration) -> Option<Outgoing> {
        if !self.lease.is_zero() {
            self.lease = self.lease.saturating_sub(elapsed);
            if self.lease.is_zero() {
                warn!(target: "gw.bacnet", bbmd = %self.bbmd, "foreign_device_lease_expired");
            }
        }

        let pending = self.pending.as_mut()?;
        pending.remaining = pending.remaining.saturating_sub(elapsed);
        if !pending.remaining.is_zero() {
            return None;
        }

        if pending.attempt <= u16::from(self.apdu_retries) {
            pending.attempt += 1;
            pending.remaining = self.apdu_timeout;
            let attempt = pending.attempt;
            warn!(
                target: "gw.bacnet",
                bbmd = %self.bbmd,
                attempt,
                "foreign_device_registration_retransmit"
            );
            Some(self.frame())
        } else {
            self.pending = None;
            warn!(
                target: "gw.bacnet",
                bbmd = %self.bbmd,
                attempts = u16::from(self.apdu_retries) + 1,
                "foreign_device_registration_timeout"
            );
            None
        }
    }
}
