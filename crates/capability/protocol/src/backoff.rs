//! 有界指数退避

use std::time::Duration;

/// 连接重试策略
///
/// 第 n 次失败后等待 `initial * 2^(n-1)`，不超过 `max`；
/// 失败次数达到 `max_attempts` 后放弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max: max.max(initial),
            max_attempts: max_attempts.max(1),
        }
    }

    /// 只尝试一次，失败即停止
    pub fn fail_stop() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1)
    }

    /// 第 `attempt` 次（从 1 开始）失败后的等待时长
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// 是否还允许下一次尝试
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 10);
        assert_eq!(backoff.delay_after(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_after(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_after(4), Duration::from_millis(500));
        assert_eq!(backoff.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn attempts_are_bounded() {
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(1), 3);
        assert!(backoff.allows_retry_after(2));
        assert!(!backoff.allows_retry_after(3));
        assert!(!Backoff::fail_stop().allows_retry_after(1));
    }
}
