//! 协议栈粗粒度锁
//!
//! 分发循环处理一条消息、细定时器一次 tick、粗定时器一次 tick，三者互斥。
//! 通过闭包访问状态，锁不可能跨越 `.await`。

use crate::stack::StackState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 持有时间或等待时间超过该值时告警
const SLOW_LOCK_THRESHOLD: Duration = Duration::from_millis(5);

/// 访问协议栈状态的执行者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Dispatch,
    FineTimer,
    CoarseTimer,
}

impl Actor {
    fn slot(self) -> usize {
        match self {
            Actor::Dispatch => 0,
            Actor::FineTimer => 1,
            Actor::CoarseTimer => 2,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Actor::Dispatch => "dispatch",
            Actor::FineTimer => "fine_timer",
            Actor::CoarseTimer => "coarse_timer",
        };
        f.write_str(name)
    }
}

struct Occupancy {
    holders: AtomicUsize,
    max_holders: AtomicUsize,
    acquisitions: [AtomicU64; 3],
}

/// 持有者计数，离开作用域（含 panic 展开）时归还
struct HolderGuard<'a> {
    holders: &'a AtomicUsize,
    count: usize,
}

impl<'a> HolderGuard<'a> {
    fn enter(holders: &'a AtomicUsize) -> Self {
        let count = holders.fetch_add(1, Ordering::SeqCst) + 1;
        Self { holders, count }
    }
}

impl Drop for HolderGuard<'_> {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 协议栈状态的唯一互斥锁，可克隆共享
#[derive(Clone)]
pub struct StackLock {
    state: Arc<Mutex<StackState>>,
    occupancy: Arc<Occupancy>,
}

impl StackLock {
    pub fn new(state: StackState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            occupancy: Arc::new(Occupancy {
                holders: AtomicUsize::new(0),
                max_holders: AtomicUsize::new(0),
                acquisitions: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            }),
        }
    }

    /// 持锁执行 `f`：free → held by `actor` → free
    pub fn with<R>(&self, actor: Actor, f: impl FnOnce(&mut StackState) -> R) -> R {
        let wait_start = Instant::now();
        let mut state = self.state.lock();
        let waited = wait_start.elapsed();

        let occupancy = &self.occupancy;
        let holder = HolderGuard::enter(&occupancy.holders);
        occupancy.max_holders.fetch_max(holder.count, Ordering::SeqCst);
        occupancy.acquisitions[actor.slot()].fetch_add(1, Ordering::Relaxed);

        let hold_start = Instant::now();
        let result = f(&mut state);
        let held = hold_start.elapsed();

        // 先离开计数再释放锁；闭包 panic 时按同样顺序析构
        drop(holder);
        drop(state);

        if held > SLOW_LOCK_THRESHOLD || waited > SLOW_LOCK_THRESHOLD {
            warn!(
                target: "gw.bacnet",
                %actor,
                held_us = held.as_micros() as u64,
                waited_us = waited.as_micros() as u64,
                "stack_lock_slow"
            );
        } else {
            debug!(
                target: "gw.bacnet",
                %actor,
                held_us = held.as_micros() as u64,
                "stack_lock_released"
            );
        }
        result
    }

    /// 观察到的最大同时持有者数（应恒为 1）
    pub fn max_concurrent_holders(&self) -> usize {
        self.occupancy.max_holders.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self, actor: Actor) -> u64 {
        self.occupancy.acquisitions[actor.slot()].load(Ordering::Relaxed)
    }
}
