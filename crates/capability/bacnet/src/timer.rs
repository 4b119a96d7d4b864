//! 维护定时器
//!
//! 细定时器（默认 1 s）与粗定时器（默认 60 s）各自是独立任务，
//! 每次 tick 在协议栈锁内执行完整的维护逻辑，随后释放锁并休眠。

use crate::lock::{Actor, StackLock};
use crate::stack::StackState;
use gw_telemetry::{record_coarse_tick, record_fine_tick};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn spawn_fine_timer(
    lock: StackLock,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_timer(
        lock,
        period,
        cancel,
        Actor::FineTimer,
        StackState::fine_tick,
        record_fine_tick,
    ))
}

pub fn spawn_coarse_timer(
    lock: StackLock,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_timer(
        lock,
        period,
        cancel,
        Actor::CoarseTimer,
        StackState::coarse_tick,
        record_coarse_tick,
    ))
}

/// 按实际经过的时间推进，调度延迟不会让倒计时变慢
async fn run_timer(
    lock: StackLock,
    period: Duration,
    cancel: CancellationToken,
    actor: Actor,
    tick: fn(&mut StackState, Duration),
    record: fn(),
) {
    info!(
        target: "gw.timer",
        %actor,
        period_ms = period.as_millis() as u64,
        "maintenance_timer_started"
    );

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        let elapsed = now.duration_since(last);
        last = now;

        lock.with(actor, |state| tick(state, elapsed));
        record();
    }

    info!(target: "gw.timer", %actor, "maintenance_timer_stopped");
}
