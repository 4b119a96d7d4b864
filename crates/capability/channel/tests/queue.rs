use domain::{ChannelId, ChannelLayout, Reading};
use gw_channel::{Channel, ChannelSet, QueueCapacity};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn unbounded(n: usize) -> ChannelSet {
    ChannelSet::new(ChannelLayout::new(n), QueueCapacity::Unbounded)
}

#[test]
fn pops_in_push_order() {
    let set = unbounded(1);
    let channel = set.get(ChannelId(0)).expect("channel");
    for value in [10, 20, 30, 40] {
        assert!(channel.push(Reading(value)).is_none());
    }

    let popped: Vec<u16> = std::iter::from_fn(|| channel.try_pop().map(Reading::value)).collect();
    assert_eq!(popped, vec![10, 20, 30, 40]);
    assert!(channel.try_pop().is_none());
}

#[test]
fn out_of_range_channel_is_absent() {
    let set = unbounded(4);
    assert_eq!(set.len(), 4);
    assert!(set.get(ChannelId(3)).is_some());
    assert!(set.get(ChannelId(4)).is_none());
}

#[test]
fn bounded_queue_drops_oldest() {
    let channel = Channel::new(ChannelId(0), QueueCapacity::from_limit(2));
    assert!(channel.push(Reading(1)).is_none());
    assert!(channel.push(Reading(2)).is_none());
    assert_eq!(channel.push(Reading(3)), Some(Reading(1)));

    assert_eq!(channel.len(), 2);
    assert_eq!(channel.try_pop(), Some(Reading(2)));
    assert_eq!(channel.try_pop(), Some(Reading(3)));
}

#[test]
fn fifo_holds_across_threads() {
    let set = Arc::new(unbounded(1));
    let total = 10_000u16;

    let producer = {
        let set = Arc::clone(&set);
        std::thread::spawn(move || {
            let channel = set.get(ChannelId(0)).expect("channel");
            for value in 0..total {
                channel.push(Reading(value));
            }
        })
    };

    let channel = set.get(ChannelId(0)).expect("channel");
    let mut popped = Vec::with_capacity(total as usize);
    let started = Instant::now();
    while popped.len() < total as usize {
        match channel.try_pop() {
            Some(reading) => popped.push(reading.value()),
            None => std::thread::yield_now(),
        }
        assert!(started.elapsed() < Duration::from_secs(10), "consumer starved");
    }
    producer.join().expect("producer");

    assert!(popped.iter().copied().eq(0..total));
}

#[test]
fn try_pop_on_empty_returns_promptly_under_producer_load() {
    let set = Arc::new(unbounded(2));
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let producer = {
        let set = Arc::clone(&set);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let busy = set.get(ChannelId(1)).expect("channel");
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                busy.push(Reading(7));
                busy.try_pop();
            }
        })
    };

    let idle = set.get(ChannelId(0)).expect("channel");
    for _ in 0..1_000 {
        let started = Instant::now();
        assert!(idle.try_pop().is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    producer.join().expect("producer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_wait_on_one_channel_does_not_block_another() {
    let set = Arc::new(unbounded(2));
    set.get(ChannelId(0)).expect("channel").push(Reading(1));

    let waiter = {
        let set = Arc::clone(&set);
        tokio::spawn(async move { set.get(ChannelId(0)).expect("channel").drain_wait().await })
    };

    let other = set.get(ChannelId(1)).expect("channel");
    other.push(Reading(5));
    assert_eq!(other.try_pop(), Some(Reading(5)));
    assert!(!waiter.is_finished());

    assert_eq!(set.get(ChannelId(0)).expect("channel").try_pop(), Some(Reading(1)));
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("drain completes")
        .expect("join");
}

#[tokio::test]
async fn drain_wait_returns_immediately_when_empty() {
    let channel = Channel::new(ChannelId(0), QueueCapacity::Unbounded);
    tokio::time::timeout(Duration::from_millis(100), channel.drain_wait())
        .await
        .expect("empty channel drains at once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_wait_waits_for_last_pop() {
    let channel = Arc::new(Channel::new(ChannelId(0), QueueCapacity::Unbounded));
    channel.push(Reading(1));
    channel.push(Reading(2));

    let waiter = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.drain_wait().await })
    };

    channel.try_pop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    channel.try_pop();
    tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("drained")
        .expect("join");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_ready_wakes_on_push() {
    let channel = Arc::new(Channel::new(ChannelId(0), QueueCapacity::Unbounded));
    let waiter = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            channel.wait_ready().await;
            channel.try_pop()
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    channel.push(Reading(42));

    let popped = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("woken")
        .expect("join");
    assert_eq!(popped, Some(Reading(42)));
}

#[tokio::test]
async fn drain_all_clears_unconsumed_channels_after_timeout() {
    let set = unbounded(3);
    set.get(ChannelId(1)).expect("channel").push(Reading(1));
    set.get(ChannelId(1)).expect("channel").push(Reading(2));

    let report = set.drain_all(Duration::from_millis(50)).await;

    assert_eq!(report.drained_channels, 2);
    assert_eq!(report.discarded_readings, 2);
    assert_eq!(set.pending(), 0);
}
