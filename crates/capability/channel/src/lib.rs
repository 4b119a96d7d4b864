//! # 通道队列能力模块
//!
//! 每个监控点位一条通道，通道内是按到达顺序排列的读数队列：
//!
//! ```text
//! PollProducer ──push──▶ Channel[i] (Mutex<VecDeque<Reading>>) ──try_pop──▶ Read Consumer
//!                              │ ready   ── 有新值时唤醒等待者
//!                              │ drained ── 最后一个元素被取走时广播
//! ```
//!
//! - 每条通道持有独立的锁，不存在覆盖所有队列的全局锁。
//! - `push` 只在获取锁时可能等待；`try_pop` 从不阻塞。
//! - `drain_wait` 是唯一有意阻塞的操作，仅用于停机。

mod channel;
mod set;

pub use channel::{Channel, QueueCapacity};
pub use set::{ChannelSet, DrainReport};
