//! # 采集能力模块
//!
//! 从 Modbus TCP 服务器批量读取寄存器，并按位置写入各通道队列：
//!
//! ```text
//! ModbusTcpConnector ──connect──▶ RegisterSource
//!                                      │ read_registers(A, B)
//!                                      ▼
//!                                PollProducer ──push(value i)──▶ ChannelSet[i]   (i < min(B, N))
//! ```
//!
//! ## 失败策略
//!
//! - 连接失败：按有界指数退避重试，次数耗尽后任务结束并返回错误。
//! - 读取失败：记录后跳过本轮；连续失败达到阈值时断开并按同样的退避重连。

mod backoff;
mod error;
mod modbus_tcp;
mod producer;
mod types;

pub use backoff::Backoff;
pub use error::ProtocolError;
pub use modbus_tcp::{ModbusTcpConfig, ModbusTcpConnector};
pub use producer::{PollConfig, PollProducer, PublishSummary};
pub use types::*;
