//! BACnet/IP 协议栈
//!
//! 网关的接收侧：BVLC/NPDU/APDU 编解码、对象表、服务处理器、地址缓存、
//! 外部设备注册，以及围绕单一协议栈状态的并发纪律。
//!
//! ```text
//!   fine timer ──┐
//! coarse timer ──┼── StackLock ── StackState ──► outbox
//! dispatch loop ─┘                                  │
//!       ▲                                           ▼
//!       └──────────── UdpSocket ◄──── ms_tick (不持锁)
//! ```
//!
//! 任何时刻至多一个执行者持有 [`StackLock`]；持锁期间只生成报文，
//! 套接字读写都在锁外完成。

pub mod address_cache;
pub mod analog_input;
pub mod apdu;
pub mod bvlc;
pub mod codec;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod foreign;
pub mod handlers;
pub mod lock;
pub mod npdu;
pub mod object;
pub mod stack;
pub mod timer;

pub use address_cache::{AddressCache, PeerAddress};
pub use analog_input::AnalogInputs;
pub use apdu::{ConfirmedRequest, ConfirmedService, UnconfirmedService};
pub use device::DeviceInfo;
pub use dispatch::DispatchLoop;
pub use error::DecodeError;
pub use foreign::ForeignDeviceRegistration;
pub use lock::{Actor, StackLock};
pub use object::{
    ObjectDescriptor, ObjectId, ObjectTable, ObjectType, PropertyError, PropertyId,
    PropertyValue, ReadPropertyRequest, WritePropertyRequest,
};
pub use stack::{OutboxReceiver, Outgoing, StackConfig, StackState};
pub use timer::{spawn_coarse_timer, spawn_fine_timer};

/// 注册默认服务处理器：Who-Is 与 ReadProperty
pub fn register_default_handlers(state: &mut StackState) {
    state.set_unconfirmed_handler(UnconfirmedService::WhoIs, handlers::handle_who_is);
    state.set_confirmed_handler(ConfirmedService::ReadProperty, handlers::handle_read_property);
}
