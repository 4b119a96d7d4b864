//! 协议栈状态
//!
//! 设备对象、对象表、服务处理器注册表、地址缓存、外部设备注册状态与发件箱。
//! 所有可变访问都经由 [`StackLock`](crate::StackLock) 串行化；
//! 这里的方法只生成报文放入发件箱，从不触碰套接字。

use crate::address_cache::{AddressCache, PeerAddress};
use crate::apdu::{
    self, AbortReason, ConfirmedRequest, ConfirmedService, IAm, RejectReason,
    UnconfirmedService, pdu_type,
};
use crate::bvlc::{self, BvlcMessage, result_code};
use crate::device::{DeviceInfo, DeviceObject, MAX_APDU_LENGTH, SEGMENTATION_NONE};
use crate::error::DecodeError;
use crate::foreign::ForeignDeviceRegistration;
use crate::npdu::Npdu;
use crate::object::{ObjectDescriptor, ObjectId, ObjectTable, ObjectType};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 待发送的数据报
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub to: SocketAddr,
    pub datagram: Vec<u8>,
}

pub type OutboxReceiver = mpsc::UnboundedReceiver<Outgoing>;

/// 非确认服务处理器
pub type UnconfirmedHandler =
    fn(&mut StackState, &PeerAddress, &[u8]) -> Result<(), DecodeError>;

/// 确认服务处理器，返回应答 APDU
pub type ConfirmedHandler = fn(&mut StackState, &PeerAddress, &ConfirmedRequest<'_>) -> Vec<u8>;

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub device: DeviceInfo,
    /// 本地网段广播地址
    pub broadcast: SocketAddr,
    /// 配置后以外部设备身份向该 BBMD 注册
    pub bbmd: Option<SocketAddr>,
    pub bbmd_ttl_seconds: u16,
    pub apdu_timeout: Duration,
    pub apdu_retries: u8,
    pub address_ttl: Duration,
}

impl StackConfig {
    pub fn new(device: DeviceInfo, broadcast: SocketAddr) -> Self {
        Self {
            device,
            broadcast,
            bbmd: None,
            bbmd_ttl_seconds: 90,
            apdu_timeout: Duration::from_secs(3),
            apdu_retries: 3,
            address_ttl: AddressCache::DEFAULT_TTL,
        }
    }
}

pub struct StackState {
    device: DeviceInfo,
    broadcast: SocketAddr,
    objects: ObjectTable,
    unconfirmed: HashMap<u8, UnconfirmedHandler>,
    confirmed: HashMap<u8, ConfirmedHandler>,
    address_cache: AddressCache,
    registration: Option<ForeignDeviceRegistration>,
    outbox: mpsc::UnboundedSender<Outgoing>,
}

impl StackState {
    /// 设备对象由 `config.device` 生成并排在对象表首位，
    /// 其 object-list 覆盖 `objects` 中的全部对象
    pub fn new(
        config: StackConfig,
        objects: Vec<Box<dyn ObjectDescriptor>>,
    ) -> (Self, OutboxReceiver) {
        let object_ids: Vec<ObjectId> = objects
            .iter()
            .flat_map(|descriptor| descriptor.object_ids())
            .collect();
        let mut descriptors: Vec<Box<dyn ObjectDescriptor>> =
            Vec::with_capacity(objects.len() + 1);
        descriptors.push(Box::new(DeviceObject::new(config.device.clone(), object_ids)));
        descriptors.extend(objects);

        let registration = config.bbmd.map(|bbmd| {
            ForeignDeviceRegistration::new(
                bbmd,
                config.bbmd_ttl_seconds,
                config.apdu_timeout,
                config.apdu_retries,
            )
        });
        let (outbox, receiver) = mpsc::unbounded_channel();

        let state = Self {
            device: config.device,
            broadcast: config.broadcast,
            objects: ObjectTable::new(descriptors),
            unconfirmed: HashMap::new(),
            confirmed: HashMap::new(),
            address_cache: AddressCache::new(config.address_ttl, AddressCache::DEFAULT_CAPACITY),
            registration,
            outbox,
        };
        (state, receiver)
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn objects_mut(&mut self) -> &mut ObjectTable {
        &mut self.objects
    }

    pub fn address_cache(&self) -> &AddressCache {
        &self.address_cache
    }

    pub fn registration(&self) -> Option<&ForeignDeviceRegistration> {
        self.registration.as_ref()
    }

    pub fn set_unconfirmed_handler(
        &mut self,
        service: UnconfirmedService,
        handler: UnconfirmedHandler,
    ) {
        self.unconfirmed.insert(service as u8, handler);
    }

    pub fn set_confirmed_handler(&mut self, service: ConfirmedService, handler: ConfirmedHandler) {
        self.confirmed.insert(service as u8, handler);
    }

    /// 未配置 BBMD 时返回 false
    pub fn register_with_bbmd(&mut self) -> bool {
        let Some(registration) = self.registration.as_mut() else {
            return false;
        };
        let request = registration.request();
        debug!(target: "gw.bacnet", bbmd = %request.to, "foreign_device_register_sent");
        self.queue(request);
        true
    }

    pub fn i_am(&self) -> IAm {
        IAm {
            device: self.device.object_id(),
            max_apdu: MAX_APDU_LENGTH,
            segmentation: SEGMENTATION_NONE,
            vendor_id: u32::from(self.device.vendor_id),
        }
    }

    pub fn send_i_am(&mut self) {
        let apdu = self.i_am().encode();
        self.send_broadcast(&apdu);
    }

    /// 注册为外部设备时经 BBMD 分发，否则发往本地广播地址
    pub fn send_broadcast(&mut self, apdu: &[u8]) {
        let mut npdu = Vec::with_capacity(apdu.len() + 2);
        Npdu::encode(&mut npdu, None, false);
        npdu.extend_from_slice(apdu);

        let outgoing = match &self.registration {
            Some(registration) if registration.is_registered() => Outgoing {
                to: registration.bbmd(),
                datagram: bvlc::distribute_broadcast(&npdu),
            },
            _ => Outgoing {
                to: self.broadcast,
                datagram: bvlc::original_broadcast(&npdu),
            },
        };
        self.queue(outgoing);
    }

    pub fn send_reply(&mut self, peer: &PeerAddress, apdu: &[u8]) {
        let mut npdu = Vec::with_capacity(apdu.len() + 8);
        Npdu::encode(&mut npdu, peer.network.as_ref(), false);
        npdu.extend_from_slice(apdu);
        self.queue(Outgoing {
            to: peer.mac,
            datagram: bvlc::original_unicast(&npdu),
        });
    }

    fn queue(&self, outgoing: Outgoing) {
        if self.outbox.send(outgoing).is_err() {
            debug!(target: "gw.bacnet", "outbox_closed");
        }
    }

    /// 处理一个收到的数据报：BVLC → NPDU → APDU → 已注册的服务处理器
    pub fn npdu_handler(&mut self, src: SocketAddr, datagram: &[u8]) -> Result<(), DecodeError> {
        match bvlc::decode(datagram)? {
            BvlcMessage::Result(code) => {
                let handled = self
                    .registration
                    .as_mut()
                    .is_some_and(|registration| registration.on_result(src, code));
                if !handled {
                    debug!(target: "gw.bacnet", %src, result = code, "bvlc_result_unsolicited");
                }
                Ok(())
            }
            BvlcMessage::Forwarded { origin, npdu } => self.handle_npdu(origin, npdu),
            BvlcMessage::OriginalUnicast(npdu) | BvlcMessage::OriginalBroadcast(npdu) => {
                self.handle_npdu(src, npdu)
            }
            BvlcMessage::RegisterForeignDevice(_) => {
                self.queue(Outgoing {
                    to: src,
                    datagram: bvlc::result(result_code::REGISTER_FOREIGN_DEVICE_NAK),
                });
                Ok(())
            }
            BvlcMessage::DistributeBroadcast(_) => {
                self.queue(Outgoing {
                    to: src,
                    datagram: bvlc::result(result_code::DISTRIBUTE_BROADCAST_TO_NETWORK_NAK),
                });
                Ok(())
            }
            BvlcMessage::Other(function) => {
                debug!(target: "gw.bacnet", %src, function, "bvlc_function_ignored");
                Ok(())
            }
        }
    }

    fn handle_npdu(&mut self, mac: SocketAddr, data: &[u8]) -> Result<(), DecodeError> {
        let (npdu, apdu) = Npdu::decode(data)?;
        if npdu.network_message.is_some() || !npdu.is_for_local_device() {
            return Ok(());
        }
        let peer = PeerAddress {
            mac,
            network: npdu.source,
        };
        self.handle_apdu(&peer, apdu)
    }

    fn handle_apdu(&mut self, peer: &PeerAddress, apdu: &[u8]) -> Result<(), DecodeError> {
        match apdu::pdu_type_of(apdu) {
            Some(pdu_type::CONFIRMED_REQUEST) => {
                let request = ConfirmedRequest::decode(apdu)?;
                let reply = if request.segmented {
                    debug!(target: "gw.bacnet", mac = %peer.mac, "segmented_request_aborted");
                    apdu::encode_abort(request.invoke_id, AbortReason::SegmentationNotSupported)
                } else if let Some(handler) = self.confirmed.get(&request.service).copied() {
                    handler(self, peer, &request)
                } else {
                    debug!(
                        target: "gw.bacnet",
                        mac = %peer.mac,
                        service = request.service,
                        "confirmed_service_rejected"
                    );
                    apdu::encode_reject(request.invoke_id, RejectReason::UnrecognizedService)
                };
                self.send_reply(peer, &reply);
                Ok(())
            }
            Some(pdu_type::UNCONFIRMED_REQUEST) => {
                let (service, data) = match apdu {
                    [_, service, data @ ..] => (*service, data),
                    _ => return Err(DecodeError::Truncated),
                };
                if service == UnconfirmedService::IAm as u8 {
                    self.bind_i_am(peer, data)?;
                }
                match self.unconfirmed.get(&service).copied() {
                    Some(handler) => handler(self, peer, data),
                    None => Ok(()),
                }
            }
            Some(other) => {
                debug!(target: "gw.bacnet", mac = %peer.mac, pdu_type = other, "apdu_ignored");
                Ok(())
            }
            None => Err(DecodeError::Truncated),
        }
    }

    /// I-Am 学习对端地址
    fn bind_i_am(&mut self, peer: &PeerAddress, data: &[u8]) -> Result<(), DecodeError> {
        let i_am = IAm::decode(data)?;
        if i_am.device.object_type != ObjectType::Device
            || i_am.device.instance == self.device.instance
        {
            return Ok(());
        }
        debug!(
            target: "gw.bacnet",
            device = i_am.device.instance,
            mac = %peer.mac,
            "address_bound"
        );
        self.address_cache
            .bind(i_am.device.instance, peer.clone(), i_am.max_apdu);
        Ok(())
    }

    /// 细定时器：外部设备注册的重传与租约倒计时
    pub fn fine_tick(&mut self, elapsed: Duration) {
        let retransmit = self
            .registration
            .as_mut()
            .and_then(|registration| registration.tick(elapsed));
        if let Some(outgoing) = retransmit {
            self.queue(outgoing);
        }
    }

    /// 粗定时器：淘汰过期地址，向 BBMD 续约
    pub fn coarse_tick(&mut self, elapsed: Duration) {
        let expired = self.address_cache.expire(elapsed);
        if expired > 0 {
            info!(
                target: "gw.bacnet",
                expired,
                remaining = self.address_cache.len(),
                "address_cache_expired"
            );
        }
        self.register_with_bbmd();
    }
}
