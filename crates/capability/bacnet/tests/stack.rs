use gw_bacnet::apdu::{IAm, ReadPropertyAck, WhoIs, pdu_type};
use gw_bacnet::bvlc::{self, BvlcMessage, function, result_code};
use gw_bacnet::npdu::Npdu;
use gw_bacnet::{
    AnalogInputs, DecodeError, DeviceInfo, ObjectId, ObjectType, OutboxReceiver, Outgoing,
    PropertyId, PropertyValue, ReadPropertyRequest, StackConfig, StackState,
    register_default_handlers,
};
use std::net::SocketAddr;
use std::time::Duration;

const DEVICE: u32 = 48;

fn client() -> SocketAddr {
    "192.168.1.50:47808".parse().unwrap()
}

fn bbmd() -> SocketAddr {
    "10.0.0.1:47808".parse().unwrap()
}

fn config() -> StackConfig {
    StackConfig::new(
        DeviceInfo::new(DEVICE, "gw-bridge", 260),
        "192.168.1.255:47808".parse().unwrap(),
    )
}

fn stack(config: StackConfig) -> (StackState, OutboxReceiver) {
    let mut inputs = AnalogInputs::new(4);
    inputs.set_present_value(1, 20.0);
    let (mut state, outbox) = StackState::new(config, vec![Box::new(inputs)]);
    register_default_handlers(&mut state);
    (state, outbox)
}

/// 本地网络上期待应答的单播报文
fn unicast(apdu: &[u8]) -> Vec<u8> {
    let mut npdu = vec![0x01, 0x04];
    npdu.extend_from_slice(apdu);
    bvlc::original_unicast(&npdu)
}

fn broadcast(apdu: &[u8]) -> Vec<u8> {
    let mut npdu = vec![0x01, 0x00];
    npdu.extend_from_slice(apdu);
    bvlc::original_broadcast(&npdu)
}

fn drain(outbox: &mut OutboxReceiver) -> Vec<Outgoing> {
    std::iter::from_fn(|| outbox.try_recv().ok()).collect()
}

/// 取出单条应答的 APDU
fn reply_apdu(outgoing: &Outgoing) -> Vec<u8> {
    let npdu = match bvlc::decode(&outgoing.datagram).unwrap() {
        BvlcMessage::OriginalUnicast(npdu)
        | BvlcMessage::OriginalBroadcast(npdu)
        | BvlcMessage::DistributeBroadcast(npdu) => npdu.to_vec(),
        other => panic!("unexpected bvlc message {other:?}"),
    };
    let (_, apdu) = Npdu::decode(&npdu).unwrap();
    apdu.to_vec()
}

fn read_request(object: ObjectId, property: PropertyId) -> Vec<u8> {
    ReadPropertyRequest::new(object, property).encode(1)
}

#[test]
fn who_is_is_answered_with_broadcast_i_am() {
    let (mut state, mut outbox) = stack(config());

    state
        .npdu_handler(client(), &broadcast(&WhoIs::default().encode()))
        .unwrap();

    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "192.168.1.255:47808".parse::<SocketAddr>().unwrap());
    assert_eq!(sent[0].datagram[1], function::ORIGINAL_BROADCAST_NPDU);

    let apdu = reply_apdu(&sent[0]);
    let i_am = IAm::decode(&apdu[2..]).unwrap();
    assert_eq!(i_am.device, ObjectId::new(ObjectType::Device, DEVICE));
    assert_eq!(i_am.vendor_id, 260);
}

#[test]
fn who_is_outside_range_is_ignored() {
    let (mut state, mut outbox) = stack(config());
    let who_is = WhoIs {
        range: Some((100, 200)),
    };

    state.npdu_handler(client(), &broadcast(&who_is.encode())).unwrap();

    assert!(drain(&mut outbox).is_empty());
}

#[test]
fn read_property_returns_present_value() {
    let (mut state, mut outbox) = stack(config());
    let object = ObjectId::new(ObjectType::AnalogInput, 1);

    state
        .npdu_handler(client(), &unicast(&read_request(object, PropertyId::PRESENT_VALUE)))
        .unwrap();

    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, client());
    let (invoke_id, ack) = ReadPropertyAck::decode(&reply_apdu(&sent[0])).unwrap();
    assert_eq!(invoke_id, 1);
    assert_eq!(ack.object, object);
    assert_eq!(ack.value, PropertyValue::Real(20.0));
}

#[test]
fn device_wildcard_instance_reads_local_device() {
    let (mut state, mut outbox) = stack(config());
    let request = ReadPropertyRequest {
        object: ObjectId::new(ObjectType::Device, 0x3F_FFFF),
        property: PropertyId::OBJECT_LIST,
        array_index: Some(0),
    };

    state.npdu_handler(client(), &unicast(&request.encode(2))).unwrap();

    let (_, ack) = ReadPropertyAck::decode(&reply_apdu(&drain(&mut outbox)[0])).unwrap();
    assert_eq!(ack.object, ObjectId::new(ObjectType::Device, DEVICE));
    // 设备 + 4 个模拟输入
    assert_eq!(ack.value, PropertyValue::Unsigned(5));
}

#[test]
fn unknown_object_yields_error_pdu() {
    let (mut state, mut outbox) = stack(config());
    let object = ObjectId::new(ObjectType::AnalogInput, 9);

    state
        .npdu_handler(client(), &unicast(&read_request(object, PropertyId::PRESENT_VALUE)))
        .unwrap();

    let apdu = reply_apdu(&drain(&mut outbox)[0]);
    assert_eq!(apdu[0] >> 4, pdu_type::ERROR);
    // error-class object (1), error-code unknown-object (31)
    assert_eq!(&apdu[3..], &[0x91, 0x01, 0x91, 0x1F]);
}

#[test]
fn unregistered_confirmed_service_is_rejected() {
    let (mut state, mut outbox) = stack(config());
    // WriteProperty 没有注册处理器
    let request = [0x00, 0x05, 0x11, 0x0F, 0x0C, 0x00, 0x00, 0x00, 0x01];

    state.npdu_handler(client(), &unicast(&request)).unwrap();

    let apdu = reply_apdu(&drain(&mut outbox)[0]);
    assert_eq!(apdu, vec![pdu_type::REJECT << 4, 0x11, 9]);
}

#[test]
fn segmented_request_is_aborted() {
    let (mut state, mut outbox) = stack(config());
    let request = [0x08, 0x05, 0x21, 0x00, 0x04, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x01];

    state.npdu_handler(client(), &unicast(&request)).unwrap();

    let apdu = reply_apdu(&drain(&mut outbox)[0]);
    assert_eq!(apdu, vec![(pdu_type::ABORT << 4) | 0x01, 0x21, 4]);
}

#[test]
fn malformed_datagram_is_an_error_without_reply() {
    let (mut state, mut outbox) = stack(config());

    assert_eq!(
        state.npdu_handler(client(), &[0x81, 0x0A, 0x00]),
        Err(DecodeError::Truncated)
    );
    assert!(state.npdu_handler(client(), &[0x01, 0x02, 0x03, 0x04]).is_err());
    assert!(drain(&mut outbox).is_empty());
}

#[test]
fn forwarded_request_is_answered_at_origin() {
    let (mut state, mut outbox) = stack(config());
    let origin: SocketAddr = "172.16.0.9:47808".parse().unwrap();

    let mut body = vec![172, 16, 0, 9, 0xBA, 0xC0, 0x01, 0x04];
    body.extend(read_request(
        ObjectId::new(ObjectType::AnalogInput, 0),
        PropertyId::OBJECT_NAME,
    ));
    let mut datagram = vec![0x81, function::FORWARDED_NPDU];
    datagram.extend(((body.len() + 4) as u16).to_be_bytes());
    datagram.extend(body);

    state.npdu_handler(bbmd(), &datagram).unwrap();

    let sent = drain(&mut outbox);
    assert_eq!(sent[0].to, origin);
    let (_, ack) = ReadPropertyAck::decode(&reply_apdu(&sent[0])).unwrap();
    assert_eq!(ack.value, PropertyValue::CharacterString("ANALOG INPUT 0".into()));
}

#[test]
fn routed_request_reply_carries_destination_network() {
    let (mut state, mut outbox) = stack(config());
    // SNET 7, SADR [0x21]
    let mut npdu = vec![0x01, 0x0C, 0x00, 0x07, 0x01, 0x21];
    npdu.extend(read_request(
        ObjectId::new(ObjectType::AnalogInput, 1),
        PropertyId::UNITS,
    ));

    state
        .npdu_handler(client(), &bvlc::original_unicast(&npdu))
        .unwrap();

    let sent = drain(&mut outbox);
    let BvlcMessage::OriginalUnicast(reply) = bvlc::decode(&sent[0].datagram).unwrap() else {
        panic!("expected unicast reply");
    };
    let (header, _) = Npdu::decode(reply).unwrap();
    let destination = header.destination.unwrap();
    assert_eq!(destination.net, 7);
    assert_eq!(destination.adr, vec![0x21]);
}

#[test]
fn i_am_binds_address_until_expiry() {
    let mut config = config();
    config.address_ttl = Duration::from_secs(120);
    let (mut state, _outbox) = stack(config);
    let peer_i_am = IAm {
        device: ObjectId::new(ObjectType::Device, 1001),
        max_apdu: 480,
        segmentation: 3,
        vendor_id: 5,
    };

    state.npdu_handler(client(), &broadcast(&peer_i_am.encode())).unwrap();

    let binding = state.address_cache().lookup(1001).unwrap();
    assert_eq!(binding.address.mac, client());
    assert_eq!(binding.max_apdu, 480);

    state.coarse_tick(Duration::from_secs(60));
    assert!(state.address_cache().lookup(1001).is_some());
    state.coarse_tick(Duration::from_secs(60));
    assert!(state.address_cache().lookup(1001).is_none());
}

#[test]
fn own_i_am_is_not_cached() {
    let (mut state, _outbox) = stack(config());
    let own = state.i_am();

    state.npdu_handler(client(), &broadcast(&own.encode())).unwrap();

    assert!(state.address_cache().is_empty());
}

fn foreign_config() -> StackConfig {
    let mut config = config();
    config.bbmd = Some(bbmd());
    config.bbmd_ttl_seconds = 90;
    config.apdu_timeout = Duration::from_secs(3);
    config.apdu_retries = 2;
    config
}

fn is_register(outgoing: &Outgoing) -> bool {
    outgoing.to == bbmd() && outgoing.datagram == bvlc::register_foreign_device(90)
}

#[test]
fn registration_is_retransmitted_until_retries_are_exhausted() {
    let (mut state, mut outbox) = stack(foreign_config());

    assert!(state.register_with_bbmd());
    assert!(drain(&mut outbox).iter().all(is_register));

    let mut retransmits = 0;
    for _ in 0..12 {
        state.fine_tick(Duration::from_secs(1));
        retransmits += drain(&mut outbox).iter().filter(|o| is_register(o)).count();
    }

    // 首次发送 + 2 次重传
    assert_eq!(retransmits, 2);
    assert!(state.registration().unwrap().pending().is_none());
    assert!(!state.registration().unwrap().is_registered());
}

#[test]
fn acknowledged_registration_routes_broadcasts_through_bbmd() {
    let (mut state, mut outbox) = stack(foreign_config());
    state.register_with_bbmd();
    drain(&mut outbox);

    // 非 BBMD 来源的结果不算数
    state
        .npdu_handler(client(), &bvlc::result(result_code::SUCCESSFUL_COMPLETION))
        .unwrap();
    assert!(!state.registration().unwrap().is_registered());

    state
        .npdu_handler(bbmd(), &bvlc::result(result_code::SUCCESSFUL_COMPLETION))
        .unwrap();
    assert!(state.registration().unwrap().is_registered());

    state.send_i_am();
    let sent = drain(&mut outbox);
    assert_eq!(sent[0].to, bbmd());
    assert_eq!(sent[0].datagram[1], function::DISTRIBUTE_BROADCAST_TO_NETWORK);

    // 确认之后不再重传
    state.fine_tick(Duration::from_secs(5));
    assert!(drain(&mut outbox).is_empty());
}

#[test]
fn coarse_tick_renews_lease_before_expiry() {
    let (mut state, mut outbox) = stack(foreign_config());
    state.register_with_bbmd();
    state
        .npdu_handler(bbmd(), &bvlc::result(result_code::SUCCESSFUL_COMPLETION))
        .unwrap();
    drain(&mut outbox);

    state.fine_tick(Duration::from_secs(60));
    state.coarse_tick(Duration::from_secs(60));
    assert!(drain(&mut outbox).iter().any(is_register));
    // 续约期间租约仍然有效
    assert!(state.registration().unwrap().is_registered());

    state
        .npdu_handler(bbmd(), &bvlc::result(result_code::SUCCESSFUL_COMPLETION))
        .unwrap();
    assert_eq!(
        state.registration().unwrap().lease_remaining(),
        Duration::from_secs(90)
    );
}

#[test]
fn lapsed_lease_falls_back_to_local_broadcast() {
    let (mut state, mut outbox) = stack(foreign_config());
    state.register_with_bbmd();
    state
        .npdu_handler(bbmd(), &bvlc::result(result_code::SUCCESSFUL_COMPLETION))
        .unwrap();

    state.fine_tick(Duration::from_secs(90));
    assert!(!state.registration().unwrap().is_registered());

    drain(&mut outbox);
    state.send_i_am();
    let sent = drain(&mut outbox);
    assert_eq!(sent[0].datagram[1], function::ORIGINAL_BROADCAST_NPDU);
}

#[test]
fn nak_clears_registration() {
    let (mut state, mut outbox) = stack(foreign_config());
    state.register_with_bbmd();
    state
        .npdu_handler(bbmd(), &bvlc::result(result_code::REGISTER_FOREIGN_DEVICE_NAK))
        .unwrap();
    drain(&mut outbox);

    assert!(state.registration().unwrap().pending().is_none());
    state.fine_tick(Duration::from_secs(10));
    assert!(drain(&mut outbox).is_empty());
}

#[test]
fn without_bbmd_registration_is_a_no_op() {
    let (mut state, mut outbox) = stack(config());
    assert!(!state.register_with_bbmd());
    state.coarse_tick(Duration::from_secs(60));
    assert!(drain(&mut outbox).is_empty());
}

#[test]
fn foreign_registration_requests_are_refused() {
    let (mut state, mut outbox) = stack(config());

    state
        .npdu_handler(client(), &bvlc::register_foreign_device(60))
        .unwrap();

    let sent = drain(&mut outbox);
    assert_eq!(sent[0].to, client());
    assert_eq!(
        sent[0].datagram,
        bvlc::result(result_code::REGISTER_FOREIGN_DEVICE_NAK)
    );
}
