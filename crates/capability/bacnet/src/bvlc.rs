//! BACnet/IP 虚拟链路控制（BVLC，Annex J）
//!
//! 报文头：`0x81 | function | length(u16)`，长度包含报文头。

use crate::error::DecodeError;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

pub const BVLL_TYPE_BIP: u8 = 0x81;
const HEADER_LEN: usize = 4;

pub mod function {
    pub const RESULT: u8 = 0x00;
    pub const FORWARDED_NPDU: u8 = 0x04;
    pub const REGISTER_FOREIGN_DEVICE: u8 = 0x05;
    pub const DISTRIBUTE_BROADCAST_TO_NETWORK: u8 = 0x09;
    pub const ORIGINAL_UNICAST_NPDU: u8 = 0x0A;
    pub const ORIGINAL_BROADCAST_NPDU: u8 = 0x0B;
}

pub mod result_code {
    pub const SUCCESSFUL_COMPLETION: u16 = 0x0000;
    pub const REGISTER_FOREIGN_DEVICE_NAK: u16 = 0x0030;
    pub const DISTRIBUTE_BROADCAST_TO_NETWORK_NAK: u16 = 0x0060;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BvlcMessage<'a> {
    Result(u16),
    /// BBMD 转发的报文，应答发往原始来源
    Forwarded {
        origin: SocketAddr,
        npdu: &'a [u8],
    },
    OriginalUnicast(&'a [u8]),
    OriginalBroadcast(&'a [u8]),
    DistributeBroadcast(&'a [u8]),
    RegisterForeignDevice(u16),
    /// 本设备不处理的 BBMD 管理报文
    Other(u8),
}

pub fn decode(datagram: &[u8]) -> Result<BvlcMessage<'_>, DecodeError> {
    if datagram.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    if datagram[0] != BVLL_TYPE_BIP {
        return Err(DecodeError::NotBip(datagram[0]));
    }
    let declared = usize::from(u16::from_be_bytes([datagram[2], datagram[3]]));
    if declared != datagram.len() {
        return Err(DecodeError::LengthMismatch {
            header: declared,
            actual: datagram.len(),
        });
    }
    let body = &datagram[HEADER_LEN..];

    let message = match datagram[1] {
        function::RESULT => BvlcMessage::Result(read_u16(body)?),
        function::FORWARDED_NPDU => {
            if body.len() < 6 {
                return Err(DecodeError::Truncated);
            }
            let ip = Ipv4Addr::new(body[0], body[1], body[2], body[3]);
            let port = u16::from_be_bytes([body[4], body[5]]);
            BvlcMessage::Forwarded {
                origin: SocketAddr::V4(SocketAddrV4::new(ip, port)),
                npdu: &body[6..],
            }
        }
        function::ORIGINAL_UNICAST_NPDU => BvlcMessage::OriginalUnicast(body),
        function::ORIGINAL_BROADCAST_NPDU => BvlcMessage::OriginalBroadcast(body),
        function::DISTRIBUTE_BROADCAST_TO_NETWORK => BvlcMessage::DistributeBroadcast(body),
        function::REGISTER_FOREIGN_DEVICE => BvlcMessage::RegisterForeignDevice(read_u16(body)?),
        other => BvlcMessage::Other(other),
    };
    Ok(message)
}

fn read_u16(body: &[u8]) -> Result<u16, DecodeError> {
    match body {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(DecodeError::Truncated),
    }
}

fn frame(function: u8, body: &[u8]) -> Vec<u8> {
    let len = (HEADER_LEN + body.len()) as u16;
    let mut buf = Vec::with_capacity(usize::from(len));
    buf.push(BVLL_TYPE_BIP);
    buf.push(function);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

pub fn original_unicast(npdu: &[u8]) -> Vec<u8> {
    frame(function::ORIGINAL_UNICAST_NPDU, npdu)
}

pub fn original_broadcast(npdu: &[u8]) -> Vec<u8> {
    frame(function::ORIGINAL_BROADCAST_NPDU, npdu)
}

pub fn distribute_broadcast(npdu: &[u8]) -> Vec<u8> {
    frame(function::DISTRIBUTE_BROADCAST_TO_NETWORK, npdu)
}

pub fn register_foreign_device(ttl_seconds: u16) -> Vec<u8> {
    frame(function::REGISTER_FOREIGN_DEVICE, &ttl_seconds.to_be_bytes())
}

pub fn result(code: u16) -> Vec<u8> {
    frame(function::RESULT, &code.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_frame_layout() {
        assert_eq!(register_foreign_device(90), vec![0x81, 0x05, 0x00, 0x06, 0x00, 0x5A]);
        assert_eq!(
            decode(&register_foreign_device(90)),
            Ok(BvlcMessage::RegisterForeignDevice(90))
        );
    }

    #[test]
    fn forwarded_npdu_carries_origin() {
        let datagram = [
            0x81, 0x04, 0x00, 0x0C, 192, 168, 1, 20, 0xBA, 0xC0, 0x01, 0x00,
        ];
        assert_eq!(
            decode(&datagram),
            Ok(BvlcMessage::Forwarded {
                origin: "192.168.1.20:47808".parse().unwrap(),
                npdu: &[0x01, 0x00],
            })
        );
    }

    #[test]
    fn rejects_foreign_frames() {
        assert_eq!(decode(&[0x82, 0x0A, 0x00, 0x04]), Err(DecodeError::NotBip(0x82)));
        assert!(matches!(
            decode(&[0x81, 0x0A, 0x00, 0x09, 0x01]),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }
}
