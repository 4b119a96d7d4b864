//! 网络层协议数据单元（NPDU）

use crate::error::DecodeError;

pub const NPDU_VERSION: u8 = 0x01;
/// 全局广播网络号
pub const GLOBAL_BROADCAST: u16 = 0xFFFF;

const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
const CONTROL_DESTINATION: u8 = 0x20;
const CONTROL_SOURCE: u8 = 0x08;
const CONTROL_EXPECTING_REPLY: u8 = 0x04;

/// 远端网络地址（经路由器到达时携带）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetAddress {
    pub net: u16,
    pub adr: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npdu {
    pub destination: Option<NetAddress>,
    pub source: Option<NetAddress>,
    pub hop_count: Option<u8>,
    pub expecting_reply: bool,
    pub priority: u8,
    /// 网络层报文类型；存在时报文不含 APDU
    pub network_message: Option<u8>,
}

impl Npdu {
    /// 解析 NPDU 头，返回头部和其后的 APDU
    pub fn decode(data: &[u8]) -> Result<(Npdu, &[u8]), DecodeError> {
        let (version, control) = match data {
            [version, control, ..] => (*version, *control),
            _ => return Err(DecodeError::Truncated),
        };
        if version != NPDU_VERSION {
            return Err(DecodeError::NpduVersion(version));
        }
        let mut pos = 2;

        let destination = if control & CONTROL_DESTINATION != 0 {
            Some(read_address(data, &mut pos)?)
        } else {
            None
        };
        let source = if control & CONTROL_SOURCE != 0 {
            Some(read_address(data, &mut pos)?)
        } else {
            None
        };
        let hop_count = if destination.is_some() {
            Some(read_byte(data, &mut pos)?)
        } else {
            None
        };
        let network_message = if control & CONTROL_NETWORK_MESSAGE != 0 {
            Some(read_byte(data, &mut pos)?)
        } else {
            None
        };

        let npdu = Npdu {
            destination,
            source,
            hop_count,
            expecting_reply: control & CONTROL_EXPECTING_REPLY != 0,
            priority: control & 0x03,
            network_message,
        };
        Ok((npdu, &data[pos..]))
    }

    /// 写入应用层 NPDU 头；`destination` 为远端网络时附带 DNET 与跳数
    pub fn encode(buf: &mut Vec<u8>, destination: Option<&NetAddress>, expecting_reply: bool) {
        let mut control = 0u8;
        if destination.is_some() {
            control |= CONTROL_DESTINATION;
        }
        if expecting_reply {
            control |= CONTROL_EXPECTING_REPLY;
        }
        buf.push(NPDU_VERSION);
        buf.push(control);
        if let Some(dest) = destination {
            buf.extend_from_slice(&dest.net.to_be_bytes());
            buf.push(dest.adr.len() as u8);
            buf.extend_from_slice(&dest.adr);
            buf.push(0xFF);
        }
    }

    /// 目的地为本地网络或全局广播
    pub fn is_for_local_device(&self) -> bool {
        self.destination
            .as_ref()
            .is_none_or(|dest| dest.net == GLOBAL_BROADCAST)
    }
}

fn read_byte(data: &[u8], pos: &mut usize) -> Result<u8, DecodeError> {
    let byte = *data.get(*pos).ok_or(DecodeError::Truncated)?;
    *pos += 1;
    Ok(byte)
}

fn read_address(data: &[u8], pos: &mut usize) -> Result<NetAddress, DecodeError> {
    let hi = read_byte(data, pos)?;
    let lo = read_byte(data, pos)?;
    let len = usize::from(read_byte(data, pos)?);
    let adr = data
        .get(*pos..*pos + len)
        .ok_or(DecodeError::Truncated)?
        .to_vec();
    *pos += len;
    Ok(NetAddress {
        net: u16::from_be_bytes([hi, lo]),
        adr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_npdu_has_two_byte_header() {
        let mut buf = Vec::new();
        Npdu::encode(&mut buf, None, false);
        assert_eq!(buf, vec![0x01, 0x00]);

        let (npdu, apdu) = Npdu::decode(&[0x01, 0x04, 0x10, 0x08]).unwrap();
        assert!(npdu.expecting_reply);
        assert!(npdu.is_for_local_device());
        assert_eq!(apdu, &[0x10, 0x08]);
    }

    #[test]
    fn routed_source_is_kept_for_replies() {
        // SNET 5, SADR [0x0A]
        let (npdu, apdu) = Npdu::decode(&[0x01, 0x08, 0x00, 0x05, 0x01, 0x0A, 0x10, 0x08]).unwrap();
        assert_eq!(
            npdu.source,
            Some(NetAddress {
                net: 5,
                adr: vec![0x0A]
            })
        );
        assert_eq!(apdu, &[0x10, 0x08]);

        let mut buf = Vec::new();
        Npdu::encode(&mut buf, npdu.source.as_ref(), false);
        assert_eq!(buf, vec![0x01, 0x20, 0x00, 0x05, 0x01, 0x0A, 0xFF]);
    }

    #[test]
    fn remote_destination_is_not_local() {
        let (npdu, _) = Npdu::decode(&[0x01, 0x20, 0x00, 0x07, 0x00, 0xFF, 0x10, 0x08]).unwrap();
        assert!(!npdu.is_for_local_device());

        let (npdu, _) = Npdu::decode(&[0x01, 0x20, 0xFF, 0xFF, 0x00, 0xFF, 0x10, 0x08]).unwrap();
        assert!(npdu.is_for_local_device());
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(Npdu::decode(&[0x02, 0x00]), Err(DecodeError::NpduVersion(2)));
    }
}
