//! 应用层协议数据单元（APDU）与服务报文编解码

use crate::codec::{self, Reader};
use crate::error::DecodeError;
use crate::object::{ObjectId, PropertyError, PropertyId, PropertyValue, ReadPropertyRequest};

pub mod pdu_type {
    pub const CONFIRMED_REQUEST: u8 = 0;
    pub const UNCONFIRMED_REQUEST: u8 = 1;
    pub const SIMPLE_ACK: u8 = 2;
    pub const COMPLEX_ACK: u8 = 3;
    pub const ERROR: u8 = 5;
    pub const REJECT: u8 = 6;
    pub const ABORT: u8 = 7;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmedService {
    ReadProperty = 12,
    WriteProperty = 15,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnconfirmedService {
    IAm = 0,
    WhoIs = 8,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidTag = 4,
    MissingRequiredParameter = 5,
    UnrecognizedService = 9,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    SegmentationNotSupported = 4,
}

/// 最大 APDU 长度编码（0..=5）
const MAX_APDU_SIZES: [u16; 6] = [50, 128, 206, 480, 1024, 1476];
/// 本设备在请求中声明的最大 APDU 编码（1476 字节）
const MAX_APDU_CODE_1476: u8 = 0x05;

/// APDU 首字节高 4 位为 PDU 类型
pub fn pdu_type_of(apdu: &[u8]) -> Option<u8> {
    apdu.first().map(|first| first >> 4)
}

/// 确认请求头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedRequest<'a> {
    pub invoke_id: u8,
    pub service: u8,
    pub segmented: bool,
    pub max_apdu: u16,
    pub data: &'a [u8],
}

impl<'a> ConfirmedRequest<'a> {
    pub fn decode(apdu: &'a [u8]) -> Result<Self, DecodeError> {
        let first = *apdu.first().ok_or(DecodeError::Truncated)?;
        if first >> 4 != pdu_type::CONFIRMED_REQUEST {
            return Err(DecodeError::UnexpectedPdu(first >> 4));
        }
        let segmented = first & 0x08 != 0;
        let header_len = if segmented { 6 } else { 4 };
        if apdu.len() < header_len {
            return Err(DecodeError::Truncated);
        }

        Ok(Self {
            invoke_id: apdu[2],
            service: apdu[header_len - 1],
            segmented,
            max_apdu: MAX_APDU_SIZES
                .get(usize::from(apdu[1] & 0x0F))
                .copied()
                .unwrap_or(MAX_APDU_SIZES[0]),
            data: &apdu[header_len..],
        })
    }
}

pub fn encode_complex_ack(invoke_id: u8, service: ConfirmedService, body: &[u8]) -> Vec<u8> {
    let mut apdu = Vec::with_capacity(3 + body.len());
    apdu.push(pdu_type::COMPLEX_ACK << 4);
    apdu.push(invoke_id);
    apdu.push(service as u8);
    apdu.extend_from_slice(body);
    apdu
}

pub fn encode_error(invoke_id: u8, service: ConfirmedService, error: PropertyError) -> Vec<u8> {
    let mut apdu = vec![pdu_type::ERROR << 4, invoke_id, service as u8];
    codec::encode_application_enumerated(&mut apdu, error.class as u32);
    codec::encode_application_enumerated(&mut apdu, error.code as u32);
    apdu
}

pub fn encode_reject(invoke_id: u8, reason: RejectReason) -> Vec<u8> {
    vec![pdu_type::REJECT << 4, invoke_id, reason as u8]
}

/// 服务端发出的 Abort（SRV 位置 1）
pub fn encode_abort(invoke_id: u8, reason: AbortReason) -> Vec<u8> {
    vec![(pdu_type::ABORT << 4) | 0x01, invoke_id, reason as u8]
}

fn unconfirmed_header(service: UnconfirmedService) -> Vec<u8> {
    vec![pdu_type::UNCONFIRMED_REQUEST << 4, service as u8]
}

/// Who-Is 请求；`range` 为空表示询问所有设备
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WhoIs {
    pub range: Option<(u32, u32)>,
}

impl WhoIs {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Ok(Self { range: None });
        }
        let mut reader = Reader::new(data);
        let low = reader.read_context_unsigned(0)?;
        let high = reader.read_context_unsigned(1)?;
        Ok(Self {
            range: Some((low, high)),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut apdu = unconfirmed_header(UnconfirmedService::WhoIs);
        if let Some((low, high)) = self.range {
            codec::encode_context_unsigned(&mut apdu, 0, low);
            codec::encode_context_unsigned(&mut apdu, 1, high);
        }
        apdu
    }

    pub fn matches(&self, instance: u32) -> bool {
        self.range
            .is_none_or(|(low, high)| (low..=high).contains(&instance))
    }
}

/// I-Am 通告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IAm {
    pub device: ObjectId,
    pub max_apdu: u32,
    pub segmentation: u32,
    pub vendor_id: u32,
}

impl IAm {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);
        Ok(Self {
            device: reader.read_application_object_id()?,
            max_apdu: reader.read_application_unsigned()?,
            segmentation: reader.read_application_enumerated()?,
            vendor_id: reader.read_application_unsigned()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut apdu = unconfirmed_header(UnconfirmedService::IAm);
        codec::encode_application_object_id(&mut apdu, self.device);
        codec::encode_application_unsigned(&mut apdu, self.max_apdu);
        codec::encode_application_enumerated(&mut apdu, self.segmentation);
        codec::encode_application_unsigned(&mut apdu, self.vendor_id);
        apdu
    }
}

impl ReadPropertyRequest {
    /// 解析 ReadProperty 服务参数
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(data);
        let object = reader.read_context_object_id(0)?;
        let property = PropertyId(reader.read_context_unsigned(1)?);
        let array_index = reader.read_optional_context_unsigned(2)?;
        Ok(Self {
            object,
            property,
            array_index,
        })
    }

    /// 编码为完整的确认请求 APDU（客户端方向）
    pub fn encode(&self, invoke_id: u8) -> Vec<u8> {
        let mut apdu = vec![
            pdu_type::CONFIRMED_REQUEST << 4,
            MAX_APDU_CODE_1476,
            invoke_id,
            ConfirmedService::ReadProperty as u8,
        ];
        codec::encode_context_object_id(&mut apdu, 0, self.object);
        codec::encode_context_enumerated(&mut apdu, 1, self.property.0);
        if let Some(index) = self.array_index {
            codec::encode_context_unsigned(&mut apdu, 2, index);
        }
        apdu
    }
}

/// ReadProperty 的 ComplexACK
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyAck {
    pub object: ObjectId,
    pub property: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
}

impl ReadPropertyAck {
    pub fn encode(&self, invoke_id: u8) -> Vec<u8> {
        let mut body = Vec::new();
        codec::encode_context_object_id(&mut body, 0, self.object);
        codec::encode_context_enumerated(&mut body, 1, self.property.0);
        if let Some(index) = self.array_index {
            codec::encode_context_unsigned(&mut body, 2, index);
        }
        codec::encode_opening_tag(&mut body, 3);
        self.value.encode(&mut body);
        codec::encode_closing_tag(&mut body, 3);
        encode_complex_ack(invoke_id, ConfirmedService::ReadProperty, &body)
    }

    /// 解析完整 APDU，返回调用号与应答内容
    pub fn decode(apdu: &[u8]) -> Result<(u8, Self), DecodeError> {
        let [first, invoke_id, service, body @ ..] = apdu else {
            return Err(DecodeError::Truncated);
        };
        if *first >> 4 != pdu_type::COMPLEX_ACK {
            return Err(DecodeError::UnexpectedPdu(*first >> 4));
        }
        if *service != ConfirmedService::ReadProperty as u8 {
            return Err(DecodeError::UnexpectedTag("read-property service choice"));
        }

        let mut reader = Reader::new(body);
        let object = reader.read_context_object_id(0)?;
        let property = PropertyId(reader.read_context_unsigned(1)?);
        let array_index = reader.read_optional_context_unsigned(2)?;
        reader.expect_opening(3)?;
        let mut values = Vec::new();
        while !reader.at_closing(3)? {
            values.push(reader.read_application_value()?);
        }
        reader.expect_closing(3)?;

        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            PropertyValue::List(values)
        };
        Ok((
            *invoke_id,
            Self {
                object,
                property,
                array_index,
                value,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    #[test]
    fn read_property_request_wire_format() {
        let request = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogInput, 1),
            PropertyId::PRESENT_VALUE,
        );
        let apdu = request.encode(7);
        assert_eq!(
            apdu,
            vec![0x00, 0x05, 0x07, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x19, 0x55]
        );

        let header = ConfirmedRequest::decode(&apdu).unwrap();
        assert_eq!(header.invoke_id, 7);
        assert_eq!(header.service, ConfirmedService::ReadProperty as u8);
        assert_eq!(header.max_apdu, 1476);
        assert_eq!(ReadPropertyRequest::decode(header.data).unwrap(), request);
    }

    #[test]
    fn segmented_header_is_recognised() {
        let header = ConfirmedRequest::decode(&[0x08, 0x05, 0x09, 0x00, 0x04, 0x0C]).unwrap();
        assert!(header.segmented);
        assert_eq!(header.invoke_id, 9);
        assert_eq!(header.service, 0x0C);
    }

    #[test]
    fn who_is_range_filters_instances() {
        let who_is = WhoIs::decode(&WhoIs { range: Some((10, 50)) }.encode()[2..]).unwrap();
        assert!(who_is.matches(48));
        assert!(!who_is.matches(51));
        assert!(WhoIs::default().matches(4_000_000));
    }

    #[test]
    fn who_is_with_only_low_limit_is_malformed() {
        let mut data = Vec::new();
        codec::encode_context_unsigned(&mut data, 0, 10);
        assert!(WhoIs::decode(&data).is_err());
    }

    #[test]
    fn error_pdu_carries_class_and_code() {
        let apdu = encode_error(3, ConfirmedService::ReadProperty, PropertyError::unknown_object());
        assert_eq!(apdu, vec![0x50, 0x03, 0x0C, 0x91, 0x01, 0x91, 0x1F]);
    }
}
