//! 对象模型：对象标识、属性值、属性错误与对象描述符
//!
//! 每种对象类型由一个 [`ObjectDescriptor`] 描述，[`ObjectTable`] 按对象类型
//! 把读写请求路由到对应描述符。

use crate::codec;

/// 对象实例号上限（保留值 4194303 表示“本设备”通配）
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    AnalogInput,
    Device,
    Other(u16),
}

impl ObjectType {
    pub fn code(self) -> u16 {
        match self {
            ObjectType::AnalogInput => 0,
            ObjectType::Device => 8,
            ObjectType::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ObjectType::AnalogInput,
            8 => ObjectType::Device,
            other => ObjectType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectId {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    /// 高 10 位为对象类型，低 22 位为实例号
    pub fn to_raw(self) -> u32 {
        (u32::from(self.object_type.code() & 0x3FF) << 22) | (self.instance & MAX_INSTANCE)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self {
            object_type: ObjectType::from_code((raw >> 22) as u16),
            instance: raw & MAX_INSTANCE,
        }
    }
}

/// 属性标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const APPLICATION_SOFTWARE_VERSION: Self = Self(12);
    pub const EVENT_STATE: Self = Self(36);
    pub const FIRMWARE_REVISION: Self = Self(44);
    pub const MAX_APDU_LENGTH_ACCEPTED: Self = Self(62);
    pub const MODEL_NAME: Self = Self(70);
    pub const OBJECT_IDENTIFIER: Self = Self(75);
    pub const OBJECT_LIST: Self = Self(76);
    pub const OBJECT_NAME: Self = Self(77);
    pub const OBJECT_TYPE: Self = Self(79);
    pub const OUT_OF_SERVICE: Self = Self(81);
    pub const PRESENT_VALUE: Self = Self(85);
    pub const PROTOCOL_VERSION: Self = Self(98);
    pub const SEGMENTATION_SUPPORTED: Self = Self(107);
    pub const STATUS_FLAGS: Self = Self(111);
    pub const SYSTEM_STATUS: Self = Self(112);
    pub const UNITS: Self = Self(117);
    pub const VENDOR_IDENTIFIER: Self = Self(120);
    pub const VENDOR_NAME: Self = Self(121);
    pub const PROTOCOL_REVISION: Self = Self(139);
}

/// 属性值（应用标签编码）
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Real(f32),
    CharacterString(String),
    BitString(Vec<bool>),
    Enumerated(u32),
    ObjectId(ObjectId),
    /// 依次编码的多个值（数组属性整体读取）
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            PropertyValue::Null => codec::encode_application_null(buf),
            PropertyValue::Boolean(v) => codec::encode_application_boolean(buf, *v),
            PropertyValue::Unsigned(v) => codec::encode_application_unsigned(buf, *v),
            PropertyValue::Real(v) => codec::encode_application_real(buf, *v),
            PropertyValue::CharacterString(v) => {
                codec::encode_application_character_string(buf, v)
            }
            PropertyValue::BitString(v) => codec::encode_application_bit_string(buf, v),
            PropertyValue::Enumerated(v) => codec::encode_application_enumerated(buf, *v),
            PropertyValue::ObjectId(v) => codec::encode_application_object_id(buf, *v),
            PropertyValue::List(values) => {
                for value in values {
                    value.encode(buf);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Object = 1,
    Property = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidDataType = 9,
    UnknownObject = 31,
    UnknownProperty = 32,
    ValueOutOfRange = 37,
    WriteAccessDenied = 40,
    InvalidArrayIndex = 42,
    PropertyIsNotAnArray = 50,
}

/// 属性读写失败，映射为 BACnet Error PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{class:?}: {code:?}")]
pub struct PropertyError {
    pub class: ErrorClass,
    pub code: ErrorCode,
}

impl PropertyError {
    pub fn unknown_object() -> Self {
        Self {
            class: ErrorClass::Object,
            code: ErrorCode::UnknownObject,
        }
    }

    pub fn unknown_property() -> Self {
        Self::property(ErrorCode::UnknownProperty)
    }

    pub fn not_an_array() -> Self {
        Self::property(ErrorCode::PropertyIsNotAnArray)
    }

    pub fn invalid_array_index() -> Self {
        Self::property(ErrorCode::InvalidArrayIndex)
    }

    pub fn write_access_denied() -> Self {
        Self::property(ErrorCode::WriteAccessDenied)
    }

    pub fn invalid_data_type() -> Self {
        Self::property(ErrorCode::InvalidDataType)
    }

    pub fn value_out_of_range() -> Self {
        Self::property(ErrorCode::ValueOutOfRange)
    }

    fn property(code: ErrorCode) -> Self {
        Self {
            class: ErrorClass::Property,
            code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object: ObjectId,
    pub property: PropertyId,
    pub array_index: Option<u32>,
}

impl ReadPropertyRequest {
    pub fn new(object: ObjectId, property: PropertyId) -> Self {
        Self {
            object,
            property,
            array_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WritePropertyRequest {
    pub object: ObjectId,
    pub property: PropertyId,
    pub array_index: Option<u32>,
    pub value: PropertyValue,
    pub priority: Option<u8>,
}

/// 对象类型描述符：实例枚举与属性读写入口
///
/// 实现者持有该类型全部实例的状态；所有方法都在协议栈锁内被调用。
pub trait ObjectDescriptor: Send {
    fn object_type(&self) -> ObjectType;

    fn count(&self) -> usize;

    fn index_to_instance(&self, index: usize) -> Option<u32>;

    fn instance_to_index(&self, instance: u32) -> Option<usize>;

    fn valid_instance(&self, instance: u32) -> bool {
        self.instance_to_index(instance).is_some()
    }

    fn object_name(&self, instance: u32) -> Option<String>;

    fn read_property(
        &mut self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError>;

    fn write_property(&mut self, request: &WritePropertyRequest) -> Result<(), PropertyError>;

    /// 本描述符下全部对象标识（按索引顺序）
    fn object_ids(&self) -> Vec<ObjectId> {
        (0..self.count())
            .filter_map(|index| self.index_to_instance(index))
            .map(|instance| ObjectId::new(self.object_type(), instance))
            .collect()
    }
}

/// 对象表：设备对象描述符在前，其余按注册顺序
pub struct ObjectTable {
    descriptors: Vec<Box<dyn ObjectDescriptor>>,
}

impl ObjectTable {
    pub fn new(descriptors: Vec<Box<dyn ObjectDescriptor>>) -> Self {
        Self { descriptors }
    }

    pub fn read_property(
        &mut self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError> {
        let descriptor = self
            .descriptors
            .iter_mut()
            .find(|descriptor| {
                descriptor.object_type() == request.object.object_type
                    && descriptor.valid_instance(request.object.instance)
            })
            .ok_or_else(PropertyError::unknown_object)?;
        descriptor.read_property(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_object_id_round_trips() {
        let id = ObjectId::new(ObjectType::Device, 48);
        assert_eq!(id.to_raw(), 0x0200_0030);
        assert_eq!(ObjectId::from_raw(0x0200_0030), id);
    }

    #[test]
    fn unknown_type_codes_are_preserved() {
        assert_eq!(ObjectType::from_code(19), ObjectType::Other(19));
        assert_eq!(ObjectType::Other(19).code(), 19);
    }
}
