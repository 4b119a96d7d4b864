//! 设备对象

use crate::object::{
    ObjectDescriptor, ObjectId, ObjectType, PropertyError, PropertyId, PropertyValue,
    ReadPropertyRequest, WritePropertyRequest,
};

pub const MAX_APDU_LENGTH: u32 = 1476;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_REVISION: u32 = 14;
/// segmentation-supported = no-segmentation
pub const SEGMENTATION_NONE: u32 = 3;
/// system-status = operational
const SYSTEM_STATUS_OPERATIONAL: u32 = 0;

/// 设备对象的静态描述
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub instance: u32,
    pub name: String,
    pub vendor_id: u16,
    pub vendor_name: String,
    pub model_name: String,
    pub firmware_revision: String,
    pub application_software_version: String,
}

impl DeviceInfo {
    pub fn new(instance: u32, name: impl Into<String>, vendor_id: u16) -> Self {
        Self {
            instance,
            name: name.into(),
            vendor_id,
            vendor_name: "gw-bridge".to_string(),
            model_name: "Modbus TCP to BACnet/IP gateway".to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
            application_software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(ObjectType::Device, self.instance)
    }
}

/// 本设备（唯一实例）
pub struct DeviceObject {
    info: DeviceInfo,
    object_list: Vec<ObjectId>,
}

impl DeviceObject {
    /// `objects` 为设备之外的全部对象，object-list 以设备自身开头
    pub fn new(info: DeviceInfo, objects: Vec<ObjectId>) -> Self {
        let mut object_list = Vec::with_capacity(objects.len() + 1);
        object_list.push(info.object_id());
        object_list.extend(objects);
        Self { info, object_list }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read_object_list(&self, array_index: Option<u32>) -> Result<PropertyValue, PropertyError> {
        match array_index {
            None => Ok(PropertyValue::List(
                self.object_list
                    .iter()
                    .copied()
                    .map(PropertyValue::ObjectId)
                    .collect(),
            )),
            Some(0) => Ok(PropertyValue::Unsigned(self.object_list.len() as u32)),
            Some(index) => self
                .object_list
                .get(index as usize - 1)
                .copied()
                .map(PropertyValue::ObjectId)
                .ok_or_else(PropertyError::invalid_array_index),
        }
    }
}

impl ObjectDescriptor for DeviceObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Device
    }

    fn count(&self) -> usize {
        1
    }

    fn index_to_instance(&self, index: usize) -> Option<u32> {
        (index == 0).then_some(self.info.instance)
    }

    fn instance_to_index(&self, instance: u32) -> Option<usize> {
        (instance == self.info.instance).then_some(0)
    }

    fn object_name(&self, instance: u32) -> Option<String> {
        (instance == self.info.instance).then(|| self.info.name.clone())
    }

    fn read_property(
        &mut self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError> {
        let property = request.property;
        if property == PropertyId::OBJECT_LIST {
            return self.read_object_list(request.array_index);
        }
        if request.array_index.is_some() {
            return Err(PropertyError::not_an_array());
        }

        let info = &self.info;
        let value = match property {
            PropertyId::OBJECT_IDENTIFIER => PropertyValue::ObjectId(info.object_id()),
            PropertyId::OBJECT_NAME => PropertyValue::CharacterString(info.name.clone()),
            PropertyId::OBJECT_TYPE => {
                PropertyValue::Enumerated(u32::from(ObjectType::Device.code()))
            }
            PropertyId::SYSTEM_STATUS => PropertyValue::Enumerated(SYSTEM_STATUS_OPERATIONAL),
            PropertyId::VENDOR_NAME => PropertyValue::CharacterString(info.vendor_name.clone()),
            PropertyId::VENDOR_IDENTIFIER => PropertyValue::Unsigned(u32::from(info.vendor_id)),
            PropertyId::MODEL_NAME => PropertyValue::CharacterString(info.model_name.clone()),
            PropertyId::FIRMWARE_REVISION => {
                PropertyValue::CharacterString(info.firmware_revision.clone())
            }
            PropertyId::APPLICATION_SOFTWARE_VERSION => {
                PropertyValue::CharacterString(info.application_software_version.clone())
            }
            PropertyId::PROTOCOL_VERSION => PropertyValue::Unsigned(PROTOCOL_VERSION),
            PropertyId::PROTOCOL_REVISION => PropertyValue::Unsigned(PROTOCOL_REVISION),
            PropertyId::MAX_APDU_LENGTH_ACCEPTED => PropertyValue::Unsigned(MAX_APDU_LENGTH),
            PropertyId::SEGMENTATION_SUPPORTED => PropertyValue::Enumerated(SEGMENTATION_NONE),
            _ => return Err(PropertyError::unknown_property()),
        };
        Ok(value)
    }

    fn write_property(&mut self, _request: &WritePropertyRequest) -> Result<(), PropertyError> {
        Err(PropertyError::write_access_denied())
    }
}
