//! 模拟输入对象
//!
//! 实例号与索引一一对应：实例 i 即索引 i。

use crate::object::{
    ObjectDescriptor, ObjectId, ObjectType, PropertyError, PropertyId, PropertyValue,
    ReadPropertyRequest, WritePropertyRequest,
};

/// units = no-units
pub const UNITS_NO_UNITS: u32 = 95;
/// event-state = normal
const EVENT_STATE_NORMAL: u32 = 0;

#[derive(Debug, Clone)]
struct AnalogInput {
    name: String,
    present_value: f32,
    out_of_service: bool,
    units: u32,
}

/// 一组模拟输入对象
#[derive(Debug, Clone)]
pub struct AnalogInputs {
    objects: Vec<AnalogInput>,
}

impl AnalogInputs {
    pub fn new(count: usize) -> Self {
        let objects = (0..count)
            .map(|index| AnalogInput {
                name: format!("ANALOG INPUT {}", index),
                present_value: 0.0,
                out_of_service: false,
                units: UNITS_NO_UNITS,
            })
            .collect();
        Self { objects }
    }

    pub fn present_value(&self, index: usize) -> Option<f32> {
        self.objects.get(index).map(|object| object.present_value)
    }

    /// 索引越界时返回 false
    pub fn set_present_value(&mut self, index: usize, value: f32) -> bool {
        match self.objects.get_mut(index) {
            Some(object) => {
                object.present_value = value;
                true
            }
            None => false,
        }
    }

    pub fn out_of_service(&self, index: usize) -> Option<bool> {
        self.objects.get(index).map(|object| object.out_of_service)
    }
}

impl ObjectDescriptor for AnalogInputs {
    fn object_type(&self) -> ObjectType {
        ObjectType::AnalogInput
    }

    fn count(&self) -> usize {
        self.objects.len()
    }

    fn index_to_instance(&self, index: usize) -> Option<u32> {
        (index < self.objects.len()).then_some(index as u32)
    }

    fn instance_to_index(&self, instance: u32) -> Option<usize> {
        let index = instance as usize;
        (index < self.objects.len()).then_some(index)
    }

    fn object_name(&self, instance: u32) -> Option<String> {
        self.instance_to_index(instance)
            .map(|index| self.objects[index].name.clone())
    }

    fn read_property(
        &mut self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError> {
        let index = self
            .instance_to_index(request.object.instance)
            .ok_or_else(PropertyError::unknown_object)?;
        let object = &self.objects[index];

        let value = match request.property {
            PropertyId::OBJECT_IDENTIFIER => PropertyValue::ObjectId(ObjectId::new(
                ObjectType::AnalogInput,
                request.object.instance,
            )),
            PropertyId::OBJECT_NAME => PropertyValue::CharacterString(object.name.clone()),
            PropertyId::OBJECT_TYPE => {
                PropertyValue::Enumerated(u32::from(ObjectType::AnalogInput.code()))
            }
            PropertyId::PRESENT_VALUE => PropertyValue::Real(object.present_value),
            // in-alarm, fault, overridden, out-of-service
            PropertyId::STATUS_FLAGS => {
                PropertyValue::BitString(vec![false, false, false, object.out_of_service])
            }
            PropertyId::EVENT_STATE => PropertyValue::Enumerated(EVENT_STATE_NORMAL),
            PropertyId::OUT_OF_SERVICE => PropertyValue::Boolean(object.out_of_service),
            PropertyId::UNITS => PropertyValue::Enumerated(object.units),
            _ => return Err(PropertyError::unknown_property()),
        };

        if request.array_index.is_some() {
            return Err(PropertyError::not_an_array());
        }
        Ok(value)
    }

    fn write_property(&mut self, request: &WritePropertyRequest) -> Result<(), PropertyError> {
        let index = self
            .instance_to_index(request.object.instance)
            .ok_or_else(PropertyError::unknown_object)?;
        if request.array_index.is_some() {
            return Err(PropertyError::not_an_array());
        }
        let object = &mut self.objects[index];

        match request.property {
            PropertyId::OUT_OF_SERVICE => match request.value {
                PropertyValue::Boolean(value) => {
                    object.out_of_service = value;
                    Ok(())
                }
                _ => Err(PropertyError::invalid_data_type()),
            },
            PropertyId::PRESENT_VALUE => {
                if !object.out_of_service {
                    return Err(PropertyError::write_access_denied());
                }
                match request.value {
                    PropertyValue::Real(value) if value.is_finite() => {
                        object.present_value = value;
                        Ok(())
                    }
                    PropertyValue::Real(_) => Err(PropertyError::value_out_of_range()),
                    _ => Err(PropertyError::invalid_data_type()),
                }
            }
            PropertyId::OBJECT_IDENTIFIER
            | PropertyId::OBJECT_NAME
            | PropertyId::OBJECT_TYPE
            | PropertyId::STATUS_FLAGS
            | PropertyId::EVENT_STATE
            | PropertyId::UNITS => Err(PropertyError::write_access_denied()),
            _ => Err(PropertyError::unknown_property()),
        }
    }
}
