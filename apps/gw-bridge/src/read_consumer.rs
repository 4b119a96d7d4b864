//! 读属性消费者
//!
//! 模拟输入对象的 present-value 读取入口：先从对应通道非阻塞地取出一个读数
//! 作为新的当前值，再交给默认的模拟输入读取逻辑。通道为空时沿用上一次的值。
//!
//! 带数组下标的请求必然失败，不消费读数。对象 out-of-service 期间当前值由
//! WriteProperty 决定，读数留在队列中，恢复服务后按原顺序继续消费。

use gw_bacnet::{
    AnalogInputs, ObjectDescriptor, ObjectType, PropertyError, PropertyId, PropertyValue,
    ReadPropertyRequest, WritePropertyRequest,
};
use gw_channel::ChannelSet;
use gw_telemetry::{record_read_fresh, record_read_stale};
use std::sync::Arc;
use tracing::trace;

/// 由通道队列驱动 present-value 的模拟输入描述符
pub struct QueuedAnalogInputs {
    inner: AnalogInputs,
    channels: Arc<ChannelSet>,
}

impl QueuedAnalogInputs {
    /// 每个通道对应一个模拟输入对象，实例号即通道编号
    pub fn new(channels: Arc<ChannelSet>) -> Self {
        Self {
            inner: AnalogInputs::new(channels.len()),
            channels,
        }
    }

    /// 取出实例对应通道的队头读数并写入当前值
    fn consume(&mut self, instance: u32) {
        let Some(index) = self.inner.instance_to_index(instance) else {
            return;
        };
        if self.inner.out_of_service(index) != Some(false) {
            return;
        }
        let channel = self
            .channels
            .layout()
            .channel_for_instance(instance)
            .and_then(|id| self.channels.get(id));
        let Some(channel) = channel else {
            return;
        };

        match channel.try_pop() {
            Some(reading) => {
                self.inner.set_present_value(index, reading.as_real());
                record_read_fresh();
                trace!(
                    target: "gw.bridge",
                    channel = %channel.id(),
                    value = reading.value(),
                    "present_value_refreshed"
                );
            }
            None => record_read_stale(),
        }
    }
}

impl ObjectDescriptor for QueuedAnalogInputs {
    fn object_type(&self) -> ObjectType {
        self.inner.object_type()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn index_to_instance(&self, index: usize) -> Option<u32> {
        self.inner.index_to_instance(index)
    }

    fn instance_to_index(&self, instance: u32) -> Option<usize> {
        self.inner.instance_to_index(instance)
    }

    fn valid_instance(&self, instance: u32) -> bool {
        self.inner.valid_instance(instance)
    }

    fn object_name(&self, instance: u32) -> Option<String> {
        self.inner.object_name(instance)
    }

    fn read_property(
        &mut self,
        request: &ReadPropertyRequest,
    ) -> Result<PropertyValue, PropertyError> {
        if request.property == PropertyId::PRESENT_VALUE && request.array_index.is_none() {
            self.consume(request.object.instance);
        }
        self.inner.read_property(request)
    }

    fn write_property(&mut self, request: &WritePropertyRequest) -> Result<(), PropertyError> {
        self.inner.write_property(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ChannelId, ChannelLayout, Reading};
    use gw_bacnet::ObjectId;
    use gw_channel::QueueCapacity;

    fn setup(channels: usize) -> (Arc<ChannelSet>, QueuedAnalogInputs) {
        let set = Arc::new(ChannelSet::new(
            ChannelLayout::new(channels),
            QueueCapacity::Unbounded,
        ));
        let inputs = QueuedAnalogInputs::new(Arc::clone(&set));
        (set, inputs)
    }

    fn read(inputs: &mut QueuedAnalogInputs, instance: u32, property: PropertyId) -> PropertyValue {
        let request = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogInput, instance),
            property,
        );
        inputs.read_property(&request).expect("read")
    }

    fn push(set: &ChannelSet, channel: usize, value: u16) {
        set.get(ChannelId(channel)).expect("channel").push(Reading(value));
    }

    #[test]
    fn reads_consume_in_fifo_order_and_then_go_stale() {
        let (set, mut inputs) = setup(4);
        for value in [10, 20, 30] {
            push(&set, 0, value);
        }

        let values: Vec<PropertyValue> = (0..4)
            .map(|_| read(&mut inputs, 0, PropertyId::PRESENT_VALUE))
            .collect();
        assert_eq!(
            values,
            vec![
                PropertyValue::Real(10.0),
                PropertyValue::Real(20.0),
                PropertyValue::Real(30.0),
                PropertyValue::Real(30.0),
            ]
        );
        assert!(set.get(ChannelId(0)).expect("channel").is_empty());
    }

    #[test]
    fn other_properties_leave_the_queue_alone() {
        let (set, mut inputs) = setup(2);
        push(&set, 1, 7);

        read(&mut inputs, 1, PropertyId::OBJECT_NAME);
        read(&mut inputs, 1, PropertyId::STATUS_FLAGS);
        assert_eq!(set.get(ChannelId(1)).expect("channel").len(), 1);

        assert_eq!(
            read(&mut inputs, 1, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(7.0)
        );
    }

    #[test]
    fn indexed_present_value_read_keeps_the_reading_queued() {
        let (set, mut inputs) = setup(1);
        push(&set, 0, 10);
        push(&set, 0, 20);

        let mut request = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogInput, 0),
            PropertyId::PRESENT_VALUE,
        );
        request.array_index = Some(1);
        assert!(inputs.read_property(&request).is_err());
        assert_eq!(set.get(ChannelId(0)).expect("channel").len(), 2);

        assert_eq!(
            read(&mut inputs, 0, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(10.0)
        );
    }

    #[test]
    fn out_of_service_value_is_not_overwritten_by_queued_readings() {
        let (set, mut inputs) = setup(1);
        let write = |property, value| WritePropertyRequest {
            object: ObjectId::new(ObjectType::AnalogInput, 0),
            property,
            array_index: None,
            value,
            priority: None,
        };
        inputs
            .write_property(&write(PropertyId::OUT_OF_SERVICE, PropertyValue::Boolean(true)))
            .expect("out-of-service");
        inputs
            .write_property(&write(PropertyId::PRESENT_VALUE, PropertyValue::Real(5.0)))
            .expect("present-value");
        push(&set, 0, 10);

        assert_eq!(
            read(&mut inputs, 0, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(5.0)
        );
        assert_eq!(set.get(ChannelId(0)).expect("channel").len(), 1);

        inputs
            .write_property(&write(PropertyId::OUT_OF_SERVICE, PropertyValue::Boolean(false)))
            .expect("in service");
        assert_eq!(
            read(&mut inputs, 0, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(10.0)
        );
    }

    #[test]
    fn invalid_instance_does_not_touch_any_channel() {
        let (set, mut inputs) = setup(2);
        push(&set, 0, 1);
        push(&set, 1, 2);

        let request = ReadPropertyRequest::new(
            ObjectId::new(ObjectType::AnalogInput, 9),
            PropertyId::PRESENT_VALUE,
        );
        assert!(inputs.read_property(&request).is_err());
        assert_eq!(set.pending(), 2);
    }

    #[test]
    fn reading_one_channel_does_not_consume_another() {
        let (set, mut inputs) = setup(4);
        push(&set, 2, 200);
        push(&set, 3, 300);

        assert_eq!(
            read(&mut inputs, 3, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(300.0)
        );
        assert_eq!(set.get(ChannelId(2)).expect("channel").len(), 1);
        // 空通道读取保持初始值
        assert_eq!(
            read(&mut inputs, 0, PropertyId::PRESENT_VALUE),
            PropertyValue::Real(0.0)
        );
    }
}
