//! 默认服务处理器：Who-Is → I-Am，ReadProperty → ComplexACK / Error

use crate::address_cache::PeerAddress;
use crate::apdu::{
    self, AbortReason, ConfirmedRequest, ConfirmedService, ReadPropertyAck, RejectReason, WhoIs,
};
use crate::error::DecodeError;
use crate::object::{MAX_INSTANCE, ObjectType, ReadPropertyRequest};
use crate::stack::StackState;
use tracing::debug;

pub fn handle_who_is(
    state: &mut StackState,
    peer: &PeerAddress,
    data: &[u8],
) -> Result<(), DecodeError> {
    let who_is = WhoIs::decode(data)?;
    if who_is.matches(state.device().instance) {
        debug!(target: "gw.bacnet", mac = %peer.mac, "who_is_answered");
        state.send_i_am();
    }
    Ok(())
}

pub fn handle_read_property(
    state: &mut StackState,
    peer: &PeerAddress,
    request: &ConfirmedRequest<'_>,
) -> Vec<u8> {
    let invoke_id = request.invoke_id;
    let mut read = match ReadPropertyRequest::decode(request.data) {
        Ok(read) => read,
        Err(err) => {
            debug!(target: "gw.bacnet", mac = %peer.mac, error = %err, "read_property_malformed");
            let reason = match err {
                DecodeError::Truncated => RejectReason::MissingRequiredParameter,
                _ => RejectReason::InvalidTag,
            };
            return apdu::encode_reject(invoke_id, reason);
        }
    };

    // 设备通配实例指向本设备
    if read.object.object_type == ObjectType::Device && read.object.instance == MAX_INSTANCE {
        read.object.instance = state.device().instance;
    }

    match state.objects_mut().read_property(&read) {
        Ok(value) => {
            let ack = ReadPropertyAck {
                object: read.object,
                property: read.property,
                array_index: read.array_index,
                value,
            }
            .encode(invoke_id);
            if ack.len() > usize::from(request.max_apdu) {
                return apdu::encode_abort(invoke_id, AbortReason::SegmentationNotSupported);
            }
            ack
        }
        Err(err) => {
            debug!(
                target: "gw.bacnet",
                object = ?read.object,
                property = read.property.0,
                error = %err,
                "read_property_error"
            );
            apdu::encode_error(invoke_id, ConfirmedService::ReadProperty, err)
        }
    }
}
