mod frame;
mod group;

pub use frame::{
    ERR_OK, ERR_TRY_AGAIN, MESSAGE_SIZE_MAX, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
    RequestHeader, ResponseHeader, WireError, decode_wire_message,
};
pub use group::{ConfigurationChange, ConfigurationType, GroupTransport, LoopbackTransport, RingId};
