// The binary wire codec: proto framing, the message header, fields,
// ops and the ASCII info sub-protocol (spec §4.1).

mod batch_field;
mod field;
mod header;
mod info;
mod message;
mod op;
mod proto;
mod udf;

pub use batch_field::{BatchIndexField, BatchKeyEntry};
pub use field::{Field, FieldType};
pub use header::{info1, info2, info3, MsgHeader, MSG_HEADER_LEN};
pub use info::{
    encode_request as encode_info_request, parse_response as parse_info_response,
    read_response as read_info_response, write_request as write_info_request,
};
pub use message::{read_frame, write_frame, Message};
pub use op::{Op, OpCode};
pub use proto::{ProtoHeader, ProtoType, PROTO_HEADER_LEN, PROTO_VERSION};
pub use udf::build_udf_fields;
