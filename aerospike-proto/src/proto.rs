// The 8-byte frame header every request and response starts with
// (spec §4.1): 1-byte version, 1-byte type, 6-byte big-endian size.

use aerospike_base::{err, ErrorKind, Result};
use aerospike_buf::{ReadBuf, WriteBuf};

pub const PROTO_VERSION: u8 = 2;
pub const PROTO_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtoType {
    Info = 1,
    Message = 3,
    CompressedMessage = 4,
}

impl ProtoType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ProtoType::Info),
            3 => Ok(ProtoType::Message),
            4 => Ok(ProtoType::CompressedMessage),
            other => Err(err(
                ErrorKind::Client,
                format!("unknown proto frame type {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProtoHeader {
    pub version: u8,
    pub kind: ProtoType,
    pub size: u64,
}

impl ProtoHeader {
    pub fn new(kind: ProtoType, size: u64) -> Self {
        Self {
            version: PROTO_VERSION,
            kind,
            size,
        }
    }

    pub fn encode(&self, out: &mut WriteBuf) {
        out.put_u8(self.version);
        out.put_u8(self.kind as u8);
        out.put_u48_be(self.size);
    }

    pub fn decode(buf: &mut ReadBuf) -> Result<Self> {
        let version = buf.get_u8()?;
        let kind = ProtoType::from_u8(buf.get_u8()?)?;
        let size = buf.get_u48_be()?;
        Ok(Self {
            version,
            kind,
            size,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut buf = WriteBuf::new();
        ProtoHeader::new(ProtoType::Message, 1234).encode(&mut buf);
        let bytes = buf.into_vec();
        assert_eq!(bytes.len(), PROTO_HEADER_LEN);
        let mut r = ReadBuf::new(&bytes);
        let h = ProtoHeader::decode(&mut r).unwrap();
        assert_eq!(h.version, PROTO_VERSION);
        assert_eq!(h.kind, ProtoType::Message);
        assert_eq!(h.size, 1234);
    }

    #[test]
    fn rejects_unknown_type() {
        let mut buf = WriteBuf::new();
        buf.put_u8(PROTO_VERSION);
        buf.put_u8(9);
        buf.put_u48_be(0);
        let bytes = buf.into_vec();
        let mut r = ReadBuf::new(&bytes);
        assert!(ProtoHeader::decode(&mut r).is_err());
    }
}
