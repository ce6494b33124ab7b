// Request/response fields: `[4-byte big-endian size including the
// type byte][1-byte type][bytes]` (spec §4.1). The field-type IDs are
// fixed on the wire (grounded on `as_command.h`'s `AS_FIELD_*`). An ID
// this client doesn't recognize (a newer server's field) decodes to
// `FieldType::Unknown` rather than failing the whole frame (spec §9:
// unknown field/op IDs are forward-compatible — skip with a warning).

use aerospike_base::{err, ErrorKind, Result};
use aerospike_buf::{ReadBuf, WriteBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Namespace,
    SetName,
    Key,
    Digest,
    TaskId,
    ScanTimeout,
    ScanRps,
    PidArray,
    DigestArray,
    MaxRecords,
    IndexRange,
    IndexFilter,
    IndexLimit,
    IndexOrder,
    IndexType,
    UdfPackageName,
    UdfFunction,
    UdfArgList,
    UdfOp,
    QueryBins,
    BatchIndex,
    BatchIndexWithSet,
    Filter,
    Unknown(u8),
}

impl FieldType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Namespace,
            1 => Self::SetName,
            2 => Self::Key,
            4 => Self::Digest,
            7 => Self::TaskId,
            9 => Self::ScanTimeout,
            10 => Self::ScanRps,
            11 => Self::PidArray,
            12 => Self::DigestArray,
            13 => Self::MaxRecords,
            22 => Self::IndexRange,
            23 => Self::IndexFilter,
            24 => Self::IndexLimit,
            25 => Self::IndexOrder,
            26 => Self::IndexType,
            30 => Self::UdfPackageName,
            31 => Self::UdfFunction,
            32 => Self::UdfArgList,
            33 => Self::UdfOp,
            40 => Self::QueryBins,
            41 => Self::BatchIndex,
            42 => Self::BatchIndexWithSet,
            43 => Self::Filter,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Namespace => 0,
            Self::SetName => 1,
            Self::Key => 2,
            Self::Digest => 4,
            Self::TaskId => 7,
            Self::ScanTimeout => 9,
            Self::ScanRps => 10,
            Self::PidArray => 11,
            Self::DigestArray => 12,
            Self::MaxRecords => 13,
            Self::IndexRange => 22,
            Self::IndexFilter => 23,
            Self::IndexLimit => 24,
            Self::IndexOrder => 25,
            Self::IndexType => 26,
            Self::UdfPackageName => 30,
            Self::UdfFunction => 31,
            Self::UdfArgList => 32,
            Self::UdfOp => 33,
            Self::QueryBins => 40,
            Self::BatchIndex => 41,
            Self::BatchIndexWithSet => 42,
            Self::Filter => 43,
            Self::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub kind: FieldType,
    pub data: Vec<u8>,
}

impl Field {
    pub fn new(kind: FieldType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn string(kind: FieldType, s: &str) -> Self {
        Self::new(kind, s.as_bytes().to_vec())
    }

    pub fn encoded_len(&self) -> usize {
        4 + 1 + self.data.len()
    }

    pub fn encode(&self, out: &mut WriteBuf) {
        out.put_u32_be((1 + self.data.len()) as u32);
        out.put_u8(self.kind.to_u8());
        out.put_bytes(&self.data);
    }

    /// A field whose declared size would overrun the frame is a
    /// protocol error (spec §4.1): the caller closes the connection.
    /// An unrecognized type byte is not an error here — it decodes to
    /// `FieldType::Unknown` and `Message::decode_body` drops it with a
    /// warning rather than failing the frame.
    pub fn decode(buf: &mut ReadBuf) -> Result<Self> {
        let size = buf.get_u32_be()? as usize;
        if size == 0 {
            return Err(err(ErrorKind::Client, "field size must include the type byte"));
        }
        let kind = FieldType::from_u8(buf.get_u8()?);
        let data = buf.get_bytes(size - 1)?.to_vec();
        Ok(Self { kind, data })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn field_roundtrip() {
        let f = Field::string(FieldType::Namespace, "test");
        let mut buf = WriteBuf::new();
        f.encode(&mut buf);
        let bytes = buf.into_vec();
        assert_eq!(bytes.len(), f.encoded_len());
        let mut r = ReadBuf::new(&bytes);
        let back = Field::decode(&mut r).unwrap();
        assert_eq!(back.kind, FieldType::Namespace);
        assert_eq!(back.data, b"test");
    }

    #[test]
    fn zero_size_is_protocol_error() {
        let mut buf = WriteBuf::new();
        buf.put_u32_be(0);
        let bytes = buf.into_vec();
        let mut r = ReadBuf::new(&bytes);
        assert!(Field::decode(&mut r).is_err());
    }
}
