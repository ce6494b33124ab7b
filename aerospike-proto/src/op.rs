// Operation entries: `[4-byte size][1-byte op code][1-byte particle
// type][1-byte reserved, always 0][1-byte name length][name bytes]
// [1-byte context length][context bytes if length > 0][value bytes]`
// (spec §4.1, grounded on `cf_proto.h`'s `cl_msg_op` / `CL_MSG_OP_*`).
// The reserved byte is part of the spec's bit-exact framing contract
// and is never repurposed; CDT sub-context presence is instead
// signaled by its own always-present length byte (0 meaning "no
// context"), which is this client's own addition on top of the fixed
// header — see DESIGN.md's invented-but-documented formats.

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_buf::{ParticleType, ReadBuf, Value, WriteBuf};

/// An unrecognized wire ID (a newer server's op) decodes to
/// `OpCode::Unknown` rather than failing the whole frame (spec §9:
/// unknown field/op IDs are forward-compatible — skip with a
/// warning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Read,
    Write,
    CdtRead,
    CdtWrite,
    Incr,
    Append,
    Prepend,
    Touch,
    Unknown(u8),
}

impl OpCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::CdtRead,
            4 => Self::CdtWrite,
            5 => Self::Incr,
            9 => Self::Append,
            10 => Self::Prepend,
            11 => Self::Touch,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::CdtRead => 3,
            Self::CdtWrite => 4,
            Self::Incr => 5,
            Self::Append => 9,
            Self::Prepend => 10,
            Self::Touch => 11,
            Self::Unknown(v) => v,
        }
    }
}

/// An operation on a single bin. `sub_context` is set for CDT
/// sub-operations (list/map element access) — a message-pack-encoded
/// context path, carried ahead of the value the same way
/// `as_list_operations.c`/`as_map_operations.c` prefix packed context
/// bytes before the sub-op's own arguments. We model only the framing
/// (a length-prefixed context blob preceding the value); the full CDT
/// sub-opcode table is out of this client's scope.
#[derive(Debug, Clone)]
pub struct Op {
    pub code: OpCode,
    pub bin_name: String,
    pub value: Value,
    pub sub_context: Option<Vec<u8>>,
}

const RESERVED: u8 = 0;

impl Op {
    pub fn read(bin_name: impl Into<String>) -> Self {
        Self {
            code: OpCode::Read,
            bin_name: bin_name.into(),
            value: Value::Nil,
            sub_context: None,
        }
    }

    pub fn read_all_bins() -> Self {
        Self::read("")
    }

    pub fn write(bin_name: impl Into<String>, value: Value) -> Self {
        Self {
            code: OpCode::Write,
            bin_name: bin_name.into(),
            value,
            sub_context: None,
        }
    }

    pub fn cdt_write(bin_name: impl Into<String>, context: Vec<u8>, value: Value) -> Self {
        Self {
            code: OpCode::CdtWrite,
            bin_name: bin_name.into(),
            value,
            sub_context: Some(context),
        }
    }

    pub fn cdt_read(bin_name: impl Into<String>, context: Vec<u8>) -> Self {
        Self {
            code: OpCode::CdtRead,
            bin_name: bin_name.into(),
            value: Value::Nil,
            sub_context: Some(context),
        }
    }

    fn context_len(&self) -> usize {
        1 + self.sub_context.as_ref().map_or(0, Vec::len)
    }

    /// Total wire length, including the op's own 4-byte size field.
    pub fn encoded_len(&self) -> usize {
        4 + 1 + 1 + 1 + 1 + self.bin_name.len() + self.context_len() + self.value.encoded_len()
    }

    pub fn encode(&self, out: &mut WriteBuf) -> Result<()> {
        let name_bytes = self.bin_name.as_bytes();
        if name_bytes.len() > u8::MAX as usize {
            return Err(err(ErrorKind::BinNameTooLong, "bin name exceeds 255 bytes"));
        }
        // Size field covers everything after itself: op code, particle
        // type, reserved byte, name-length byte, name, optional
        // context and value.
        let body_len =
            1 + 1 + 1 + 1 + name_bytes.len() + self.context_len() + self.value.encoded_len();
        out.put_u32_be(body_len as u32);
        out.put_u8(self.code.to_u8());
        out.put_u8(self.value.particle_type() as u8);
        out.put_u8(RESERVED);
        out.put_u8(name_bytes.len() as u8);
        out.put_bytes(name_bytes);
        match &self.sub_context {
            Some(ctx) => {
                if ctx.len() > u8::MAX as usize {
                    return Err(err(ErrorKind::Client, "cdt context exceeds 255 bytes"));
                }
                out.put_u8(ctx.len() as u8);
                out.put_bytes(ctx);
            }
            None => out.put_u8(0),
        }
        self.value.encode(out)
    }

    pub fn decode(buf: &mut ReadBuf) -> Result<Self> {
        let size = buf.get_u32_be()? as usize;
        if size < 4 {
            return Err(err(ErrorKind::Client, "op size too small to hold a header"));
        }
        let code = OpCode::from_u8(buf.get_u8()?);
        let particle_type = buf.get_u8()?;
        let particle_type = ParticleType::from_u8(particle_type)
            .ok_or_else(|| err(ErrorKind::Client, "unknown particle type"))?;
        let _reserved = buf.get_u8()?;
        let name_len = buf.get_u8()? as usize;
        let bin_name = String::from_utf8(buf.get_bytes(name_len)?.to_vec())
            .map_err(|e| Error::new(ErrorKind::Client, e))?;

        let ctx_len = buf.get_u8()? as usize;
        let sub_context = if ctx_len > 0 {
            Some(buf.get_bytes(ctx_len)?.to_vec())
        } else {
            None
        };

        let consumed = 1 + name_len + 1 + ctx_len;
        let value_len = size - 3 - consumed;
        let value_bytes = buf.get_bytes(value_len)?;
        let value = Value::decode(particle_type, value_bytes)?;
        Ok(Self {
            code,
            bin_name,
            value,
            sub_context,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn op_roundtrip() {
        let op = Op::write("x", Value::Int(42));
        let mut buf = WriteBuf::new();
        op.encode(&mut buf).unwrap();
        let bytes = buf.into_vec();
        let mut r = ReadBuf::new(&bytes);
        let back = Op::decode(&mut r).unwrap();
        assert_eq!(back.bin_name, "x");
        assert_eq!(back.value, Value::Int(42));
        assert_eq!(back.code, OpCode::Write);
    }

    #[test]
    fn name_too_long_is_rejected() {
        let name = "a".repeat(256);
        let op = Op::write(name, Value::Int(1));
        let mut buf = WriteBuf::new();
        let e = op.encode(&mut buf).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::BinNameTooLong);
    }
}
