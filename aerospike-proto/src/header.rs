// The fixed 22-byte message header that starts every request/response
// payload (spec §4.1), plus the info1/2/3 bit assignments, which are
// fixed on the wire and part of the protocol contract (spec §4.1,
// grounded on `as_command.h`'s `AS_MSG_INFO*` bits).

use aerospike_base::Result;
use aerospike_buf::{ReadBuf, WriteBuf};

pub const MSG_HEADER_LEN: usize = 22;

pub mod info1 {
    pub const READ: u8 = 1 << 0;
    pub const GET_ALL: u8 = 1 << 1;
    pub const GET_ALL_NO_DATA: u8 = 1 << 2;
    pub const BATCH_INDEX: u8 = 1 << 3;
    pub const XDR: u8 = 1 << 4;
    pub const GET_NO_BIN_DATA: u8 = 1 << 5;
    pub const READ_MODE_AP_ALL: u8 = 1 << 6;
    pub const COMPRESS_RESPONSE: u8 = 1 << 7;
}

pub mod info2 {
    pub const WRITE: u8 = 1 << 0;
    pub const DELETE: u8 = 1 << 1;
    pub const GENERATION: u8 = 1 << 2;
    pub const GENERATION_GT: u8 = 1 << 3;
    pub const DURABLE_DELETE: u8 = 1 << 4;
    pub const CREATE_ONLY: u8 = 1 << 5;
    pub const RESPOND_ALL_OPS: u8 = 1 << 7;
}

pub mod info3 {
    pub const LAST: u8 = 1 << 0;
    pub const COMMIT_MASTER: u8 = 1 << 1;
    pub const PARTITION_DONE: u8 = 1 << 2;
    pub const UPDATE_ONLY: u8 = 1 << 3;
    pub const CREATE_OR_REPLACE: u8 = 1 << 4;
    pub const REPLACE_ONLY: u8 = 1 << 5;
    pub const SC_READ_TYPE: u8 = 1 << 6;
    pub const SC_READ_RELAX: u8 = 1 << 7;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MsgHeader {
    pub info1: u8,
    pub info2: u8,
    pub info3: u8,
    pub result_code: u8,
    pub generation: u32,
    pub record_ttl: u32,
    pub txn_ttl: u32,
    pub n_fields: u16,
    pub n_ops: u16,
}

impl MsgHeader {
    pub fn encode(&self, out: &mut WriteBuf) {
        out.put_u8(MSG_HEADER_LEN as u8);
        out.put_u8(self.info1);
        out.put_u8(self.info2);
        out.put_u8(self.info3);
        out.put_u8(0); // unused
        out.put_u8(self.result_code);
        out.put_u32_be(self.generation);
        out.put_u32_be(self.record_ttl);
        out.put_u32_be(self.txn_ttl);
        out.put_u16_be(self.n_fields);
        out.put_u16_be(self.n_ops);
    }

    pub fn decode(buf: &mut ReadBuf) -> Result<Self> {
        let _header_sz = buf.get_u8()?;
        let info1 = buf.get_u8()?;
        let info2 = buf.get_u8()?;
        let info3 = buf.get_u8()?;
        let _unused = buf.get_u8()?;
        let result_code = buf.get_u8()?;
        let generation = buf.get_u32_be()?;
        let record_ttl = buf.get_u32_be()?;
        let txn_ttl = buf.get_u32_be()?;
        let n_fields = buf.get_u16_be()?;
        let n_ops = buf.get_u16_be()?;
        Ok(Self {
            info1,
            info2,
            info3,
            result_code,
            generation,
            record_ttl,
            txn_ttl,
            n_fields,
            n_ops,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = MsgHeader {
            info1: info1::READ,
            info2: 0,
            info3: 0,
            result_code: 0,
            generation: 7,
            record_ttl: 100,
            txn_ttl: 0,
            n_fields: 2,
            n_ops: 1,
        };
        let mut buf = WriteBuf::new();
        h.encode(&mut buf);
        let bytes = buf.into_vec();
        assert_eq!(bytes.len(), MSG_HEADER_LEN);
        let mut r = ReadBuf::new(&bytes);
        let back = MsgHeader::decode(&mut r).unwrap();
        assert_eq!(back.generation, 7);
        assert_eq!(back.info1, info1::READ);
        assert_eq!(back.n_fields, 2);
    }
}
