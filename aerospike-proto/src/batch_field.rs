// The batch-index field body: one `BatchIndex`/`BatchIndexWithSet`
// field carries every key a batch command targets at a single node
// (spec §4.6 batch tail). `as_command.h` only fixes the field-type
// IDs (41/42); the per-key repeat-compression grammar itself wasn't
// in the kept `original_source` files, so this is a self-consistent
// format (documented here, not the wire-exact legacy one): a key
// count, then per key an original index, digest, optional set name,
// and its op list.

use aerospike_base::{err, ErrorKind, Result};
use aerospike_buf::{ReadBuf, WriteBuf, DIGEST_LEN};

use crate::op::Op;

#[derive(Debug, Clone)]
pub struct BatchKeyEntry {
    /// Position of this key in the caller's original request, so
    /// results can be stitched back into input order once every
    /// node's response has come back.
    pub original_index: u32,
    pub digest: [u8; DIGEST_LEN],
    pub set_name: Option<String>,
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchIndexField {
    pub entries: Vec<BatchKeyEntry>,
}

impl BatchIndexField {
    pub fn encode(&self, out: &mut WriteBuf) -> Result<()> {
        out.put_u32_be(self.entries.len() as u32);
        for entry in &self.entries {
            out.put_u32_be(entry.original_index);
            out.put_bytes(&entry.digest);
            match &entry.set_name {
                Some(name) => {
                    out.put_u8(1);
                    let bytes = name.as_bytes();
                    out.put_u16_be(bytes.len() as u16);
                    out.put_bytes(bytes);
                }
                None => out.put_u8(0),
            }
            out.put_u16_be(entry.ops.len() as u16);
            for op in &entry.ops {
                op.encode(out)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut ReadBuf) -> Result<Self> {
        let count = buf.get_u32_be()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let original_index = buf.get_u32_be()?;
            let digest_bytes = buf.get_bytes(DIGEST_LEN)?;
            let mut digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(digest_bytes);
            let has_set = buf.get_u8()?;
            let set_name = if has_set == 1 {
                let len = buf.get_u16_be()? as usize;
                let bytes = buf.get_bytes(len)?.to_vec();
                Some(String::from_utf8(bytes).map_err(|e| {
                    aerospike_base::Error::new(ErrorKind::Client, e)
                })?)
            } else if has_set == 0 {
                None
            } else {
                return Err(err(ErrorKind::Client, "invalid batch set-name marker"));
            };
            let n_ops = buf.get_u16_be()?;
            let mut ops = Vec::with_capacity(n_ops as usize);
            for _ in 0..n_ops {
                ops.push(Op::decode(buf)?);
            }
            entries.push(BatchKeyEntry {
                original_index,
                digest,
                set_name,
                ops,
            });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aerospike_buf::Value;

    #[test]
    fn batch_index_field_roundtrip() {
        let field = BatchIndexField {
            entries: vec![
                BatchKeyEntry {
                    original_index: 0,
                    digest: [1u8; DIGEST_LEN],
                    set_name: Some("demo".to_owned()),
                    ops: vec![Op::read_all_bins()],
                },
                BatchKeyEntry {
                    original_index: 3,
                    digest: [2u8; DIGEST_LEN],
                    set_name: None,
                    ops: vec![Op::write("a", Value::Int(1))],
                },
            ],
        };
        let mut buf = WriteBuf::new();
        field.encode(&mut buf).unwrap();
        let bytes = buf.into_vec();
        let mut r = ReadBuf::new(&bytes);
        let back = BatchIndexField::decode(&mut r).unwrap();
        assert_eq!(back.entries.len(), 2);
        assert_eq!(back.entries[0].original_index, 0);
        assert_eq!(back.entries[0].set_name.as_deref(), Some("demo"));
        assert_eq!(back.entries[1].original_index, 3);
        assert!(back.entries[1].set_name.is_none());
    }

    #[test]
    fn empty_batch_field_roundtrips() {
        let field = BatchIndexField::default();
        let mut buf = WriteBuf::new();
        field.encode(&mut buf).unwrap();
        let bytes = buf.into_vec();
        let mut r = ReadBuf::new(&bytes);
        let back = BatchIndexField::decode(&mut r).unwrap();
        assert!(back.entries.is_empty());
    }
}
