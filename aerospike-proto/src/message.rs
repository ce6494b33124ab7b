// A full request/response: proto header + msg header + fields + ops,
// with optional deflate compression (spec §4.1).
//
// Compressed frame body: `[uncompressed_size:u64be][deflated bytes]`
// (grounded on `cf_packet_compression.c`'s zlib usage; we use the
// `flate2` crate's zlib-compatible deflate codec instead of linking
// zlib directly).

use std::io::{Read, Write as IoWrite};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use aerospike_base::{err, Error, ErrorKind, Result};
use aerospike_buf::{BufferPool, ReadBuf, WriteBuf};

use crate::field::{Field, FieldType};
use crate::header::MsgHeader;
use crate::op::{Op, OpCode};
use crate::proto::{ProtoHeader, ProtoType, PROTO_HEADER_LEN};

#[derive(Debug, Clone)]
pub struct Message {
    pub header: MsgHeader,
    pub fields: Vec<Field>,
    pub ops: Vec<Op>,
}

impl Message {
    pub fn new(mut header: MsgHeader, fields: Vec<Field>, ops: Vec<Op>) -> Self {
        header.n_fields = fields.len() as u16;
        header.n_ops = ops.len() as u16;
        Self {
            header,
            fields,
            ops,
        }
    }

    fn encode_payload_into(&self, buf: &mut WriteBuf) -> Result<()> {
        self.header.encode(buf);
        for f in &self.fields {
            f.encode(buf);
        }
        for op in &self.ops {
            op.encode(buf)?;
        }
        Ok(())
    }

    /// Writes `[proto-header][payload]`, deflating the payload first
    /// when `compress` is set and it exceeds `compress_threshold`
    /// bytes (spec §4.1, §6 compress-response).
    pub fn encode_frame(&self, compress: bool, compress_threshold: usize) -> Result<Vec<u8>> {
        let mut payload = WriteBuf::new();
        self.encode_payload_into(&mut payload)?;
        self.frame_from_payload(payload.as_slice(), compress, compress_threshold)
    }

    /// Same as `encode_frame`, but draws its scratch buffer from
    /// `pool` instead of allocating one per call (spec §9: "pooled or
    /// arena-allocated buffer with the same small-path/large-path
    /// split" — this is the per-command hot path that pooling actually
    /// pays for; batch/scan build one frame per node per call rather
    /// than one per record, so they stay on plain `encode_frame`).
    pub fn encode_frame_pooled(
        &self,
        pool: &BufferPool,
        compress: bool,
        compress_threshold: usize,
    ) -> Result<Vec<u8>> {
        let mut payload = pool.checkout();
        self.encode_payload_into(&mut payload)?;
        self.frame_from_payload(payload.as_slice(), compress, compress_threshold)
    }

    fn frame_from_payload(
        &self,
        payload_bytes: &[u8],
        compress: bool,
        compress_threshold: usize,
    ) -> Result<Vec<u8>> {
        if compress && payload_bytes.len() > compress_threshold {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(payload_bytes)
                .map_err(|e| Error::new(ErrorKind::Client, e))?;
            let compressed = encoder
                .finish()
                .map_err(|e| Error::new(ErrorKind::Client, e))?;

            let mut out = WriteBuf::new();
            let body_len = 8 + compressed.len();
            ProtoHeader::new(ProtoType::CompressedMessage, body_len as u64).encode(&mut out);
            out.put_u64_be(payload_bytes.len() as u64);
            out.put_bytes(&compressed);
            return Ok(out.into_vec());
        }

        let mut out = WriteBuf::new();
        ProtoHeader::new(ProtoType::Message, payload_bytes.len() as u64).encode(&mut out);
        out.put_bytes(payload_bytes);
        Ok(out.into_vec())
    }

    /// Parses a complete frame (proto header already consumed by the
    /// caller, who needed it to know how many more bytes to read off
    /// the socket). `kind`/`size` come from that header.
    pub fn decode_body(kind: ProtoType, body: &[u8]) -> Result<Self> {
        let inflated;
        let payload: &[u8] = match kind {
            ProtoType::Message => body,
            ProtoType::CompressedMessage => {
                if body.len() < 8 {
                    return Err(err(ErrorKind::Client, "compressed frame missing size prefix"));
                }
                let uncompressed_size =
                    u64::from_be_bytes(body[0..8].try_into().unwrap()) as usize;
                let mut decoder = ZlibDecoder::new(&body[8..]);
                let mut buf = Vec::with_capacity(uncompressed_size);
                decoder
                    .read_to_end(&mut buf)
                    .map_err(|e| Error::new(ErrorKind::Client, e))?;
                inflated = buf;
                &inflated
            }
            ProtoType::Info => {
                return Err(err(ErrorKind::Client, "expected a message frame, got info"));
            }
        };

        let mut buf = ReadBuf::new(payload);
        let header = MsgHeader::decode(&mut buf)?;
        let mut fields = Vec::with_capacity(header.n_fields as usize);
        for _ in 0..header.n_fields {
            let field = Field::decode(&mut buf)?;
            if let FieldType::Unknown(id) = field.kind {
                tracing::warn!(target: "aerospike", field_type = id, "skipping unrecognized field type");
                continue;
            }
            fields.push(field);
        }
        let mut ops = Vec::with_capacity(header.n_ops as usize);
        for _ in 0..header.n_ops {
            let op = Op::decode(&mut buf)?;
            if let OpCode::Unknown(code) = op.code {
                tracing::warn!(target: "aerospike", op_code = code, "skipping unrecognized op code");
                continue;
            }
            ops.push(op);
        }
        Ok(Self {
            header,
            fields,
            ops,
        })
    }
}

/// Reads one full frame from a blocking reader: the 8-byte proto
/// header, then exactly as many body bytes as it declares. A size
/// that would overrun what the caller is willing to buffer is a
/// protocol error (spec §4.1).
pub fn read_frame(r: &mut impl Read, max_frame_size: usize) -> Result<Message> {
    let mut header_bytes = [0u8; PROTO_HEADER_LEN];
    r.read_exact(&mut header_bytes)
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;
    let mut hbuf = ReadBuf::new(&header_bytes);
    let header = ProtoHeader::decode(&mut hbuf)?;

    if header.size as usize > max_frame_size {
        return Err(err(
            ErrorKind::Client,
            "frame size exceeds the configured maximum",
        ));
    }

    let mut body = vec![0u8; header.size as usize];
    r.read_exact(&mut body)
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;

    Message::decode_body(header.kind, &body)
}

/// Writes a full frame to a blocking writer.
pub fn write_frame(w: &mut impl IoWrite, msg: &Message, compress: bool, threshold: usize) -> Result<()> {
    let bytes = msg.encode_frame(compress, threshold)?;
    w.write_all(&bytes)
        .map_err(|e| Error::new(ErrorKind::Connection, e))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::field::FieldType;
    use crate::header::info1;
    use crate::op::Op;
    use aerospike_buf::Value;

    #[test]
    fn uncompressed_roundtrip() {
        let msg = Message::new(
            MsgHeader {
                info1: info1::READ,
                ..Default::default()
            },
            vec![Field::string(FieldType::Namespace, "test")],
            vec![Op::read_all_bins()],
        );
        let bytes = msg.encode_frame(false, 128).unwrap();
        let mut cursor = &bytes[..];
        let back = read_frame(&mut cursor, 1 << 20).unwrap();
        assert_eq!(back.fields.len(), 1);
        assert_eq!(back.ops.len(), 1);
        assert_eq!(back.header.info1, info1::READ);
    }

    #[test]
    fn compressed_roundtrip_when_over_threshold() {
        let big = "x".repeat(4096);
        let msg = Message::new(
            MsgHeader::default(),
            vec![],
            vec![Op::write("bin", Value::String(big.clone()))],
        );
        let bytes = msg.encode_frame(true, 64).unwrap();
        let mut hbuf = ReadBuf::new(&bytes[..PROTO_HEADER_LEN]);
        let header = ProtoHeader::decode(&mut hbuf).unwrap();
        assert_eq!(header.kind, ProtoType::CompressedMessage);

        let mut cursor = &bytes[..];
        let back = read_frame(&mut cursor, 1 << 20).unwrap();
        assert_eq!(back.ops.len(), 1);
        assert_eq!(back.ops[0].value, Value::String(big));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let msg = Message::new(MsgHeader::default(), vec![], vec![]);
        let bytes = msg.encode_frame(false, 128).unwrap();
        let mut cursor = &bytes[..];
        assert!(read_frame(&mut cursor, 4).is_err());
    }
}
