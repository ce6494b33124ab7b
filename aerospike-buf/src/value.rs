// The tagged-union value model (spec §3 Value, §9 "tagged unions for
// values" -> closed sum type with an explicit blob subtype).

use std::io::{Read, Write};

use aerospike_base::{err, Error, ErrorKind, Result};
use ordered_float::OrderedFloat;
use rmp::decode::{self, Marker};
use rmp::encode;

use crate::particle::ParticleType;

/// Language tag carried by a blob so it survives a round-trip through
/// a server and back to the same or a different language binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobSubtype {
    Bytes,
    Java,
    Csharp,
    Python,
    Ruby,
}

impl BlobSubtype {
    pub fn particle_type(self) -> ParticleType {
        match self {
            BlobSubtype::Bytes => ParticleType::Blob,
            BlobSubtype::Java => ParticleType::JavaBlob,
            BlobSubtype::Csharp => ParticleType::CsharpBlob,
            BlobSubtype::Python => ParticleType::PythonBlob,
            BlobSubtype::Ruby => ParticleType::RubyBlob,
        }
    }

    pub fn from_particle_type(pt: ParticleType) -> Option<Self> {
        Some(match pt {
            ParticleType::Blob => BlobSubtype::Bytes,
            ParticleType::JavaBlob => BlobSubtype::Java,
            ParticleType::CsharpBlob => BlobSubtype::Csharp,
            ParticleType::PythonBlob => BlobSubtype::Python,
            ParticleType::RubyBlob => BlobSubtype::Ruby,
            _ => return None,
        })
    }
}

/// Ordering attribute carried by a map value (spec §3 Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapOrder {
    #[default]
    Unordered,
    KeyOrdered,
    KeyValueOrdered,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapValue {
    pub entries: Vec<(Value, Value)>,
    pub order: MapOrder,
    pub persist_index: bool,
}

impl MapValue {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        Self {
            entries,
            order: MapOrder::default(),
            persist_index: false,
        }
    }

    pub fn with_order(mut self, order: MapOrder) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    Blob { subtype: BlobSubtype, data: Vec<u8> },
    List(Vec<Value>),
    Map(MapValue),
    GeoJson(String),
}

impl Value {
    pub fn blob(data: Vec<u8>) -> Self {
        Value::Blob {
            subtype: BlobSubtype::Bytes,
            data,
        }
    }

    pub fn particle_type(&self) -> ParticleType {
        match self {
            Value::Nil => ParticleType::Nil,
            // Booleans have no dedicated particle type on the wire;
            // the server stores them as integers 0/1.
            Value::Bool(_) | Value::Int(_) => ParticleType::Integer,
            Value::Float(_) => ParticleType::Double,
            Value::String(_) => ParticleType::String,
            Value::Blob { subtype, .. } => subtype.particle_type(),
            // Lists, maps and geo-json values are message-pack encoded
            // at the particle level, but each gets its own particle
            // type (spec §8 round-trip invariant) rather than sharing
            // `Blob`'s — a plain blob's bytes must never be
            // misinterpreted as an encoded container.
            Value::List(_) => ParticleType::List,
            Value::Map(_) => ParticleType::Map,
            Value::GeoJson(_) => ParticleType::GeoJson,
        }
    }

    /// Encodes the value's particle payload (the bytes that follow
    /// the op header's particle-type byte on the wire).
    pub fn encode(&self, out: &mut impl Write) -> Result<()> {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => out
                .write_all(&(*b as i64).to_be_bytes())
                .map_err(io_err),
            Value::Int(i) => out.write_all(&i.to_be_bytes()).map_err(io_err),
            Value::Float(f) => out.write_all(&f.into_inner().to_be_bytes()).map_err(io_err),
            Value::String(s) => out.write_all(s.as_bytes()).map_err(io_err),
            Value::Blob { data, .. } => out.write_all(data).map_err(io_err),
            Value::GeoJson(s) => out.write_all(s.as_bytes()).map_err(io_err),
            Value::List(items) => encode_list(items, out),
            Value::Map(m) => encode_map(m, out),
        }
    }

    /// Size in bytes the particle payload will occupy once encoded,
    /// without materializing it (used to size op/field length
    /// prefixes up front).
    pub fn encoded_len(&self) -> usize {
        let mut buf = crate::buf::WriteBuf::new();
        // Best-effort: re-encode into a scratch buffer. For the
        // scalar cases this never fails; container encoding can only
        // fail on I/O, which never happens against a Vec.
        let _ = self.encode(&mut buf);
        buf.len()
    }

    pub fn decode(pt: ParticleType, bytes: &[u8]) -> Result<Value> {
        match pt {
            ParticleType::Nil => Ok(Value::Nil),
            ParticleType::Integer => {
                if bytes.len() != 8 {
                    return Err(err(ErrorKind::Client, "integer particle must be 8 bytes"));
                }
                Ok(Value::Int(i64::from_be_bytes(bytes.try_into().unwrap())))
            }
            ParticleType::Double => {
                if bytes.len() != 8 {
                    return Err(err(ErrorKind::Client, "double particle must be 8 bytes"));
                }
                Ok(Value::Float(OrderedFloat(f64::from_be_bytes(
                    bytes.try_into().unwrap(),
                ))))
            }
            ParticleType::String => Ok(Value::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::new(ErrorKind::Client, e))?,
            )),
            ParticleType::Blob => Ok(Value::blob(bytes.to_vec())),
            pt if pt.is_language_blob() => Ok(Value::Blob {
                subtype: BlobSubtype::from_particle_type(pt).unwrap(),
                data: bytes.to_vec(),
            }),
            ParticleType::List => decode_whole_msgpack_value(bytes),
            ParticleType::Map => decode_whole_msgpack_value(bytes),
            ParticleType::GeoJson => Ok(Value::GeoJson(
                std::str::from_utf8(bytes)
                    .map_err(|e| Error::new(ErrorKind::Client, e))?
                    .to_owned(),
            )),
            ParticleType::Timestamp => {
                if bytes.len() != 8 {
                    return Err(err(ErrorKind::Client, "timestamp particle must be 8 bytes"));
                }
                Ok(Value::Int(i64::from_be_bytes(bytes.try_into().unwrap())))
            }
            ParticleType::Digest => Ok(Value::blob(bytes.to_vec())),
            ParticleType::Max => Err(err(ErrorKind::Client, "unsupported particle type")),
        }
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::new(ErrorKind::Client, e)
}

fn encode_list(items: &[Value], out: &mut impl Write) -> Result<()> {
    encode::write_array_len(out, items.len() as u32).map_err(|e| Error::new(ErrorKind::Client, e))?;
    for v in items {
        encode_msgpack_value(v, out)?;
    }
    Ok(())
}

fn encode_map(m: &MapValue, out: &mut impl Write) -> Result<()> {
    encode::write_map_len(out, m.entries.len() as u32)
        .map_err(|e| Error::new(ErrorKind::Client, e))?;
    for (k, v) in &m.entries {
        encode_msgpack_value(k, out)?;
        encode_msgpack_value(v, out)?;
    }
    Ok(())
}

fn encode_msgpack_value(v: &Value, out: &mut impl Write) -> Result<()> {
    match v {
        Value::Nil => encode::write_nil(out).map_err(io_err),
        Value::Bool(b) => encode::write_bool(out, *b).map_err(io_err),
        Value::Int(i) => encode::write_sint(out, *i)
            .map(|_| ())
            .map_err(|e| Error::new(ErrorKind::Client, e)),
        Value::Float(f) => encode::write_f64(out, f.into_inner()).map_err(io_err),
        Value::String(s) => encode::write_str(out, s).map_err(|e| Error::new(ErrorKind::Client, e)),
        Value::Blob { data, .. } => {
            encode::write_bin(out, data).map_err(|e| Error::new(ErrorKind::Client, e))
        }
        Value::GeoJson(s) => encode::write_str(out, s).map_err(|e| Error::new(ErrorKind::Client, e)),
        Value::List(items) => {
            encode::write_array_len(out, items.len() as u32)
                .map_err(|e| Error::new(ErrorKind::Client, e))?;
            for item in items {
                encode_msgpack_value(item, out)?;
            }
            Ok(())
        }
        Value::Map(m) => {
            encode::write_map_len(out, m.entries.len() as u32)
                .map_err(|e| Error::new(ErrorKind::Client, e))?;
            for (k, v) in &m.entries {
                encode_msgpack_value(k, out)?;
                encode_msgpack_value(v, out)?;
            }
            Ok(())
        }
    }
}

/// Decodes a particle payload that is expected to be exactly one
/// message-pack value with no trailing bytes. List/Map particles are
/// disjoint from `Blob` (spec §8 round-trip invariant), so this never
/// needs to guess whether a payload is a container — the particle
/// type already told the caller that — but it still checks that the
/// msgpack decode consumed every byte, rejecting a truncated or
/// trailer-bearing payload rather than silently ignoring the tail.
fn decode_whole_msgpack_value(bytes: &[u8]) -> Result<Value> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value = decode_msgpack_value(&mut cursor)?;
    if (cursor.position() as usize) != bytes.len() {
        return Err(err(
            ErrorKind::Client,
            "container particle had trailing bytes after its message-pack value",
        ));
    }
    Ok(value)
}

fn decode_msgpack_value(cur: &mut impl Read) -> Result<Value> {
    let marker = decode::read_marker(cur).map_err(|_| err(ErrorKind::Client, "bad msgpack marker"))?;
    Ok(match marker {
        Marker::Null => Value::Nil,
        Marker::True => Value::Bool(true),
        Marker::False => Value::Bool(false),
        Marker::FixPos(v) => Value::Int(v as i64),
        Marker::FixNeg(v) => Value::Int(v as i64),
        Marker::U8 => Value::Int(read_u8(cur)? as i64),
        Marker::U16 => Value::Int(read_u16(cur)? as i64),
        Marker::U32 => Value::Int(read_u32(cur)? as i64),
        Marker::U64 => Value::Int(read_u64(cur)? as i64),
        Marker::I8 => Value::Int(read_i8(cur)? as i64),
        Marker::I16 => Value::Int(read_i16(cur)? as i64),
        Marker::I32 => Value::Int(read_i32(cur)? as i64),
        Marker::I64 => Value::Int(read_i64(cur)?),
        Marker::F32 => Value::Float(OrderedFloat(read_f32(cur)? as f64)),
        Marker::F64 => Value::Float(OrderedFloat(read_f64(cur)?)),
        Marker::FixStr(len) => Value::String(read_str(cur, len as usize)?),
        Marker::Str8 => {
            let len = read_u8(cur)? as usize;
            Value::String(read_str(cur, len)?)
        }
        Marker::Str16 => {
            let len = read_u16(cur)? as usize;
            Value::String(read_str(cur, len)?)
        }
        Marker::Str32 => {
            let len = read_u32(cur)? as usize;
            Value::String(read_str(cur, len)?)
        }
        Marker::Bin8 => {
            let len = read_u8(cur)? as usize;
            Value::blob(read_bytes(cur, len)?)
        }
        Marker::Bin16 => {
            let len = read_u16(cur)? as usize;
            Value::blob(read_bytes(cur, len)?)
        }
        Marker::Bin32 => {
            let len = read_u32(cur)? as usize;
            Value::blob(read_bytes(cur, len)?)
        }
        Marker::FixArray(len) => decode_array(cur, len as usize)?,
        Marker::Array16 => {
            let len = read_u16(cur)? as usize;
            decode_array(cur, len)?
        }
        Marker::Array32 => {
            let len = read_u32(cur)? as usize;
            decode_array(cur, len)?
        }
        Marker::FixMap(len) => decode_map(cur, len as usize)?,
        Marker::Map16 => {
            let len = read_u16(cur)? as usize;
            decode_map(cur, len)?
        }
        Marker::Map32 => {
            let len = read_u32(cur)? as usize;
            decode_map(cur, len)?
        }
        _ => return Err(err(ErrorKind::Client, "unsupported msgpack marker")),
    })
}

fn decode_array(cur: &mut impl Read, len: usize) -> Result<Value> {
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(decode_msgpack_value(cur)?);
    }
    Ok(Value::List(items))
}

fn decode_map(cur: &mut impl Read, len: usize) -> Result<Value> {
    let mut entries = Vec::with_capacity(len);
    for _ in 0..len {
        let k = decode_msgpack_value(cur)?;
        let v = decode_msgpack_value(cur)?;
        entries.push((k, v));
    }
    Ok(Value::Map(MapValue::new(entries)))
}

fn read_u8(cur: &mut impl Read) -> Result<u8> {
    let mut b = [0u8; 1];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(b[0])
}
fn read_i8(cur: &mut impl Read) -> Result<i8> {
    Ok(read_u8(cur)? as i8)
}
fn read_u16(cur: &mut impl Read) -> Result<u16> {
    let mut b = [0u8; 2];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(u16::from_be_bytes(b))
}
fn read_i16(cur: &mut impl Read) -> Result<i16> {
    Ok(read_u16(cur)? as i16)
}
fn read_u32(cur: &mut impl Read) -> Result<u32> {
    let mut b = [0u8; 4];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(u32::from_be_bytes(b))
}
fn read_i32(cur: &mut impl Read) -> Result<i32> {
    Ok(read_u32(cur)? as i32)
}
fn read_u64(cur: &mut impl Read) -> Result<u64> {
    let mut b = [0u8; 8];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(u64::from_be_bytes(b))
}
fn read_i64(cur: &mut impl Read) -> Result<i64> {
    Ok(read_u64(cur)? as i64)
}
fn read_f32(cur: &mut impl Read) -> Result<f32> {
    let mut b = [0u8; 4];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(f32::from_be_bytes(b))
}
fn read_f64(cur: &mut impl Read) -> Result<f64> {
    let mut b = [0u8; 8];
    cur.read_exact(&mut b).map_err(io_err)?;
    Ok(f64::from_be_bytes(b))
}
fn read_bytes(cur: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    let mut v = vec![0u8; len];
    cur.read_exact(&mut v).map_err(io_err)?;
    Ok(v)
}
fn read_str(cur: &mut impl Read, len: usize) -> Result<String> {
    let bytes = read_bytes(cur, len)?;
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::Client, e))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_roundtrip() {
        let v = Value::Int(42);
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::Integer, &buf).unwrap();
        assert_eq!(back, Value::Int(42));
    }

    #[test]
    fn string_roundtrip() {
        let v = Value::String("hi".to_owned());
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::String, &buf).unwrap();
        assert_eq!(back, Value::String("hi".to_owned()));
    }

    #[test]
    fn list_roundtrips_through_its_own_particle_type() {
        let v = Value::List(vec![Value::Int(1), Value::String("x".into())]);
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::List, &buf).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn map_roundtrip_preserves_insertion_order() {
        let m = MapValue::new(vec![
            (Value::String("b".into()), Value::Int(2)),
            (Value::String("a".into()), Value::Int(1)),
        ]);
        let v = Value::Map(m);
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::Map, &buf).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn language_tagged_blob_roundtrip() {
        let v = Value::Blob {
            subtype: BlobSubtype::Python,
            data: vec![1, 2, 3],
        };
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::PythonBlob, &buf).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn plain_blob_that_looks_like_a_container_tag_is_not_sniffed() {
        // Bytes that would have collided with the old leading-tag-byte
        // sniff (0x00 followed by an empty msgpack array) must survive
        // as opaque bytes now that `Blob` never auto-detects a
        // container — particle type alone decides.
        let v = Value::blob(vec![0x00, 0x90]);
        let mut buf = Vec::new();
        v.encode(&mut buf).unwrap();
        let back = Value::decode(ParticleType::Blob, &buf).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn container_particle_rejects_trailing_garbage() {
        let mut buf = Vec::new();
        Value::List(vec![Value::Int(1)]).encode(&mut buf).unwrap();
        buf.push(0xFF);
        assert!(Value::decode(ParticleType::List, &buf).is_err());
    }
}
