// The ASCII info sub-protocol (proto type INFO) used for the
// single-line name/value requests the tender issues every interval
// (spec §4.5): `name1\nname2\n...` in, `name1\tvalue1\nname2\tvalue2\n...`
// out.

use std::collections::HashMap;
use std::io::{Read, Write as IoWrite};

use aerospike_base::{Error, ErrorKind, Result};
use aerospike_buf::{ReadBuf, WriteBuf};

use crate::proto::{ProtoHeader, ProtoType, PROTO_HEADER_LEN};

pub fn encode_request(names: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    let mut out = WriteBuf::new();
    ProtoHeader::new(ProtoType::Info, body.len() as u64).encode(&mut out);
    out.put_bytes(body.as_bytes());
    out.into_vec()
}

pub fn write_request(w: &mut impl IoWrite, names: &[&str]) -> Result<()> {
    w.write_all(&encode_request(names))
        .map_err(|e| Error::new(ErrorKind::Connection, e))
}

/// Reads one info response frame and parses it into a name -> value
/// map. A name with no `\t` separator maps to an empty value.
pub fn read_response(r: &mut impl Read, max_frame_size: usize) -> Result<HashMap<String, String>> {
    let mut header_bytes = [0u8; PROTO_HEADER_LEN];
    r.read_exact(&mut header_bytes)
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;
    let mut hbuf = ReadBuf::new(&header_bytes);
    let header = ProtoHeader::decode(&mut hbuf)?;

    if header.size as usize > max_frame_size {
        return Err(Error::new(
            ErrorKind::Client,
            std::io::Error::new(std::io::ErrorKind::InvalidData, "info frame too large"),
        ));
    }

    let mut body = vec![0u8; header.size as usize];
    r.read_exact(&mut body)
        .map_err(|e| Error::new(ErrorKind::Connection, e))?;

    let text = String::from_utf8(body).map_err(|e| Error::new(ErrorKind::Client, e))?;
    Ok(parse_response(&text))
}

pub fn parse_response(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((k, v)) => {
                out.insert(k.to_owned(), v.to_owned());
            }
            None => {
                out.insert(line.to_owned(), String::new());
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_frame_shape() {
        let bytes = encode_request(&["node", "services"]);
        assert_eq!(&bytes[..PROTO_HEADER_LEN], &[2, 1, 0, 0, 0, 0, 0, 14]);
        assert_eq!(&bytes[PROTO_HEADER_LEN..], b"node\nservices\n");
    }

    #[test]
    fn parses_name_value_lines() {
        let parsed = parse_response("node\tBB9.abc\npartition-generation\t12\n");
        assert_eq!(parsed.get("node").map(String::as_str), Some("BB9.abc"));
        assert_eq!(
            parsed.get("partition-generation").map(String::as_str),
            Some("12")
        );
    }

    #[test]
    fn bare_name_maps_to_empty_value() {
        let parsed = parse_response("ok\n");
        assert_eq!(parsed.get("ok").map(String::as_str), Some(""));
    }
}
