//! Protobuf payloads for the hello exchange.
//!
//! Only the two messages the probe touches are modelled. Fields holding
//! their default value are omitted on encode, as proto3 does.

use super::frame::{Frame, MessageType};
use super::varint::{self, VarintResult};
use bytes::{BufMut, Bytes, BytesMut};

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

/// Client identification sent right after the bridge acknowledges the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloRequest {
    pub client_info: String,
    pub api_version_major: u32,
    pub api_version_minor: u32,
}

impl HelloRequest {
    /// Protobuf-encoded message body.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.client_info.len() + 8);
        if !self.client_info.is_empty() {
            put_key(1, WIRE_LEN, &mut out);
            varint::encode(self.client_info.len() as u64, &mut out);
            out.put_slice(self.client_info.as_bytes());
        }
        if self.api_version_major != 0 {
            put_key(2, WIRE_VARINT, &mut out);
            varint::encode(u64::from(self.api_version_major), &mut out);
        }
        if self.api_version_minor != 0 {
            put_key(3, WIRE_VARINT, &mut out);
            varint::encode(u64::from(self.api_version_minor), &mut out);
        }
        out.freeze()
    }

    /// The message wrapped in a plaintext frame, ready for the wire.
    pub fn to_frame(&self) -> Frame {
        Frame::new(MessageType::HelloRequest, self.encode())
    }
}

/// Server identification, decoded for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloResponse {
    pub api_version_major: u32,
    pub api_version_minor: u32,
    pub server_info: String,
    pub name: String,
}

impl HelloResponse {
    pub fn decode(mut input: &[u8]) -> Result<Self, DecodeError> {
        let mut msg = HelloResponse::default();

        while !input.is_empty() {
            let key = read_varint(&mut input)?;
            let field = key >> 3;
            let wire = key & 0x7;

            match (field, wire) {
                (1, WIRE_VARINT) => msg.api_version_major = read_u32(&mut input)?,
                (2, WIRE_VARINT) => msg.api_version_minor = read_u32(&mut input)?,
                (3, WIRE_LEN) => msg.server_info = read_string(&mut input)?,
                (4, WIRE_LEN) => msg.name = read_string(&mut input)?,
                (_, wire) => skip_field(wire, &mut input)?,
            }
        }

        Ok(msg)
    }
}

/// Protobuf decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    VarintOverflow,
    InvalidUtf8,
    UnsupportedWireType(u64),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "Message truncated"),
            DecodeError::VarintOverflow => write!(f, "Varint overflow"),
            DecodeError::InvalidUtf8 => write!(f, "String field is not valid UTF-8"),
            DecodeError::UnsupportedWireType(w) => write!(f, "Unsupported wire type: {}", w),
        }
    }
}

impl std::error::Error for DecodeError {}

fn put_key(field: u64, wire: u64, out: &mut BytesMut) {
    varint::encode((field << 3) | wire, out);
}

fn read_varint(input: &mut &[u8]) -> Result<u64, DecodeError> {
    let data: &[u8] = *input;
    match varint::decode(data) {
        VarintResult::Value(v, n) => {
            *input = &data[n..];
            Ok(v)
        }
        VarintResult::Incomplete => Err(DecodeError::Truncated),
        VarintResult::Overflow => Err(DecodeError::VarintOverflow),
    }
}

fn read_u32(input: &mut &[u8]) -> Result<u32, DecodeError> {
    u32::try_from(read_varint(input)?).map_err(|_| DecodeError::VarintOverflow)
}

fn read_bytes<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = read_varint(input)? as usize;
    if input.len() < len {
        return Err(DecodeError::Truncated);
    }
    let data: &'a [u8] = *input;
    let (head, tail) = data.split_at(len);
    *input = tail;
    Ok(head)
}

fn read_string(input: &mut &[u8]) -> Result<String, DecodeError> {
    let raw = read_bytes(input)?;
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

fn skip_field(wire: u64, input: &mut &[u8]) -> Result<(), DecodeError> {
    let width = match wire {
        WIRE_VARINT => {
            read_varint(input)?;
            return Ok(());
        }
        WIRE_LEN => {
            read_bytes(input)?;
            return Ok(());
        }
        WIRE_FIXED64 => 8,
        WIRE_FIXED32 => 4,
        other => return Err(DecodeError::UnsupportedWireType(other)),
    };
    if input.len() < width {
        return Err(DecodeError::Truncated);
    }
    let data: &[u8] = *input;
    *input = &data[width..];
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_hello() -> HelloRequest {
        HelloRequest {
            client_info: "aioesphomeapi".to_string(),
            api_version_major: 1,
            api_version_minor: 7,
        }
    }

    #[test]
    fn test_hello_request_body() {
        let body = probe_hello().encode();
        assert_eq!(hex::encode(&body), "0a0d61696f657370686f6d6561706910011807");
    }

    #[test]
    fn test_hello_request_frame_matches_wire_constant() {
        let wire = probe_hello().to_frame().encode();
        assert_eq!(
            hex::encode(&wire),
            "0013010a0d61696f657370686f6d6561706910011807"
        );
    }

    #[test]
    fn test_hello_request_omits_defaults() {
        let hello = HelloRequest {
            client_info: String::new(),
            api_version_major: 1,
            api_version_minor: 0,
        };
        assert_eq!(&hello.encode()[..], &[0x10, 0x01]);
    }

    #[test]
    fn test_decode_hello_response() {
        let mut body = BytesMut::new();
        put_key(1, WIRE_VARINT, &mut body);
        varint::encode(1, &mut body);
        put_key(2, WIRE_VARINT, &mut body);
        varint::encode(10, &mut body);
        put_key(3, WIRE_LEN, &mut body);
        varint::encode(8, &mut body);
        body.put_slice(b"meshmesh");
        put_key(4, WIRE_LEN, &mut body);
        varint::encode(4, &mut body);
        body.put_slice(b"node");

        let msg = HelloResponse::decode(&body).unwrap();
        assert_eq!(msg.api_version_major, 1);
        assert_eq!(msg.api_version_minor, 10);
        assert_eq!(msg.server_info, "meshmesh");
        assert_eq!(msg.name, "node");
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        let mut body = BytesMut::new();
        put_key(9, WIRE_FIXED32, &mut body);
        body.put_u32_le(0xDEADBEEF);
        put_key(10, WIRE_LEN, &mut body);
        varint::encode(2, &mut body);
        body.put_slice(b"xx");
        put_key(1, WIRE_VARINT, &mut body);
        varint::encode(1, &mut body);

        let msg = HelloResponse::decode(&body).unwrap();
        assert_eq!(msg.api_version_major, 1);
        assert!(msg.server_info.is_empty());
    }

    #[test]
    fn test_decode_version_out_of_range() {
        let mut body = BytesMut::new();
        put_key(1, WIRE_VARINT, &mut body);
        varint::encode(u64::from(u32::MAX) + 1, &mut body);
        assert_eq!(HelloResponse::decode(&body), Err(DecodeError::VarintOverflow));
    }

    #[test]
    fn test_decode_truncated_string() {
        let body = [0x1A, 0x05, b'a', b'b'];
        assert_eq!(HelloResponse::decode(&body), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_decode_unsupported_wire_type() {
        let body = [0x0B];
        assert_eq!(
            HelloResponse::decode(&body),
            Err(DecodeError::UnsupportedWireType(3))
        );
    }
}
