//! Plaintext API frame codec.
//!
//! Every message after the handshake travels in a frame:
//!
//! ```text
//! 0x00 | varint payload length | varint message type | payload
//! ```
//!
//! A ping is therefore the three bytes `00 00 07` and its answer `00 00 08`.
//! Frames starting with `0x01` belong to the noise-encrypted transport, which
//! the bridge never uses toward this client.

use super::varint::{self, VarintResult};
use bytes::{Bytes, BytesMut};

/// First byte of every plaintext frame.
pub const PLAINTEXT_PREAMBLE: u8 = 0x00;

/// First byte of a noise-encrypted frame.
pub const ENCRYPTED_PREAMBLE: u8 = 0x01;

/// Largest payload accepted from the peer.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// API message types carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HelloRequest,
    HelloResponse,
    ConnectRequest,
    ConnectResponse,
    DisconnectRequest,
    DisconnectResponse,
    PingRequest,
    PingResponse,
    Other(u32),
}

impl MessageType {
    pub fn id(self) -> u32 {
        match self {
            MessageType::HelloRequest => 1,
            MessageType::HelloResponse => 2,
            MessageType::ConnectRequest => 3,
            MessageType::ConnectResponse => 4,
            MessageType::DisconnectRequest => 5,
            MessageType::DisconnectResponse => 6,
            MessageType::PingRequest => 7,
            MessageType::PingResponse => 8,
            MessageType::Other(id) => id,
        }
    }
}

impl From<u32> for MessageType {
    fn from(id: u32) -> Self {
        match id {
            1 => MessageType::HelloRequest,
            2 => MessageType::HelloResponse,
            3 => MessageType::ConnectRequest,
            4 => MessageType::ConnectResponse,
            5 => MessageType::DisconnectRequest,
            6 => MessageType::DisconnectResponse,
            7 => MessageType::PingRequest,
            8 => MessageType::PingResponse,
            other => MessageType::Other(other),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }

    /// A frame with no payload.
    pub fn empty(message_type: MessageType) -> Self {
        Self::new(message_type, Bytes::new())
    }

    /// Serialize the frame into wire bytes.
    pub fn encode(&self) -> BytesMut {
        let length = self.payload.len() as u64;
        let kind = u64::from(self.message_type.id());
        let mut out = BytesMut::with_capacity(
            1 + varint::encoded_len(length) + varint::encoded_len(kind) + self.payload.len(),
        );
        out.extend_from_slice(&[PLAINTEXT_PREAMBLE]);
        varint::encode(length, &mut out);
        varint::encode(kind, &mut out);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// First byte is neither plaintext nor encrypted preamble.
    InvalidPreamble(u8),
    /// Peer switched to the encrypted transport.
    Encrypted,
    /// Header varint does not fit.
    VarintOverflow,
    /// Declared payload length exceeds `MAX_PAYLOAD_LEN`.
    PayloadTooLarge(u64),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::InvalidPreamble(b) => write!(f, "Invalid frame preamble: 0x{:02x}", b),
            FrameError::Encrypted => write!(f, "Encrypted frames are not supported"),
            FrameError::VarintOverflow => write!(f, "Frame header varint overflow"),
            FrameError::PayloadTooLarge(len) => write!(f, "Frame payload too large: {}", len),
        }
    }
}

impl std::error::Error for FrameError {}

/// Result of parsing a frame
#[derive(Debug)]
pub enum ParseResult {
    /// Decoded frame and bytes consumed.
    Complete(Frame, usize),
    /// Need more data.
    Incomplete,
    /// Stream is not decodable at this position.
    Error(FrameError),
}

/// Parse one frame from the front of `input`.
pub fn parse(input: &[u8]) -> ParseResult {
    let Some(&preamble) = input.first() else {
        return ParseResult::Incomplete;
    };
    match preamble {
        PLAINTEXT_PREAMBLE => {}
        ENCRYPTED_PREAMBLE => return ParseResult::Error(FrameError::Encrypted),
        other => return ParseResult::Error(FrameError::InvalidPreamble(other)),
    }

    let mut pos = 1;

    let length = match varint::decode(&input[pos..]) {
        VarintResult::Value(v, n) => {
            pos += n;
            v
        }
        VarintResult::Incomplete => return ParseResult::Incomplete,
        VarintResult::Overflow => return ParseResult::Error(FrameError::VarintOverflow),
    };
    if length > MAX_PAYLOAD_LEN as u64 {
        return ParseResult::Error(FrameError::PayloadTooLarge(length));
    }

    let kind = match varint::decode(&input[pos..]) {
        VarintResult::Value(v, n) => {
            pos += n;
            v
        }
        VarintResult::Incomplete => return ParseResult::Incomplete,
        VarintResult::Overflow => return ParseResult::Error(FrameError::VarintOverflow),
    };
    let Ok(kind) = u32::try_from(kind) else {
        return ParseResult::Error(FrameError::VarintOverflow);
    };

    let end = pos + length as usize;
    if input.len() < end {
        return ParseResult::Incomplete;
    }

    let frame = Frame::new(
        MessageType::from(kind),
        Bytes::copy_from_slice(&input[pos..end]),
    );
    ParseResult::Complete(frame, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ping_request() {
        match parse(&[0x00, 0x00, 0x07]) {
            ParseResult::Complete(frame, 3) => {
                assert_eq!(frame.message_type, MessageType::PingRequest);
                assert!(frame.payload.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_ping_response_bytes() {
        let frame = Frame::empty(MessageType::PingResponse);
        assert_eq!(&frame.encode()[..], &[0x00, 0x00, 0x08]);
    }

    #[test]
    fn test_encode_with_payload() {
        let frame = Frame::new(MessageType::Other(300), &b"abc"[..]);
        assert_eq!(
            &frame.encode()[..],
            &[0x00, 0x03, 0xAC, 0x02, b'a', b'b', b'c']
        );
    }

    #[test]
    fn test_parse_hello_request_payload() {
        let wire = hex::decode("0013010a0d61696f657370686f6d6561706910011807").unwrap();
        match parse(&wire) {
            ParseResult::Complete(frame, consumed) => {
                assert_eq!(consumed, wire.len());
                assert_eq!(frame.message_type, MessageType::HelloRequest);
                assert_eq!(frame.payload.len(), 0x13);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_leaves_following_frame() {
        let wire = [0x00, 0x00, 0x07, 0x00, 0x00, 0x07];
        match parse(&wire) {
            ParseResult::Complete(_, 3) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete() {
        assert!(matches!(parse(&[]), ParseResult::Incomplete));
        assert!(matches!(parse(&[0x00]), ParseResult::Incomplete));
        assert!(matches!(parse(&[0x00, 0x02]), ParseResult::Incomplete));
        assert!(matches!(parse(&[0x00, 0x02, 0x01, 0xAA]), ParseResult::Incomplete));
    }

    #[test]
    fn test_invalid_preamble() {
        match parse(b"!!OK!") {
            ParseResult::Error(FrameError::InvalidPreamble(b'!')) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_encrypted_preamble() {
        assert!(matches!(
            parse(&[0x01, 0x00, 0x07]),
            ParseResult::Error(FrameError::Encrypted)
        ));
    }

    #[test]
    fn test_payload_too_large() {
        let mut wire = BytesMut::new();
        wire.extend_from_slice(&[0x00]);
        varint::encode(MAX_PAYLOAD_LEN as u64 + 1, &mut wire);
        assert!(matches!(
            parse(&wire),
            ParseResult::Error(FrameError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_message_type_ids() {
        assert_eq!(MessageType::from(7), MessageType::PingRequest);
        assert_eq!(MessageType::PingResponse.id(), 8);
        assert_eq!(MessageType::from(42), MessageType::Other(42));
    }
}
