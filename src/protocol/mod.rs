//! Wire protocol spoken with the meshmesh API bridge.
//!
//! A session has two phases:
//! - `handshake`: a single text line (`INIT|<node>|<port>\n`) answered by a
//!   5-byte token (`!!OK!` or `!!KO!`)
//! - `frame`: after the handshake the stream carries plaintext API frames,
//!   each `0x00 <varint length> <varint type> <payload>`
//!
//! `message` encodes and decodes the few protobuf payloads the client cares
//! about, and `varint` holds the base-128 integer codec shared by both.

pub mod frame;
pub mod handshake;
pub mod message;
pub mod varint;

pub use frame::{Frame, MessageType};
pub use handshake::{AckStatus, HandshakeLine};
pub use message::{HelloRequest, HelloResponse};
