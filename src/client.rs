//! TCP client driving a single bridge session.
//!
//! Connects, performs the handshake, sends the hello payload, then sits in a
//! read loop answering pings until interrupted.

use crate::config::Config;
use crate::protocol::frame::{self, ParseResult};
use crate::protocol::{AckStatus, Frame, HelloResponse, MessageType};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Wire form of a ping request frame (empty payload, type 7).
const PING_REQUEST: [u8; 3] = [0x00, 0x00, 0x07];

/// What happened during a session that ended normally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub ack: Option<AckStatus>,
    pub payload_sent: bool,
    pub frames_received: u64,
    pub pings_answered: u64,
    pub idle_cycles: u64,
}

/// Fatal session errors
#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    ConnectTimeout(String),
    AckTimeout,
    ConnectionClosed,
    HandshakeRejected(AckStatus),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
            ClientError::ConnectTimeout(target) => {
                write!(f, "Timed out connecting to {}", target)
            }
            ClientError::AckTimeout => {
                write!(f, "Timed out waiting for handshake acknowledgment")
            }
            ClientError::ConnectionClosed => write!(f, "Connection closed by bridge"),
            ClientError::HandshakeRejected(status) => {
                write!(f, "Handshake not acknowledged: {:?}", status)
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

/// Client instance
pub struct Client {
    config: Config,
}

impl Client {
    /// Create a new client instance
    pub fn new(config: Config) -> Self {
        Client { config }
    }

    /// Connect to the bridge and run a session until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<SessionReport, ClientError>
    where
        F: Future<Output = ()>,
    {
        let target = &self.config.target;
        let connect = TcpStream::connect(target.as_str());
        let stream = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| ClientError::ConnectTimeout(target.clone()))??;
        stream.set_nodelay(true)?;
        info!(bridge = %target, "Connected to bridge");

        self.run_on(stream, shutdown).await
    }

    /// Run a session over an already open stream.
    pub async fn run_on<S, F>(
        &self,
        mut stream: S,
        shutdown: F,
    ) -> Result<SessionReport, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut report = SessionReport::default();

        let ack = self.handshake(&mut stream).await?;
        report.ack = Some(ack.clone());

        if ack.is_accepted() {
            tokio::time::sleep(self.config.ack_delay).await;
            stream.write_all(&self.config.payload).await?;
            report.payload_sent = true;
            debug!(payload = %hex::encode(&self.config.payload), "Sent hello payload");
        } else if self.config.exit_on_reject {
            return Err(ClientError::HandshakeRejected(ack));
        } else {
            warn!(?ack, "Handshake not acknowledged, skipping hello payload");
        }

        let result = self.monitor(&mut stream, shutdown, &mut report).await;

        if result.is_ok() {
            // Peer may already be gone; the session result stands either way.
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Shutdown after session failed");
            }
            info!(
                frames = report.frames_received,
                pings = report.pings_answered,
                idle = report.idle_cycles,
                "Session finished"
            );
        }

        result.map(|_| report)
    }

    /// Send the handshake line and classify the first reply.
    async fn handshake<S>(&self, stream: &mut S) -> Result<AckStatus, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let line = self.config.handshake.to_bytes();
        stream.write_all(&line).await?;
        debug!(line = %self.config.handshake.to_string().trim_end(), "Sent handshake");

        let mut reply = vec![0u8; self.config.read_buffer_size];
        let n = tokio::time::timeout(self.config.read_timeout, stream.read(&mut reply))
            .await
            .map_err(|_| ClientError::AckTimeout)??;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        let reply = &reply[..n];
        info!(reply = %String::from_utf8_lossy(reply), "Handshake reply");
        Ok(AckStatus::classify(reply))
    }

    /// Read loop: report every chunk, answer pings, retry on timeout.
    async fn monitor<S, F>(
        &self,
        stream: &mut S,
        shutdown: F,
        report: &mut SessionReport,
    ) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut scratch = vec![0u8; self.config.read_buffer_size];
        let mut buffer = BytesMut::with_capacity(self.config.read_buffer_size);

        loop {
            let read = tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupted, leaving read loop");
                    return Ok(());
                }
                read = tokio::time::timeout(
                    self.config.read_timeout,
                    stream.read(&mut scratch),
                ) => read,
            };

            let n = match read {
                Ok(result) => result?,
                Err(_) => {
                    report.idle_cycles += 1;
                    trace!("No data yet");
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Interrupted, leaving read loop");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                    continue;
                }
            };

            if n == 0 {
                return Err(ClientError::ConnectionClosed);
            }

            info!(bytes = %hex::encode(&scratch[..n]), "Received");

            let mut replies = BytesMut::new();
            ingest_chunk(&mut buffer, &scratch[..n], &mut replies, report);
            if !replies.is_empty() {
                stream.write_all(&replies).await?;
                stream.flush().await?;
            }
        }
    }
}

/// Append one read chunk to `buffer` and decode what is complete.
///
/// A chunk that is exactly a ping request is always answered: any partial
/// frame left over from earlier reads is dropped first, so it cannot swallow
/// the ping as payload.
fn ingest_chunk(
    buffer: &mut BytesMut,
    chunk: &[u8],
    out: &mut BytesMut,
    report: &mut SessionReport,
) {
    if !buffer.is_empty() && chunk == &PING_REQUEST[..] {
        warn!(
            discarded = %hex::encode(&buffer[..]),
            "Dropping partial frame ahead of ping request"
        );
        buffer.clear();
    }
    buffer.extend_from_slice(chunk);
    process_frames(buffer, out, report);
}

/// Decode every complete frame in `buffer`, queueing replies into `out`.
///
/// Undecodable input is discarded so the next chunk starts clean.
fn process_frames(buffer: &mut BytesMut, out: &mut BytesMut, report: &mut SessionReport) {
    loop {
        match frame::parse(buffer) {
            ParseResult::Complete(decoded, consumed) => {
                buffer.advance(consumed);
                report.frames_received += 1;
                if handle_frame(&decoded, out) {
                    report.pings_answered += 1;
                }
            }
            ParseResult::Incomplete => break,
            ParseResult::Error(e) => {
                warn!(error = %e, discarded = buffer.len(), "Undecodable data");
                buffer.clear();
                break;
            }
        }
    }
}

/// Handle one frame. Returns true if it was a ping that got answered.
fn handle_frame(frame: &Frame, out: &mut BytesMut) -> bool {
    match frame.message_type {
        MessageType::PingRequest => {
            out.extend_from_slice(&Frame::empty(MessageType::PingResponse).encode());
            debug!("Ping request, answering");
            true
        }
        MessageType::HelloResponse => {
            match HelloResponse::decode(&frame.payload) {
                Ok(hello) => info!(
                    server_info = %hello.server_info,
                    name = %hello.name,
                    api_major = hello.api_version_major,
                    api_minor = hello.api_version_minor,
                    "Hello response"
                ),
                Err(e) => warn!(error = %e, "Malformed hello response"),
            }
            false
        }
        other => {
            debug!(message_type = ?other, len = frame.payload.len(), "Frame");
            false
        }
    }
}
