//! Bridge handshake: one text line out, one 5-byte token back.
//!
//! ```text
//! Client:  INIT|0.28.139.56|6053\n
//! Bridge:  !!OK!   (path to the node opened)
//!          !!KO!   (bad line, or the node could not be reached)
//! ```

use std::fmt;

/// Token the bridge sends once the node connection is open.
pub const ACK_OK: &[u8] = b"!!OK!";

/// Token the bridge sends when it refuses the handshake.
pub const ACK_KO: &[u8] = b"!!KO!";

const COMMAND: &str = "INIT";

/// Handshake line naming the mesh node and port to reach through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub node: String,
    pub port: u16,
}

impl HandshakeLine {
    pub fn new(node: impl Into<String>, port: u16) -> Self {
        Self {
            node: node.into(),
            port,
        }
    }

    /// Wire form, including the trailing newline.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a line as the bridge does: three `|`-separated fields, trimmed.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let fields: Vec<&str> = line.trim().split('|').map(str::trim).collect();

        let [command, node, port] = fields.as_slice() else {
            return Err(HandshakeError::FieldCount(fields.len()));
        };
        if *command != COMMAND {
            return Err(HandshakeError::UnknownCommand(command.to_string()));
        }
        if node.is_empty() {
            return Err(HandshakeError::MissingNode);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| HandshakeError::InvalidPort(port.to_string()))?;

        Ok(Self::new(*node, port))
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}|{}|{}", COMMAND, self.node, self.port)
    }
}

/// Handshake line parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    FieldCount(usize),
    UnknownCommand(String),
    MissingNode,
    InvalidPort(String),
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::FieldCount(n) => write!(f, "Expected 3 fields, got {}", n),
            HandshakeError::UnknownCommand(cmd) => write!(f, "Unknown command: {}", cmd),
            HandshakeError::MissingNode => write!(f, "Missing node address"),
            HandshakeError::InvalidPort(port) => write!(f, "Invalid port: {}", port),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// How the bridge answered the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    /// Exactly `!!OK!`.
    Accepted,
    /// Exactly `!!KO!`.
    Rejected,
    /// Anything else, kept for diagnostics.
    Unexpected(Vec<u8>),
}

impl AckStatus {
    /// Classify a reply by exact byte equality.
    pub fn classify(reply: &[u8]) -> Self {
        if reply == ACK_OK {
            AckStatus::Accepted
        } else if reply == ACK_KO {
            AckStatus::Rejected
        } else {
            AckStatus::Unexpected(reply.to_vec())
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AckStatus::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_line_bytes() {
        let line = HandshakeLine::new("0.28.139.56", 6053);
        assert_eq!(line.to_bytes(), b"INIT|0.28.139.56|6053\n");
    }

    #[test]
    fn test_parse_line() {
        let line = HandshakeLine::parse("INIT|0.28.139.56|6053\n").unwrap();
        assert_eq!(line.node, "0.28.139.56");
        assert_eq!(line.port, 6053);
    }

    #[test]
    fn test_parse_trims_fields() {
        let line = HandshakeLine::parse("  INIT | 10.0.0.1 | 80 \r\n").unwrap();
        assert_eq!(line, HandshakeLine::new("10.0.0.1", 80));
    }

    #[test]
    fn test_parse_field_count() {
        assert_eq!(
            HandshakeLine::parse("INIT|0.28.139.56"),
            Err(HandshakeError::FieldCount(2))
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            HandshakeLine::parse("OPEN|1.2.3.4|1"),
            Err(HandshakeError::UnknownCommand("OPEN".to_string()))
        );
    }

    #[test]
    fn test_parse_invalid_port() {
        assert_eq!(
            HandshakeLine::parse("INIT|1.2.3.4|99999"),
            Err(HandshakeError::InvalidPort("99999".to_string()))
        );
        assert_eq!(
            HandshakeLine::parse("INIT||6053"),
            Err(HandshakeError::MissingNode)
        );
    }

    #[test]
    fn test_classify_ack() {
        assert_eq!(AckStatus::classify(b"!!OK!"), AckStatus::Accepted);
        assert_eq!(AckStatus::classify(b"!!KO!"), AckStatus::Rejected);
        assert_eq!(
            AckStatus::classify(b"!!OK!\n"),
            AckStatus::Unexpected(b"!!OK!\n".to_vec())
        );
        assert!(!AckStatus::classify(b"").is_accepted());
    }
}
