//! Error types for Skiff

use std::fmt;

/// Unified error type for all Skiff operations
#[derive(Debug)]
pub enum SkiffError {
    /// I/O error on the underlying transport, including unexpected close
    /// and timed-out reads or writes
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Malformed or out-of-sequence protocol data
    Protocol(String),

    /// A decoded packet's type does not match what the current protocol
    /// state expects
    UnexpectedPacket {
        /// The packet type that arrived
        packet_type: u8,
        /// What the current state was waiting for
        expected: &'static str,
    },

    /// Checksum mismatch on a decoded packet
    Integrity(String),

    /// No overlap between the preferred ciphers and the ciphers the server
    /// advertises
    NoSupportedCipher,

    /// The server rejected the supplied password
    AuthenticationFailed,

    /// The server ended the session, with its description of why
    Disconnected(String),

    /// Operation attempted on a closed channel stream
    StreamClosed,
}

impl fmt::Display for SkiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkiffError::Io(e) => write!(f, "IO error: {}", e),
            SkiffError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SkiffError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            SkiffError::UnexpectedPacket {
                packet_type,
                expected,
            } => write!(
                f,
                "Unexpected packet type {} (expected {})",
                packet_type, expected
            ),
            SkiffError::Integrity(msg) => write!(f, "Integrity error: {}", msg),
            SkiffError::NoSupportedCipher => {
                write!(f, "No supported cipher advertised by the server")
            }
            SkiffError::AuthenticationFailed => write!(f, "Authentication failed"),
            SkiffError::Disconnected(description) => {
                write!(f, "Server disconnected: {}", description)
            }
            SkiffError::StreamClosed => write!(f, "Stream is closed"),
        }
    }
}

impl std::error::Error for SkiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SkiffError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SkiffError {
    fn from(err: std::io::Error) -> Self {
        SkiffError::Io(err)
    }
}

/// Result type for Skiff operations
pub type SkiffResult<T> = Result<T, SkiffError>;
