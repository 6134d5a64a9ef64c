//! Receiver error types.

use std::io;
use std::net::SocketAddr;

use fcast_protocol::{MAXIMUM_PACKET_LENGTH, Opcode, ProtocolError};
use thiserror::Error;

/// Result type for receiver operations.
pub type ReceiverResult<T> = Result<T, ReceiverError>;

/// Result type for session processing.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur in the receiver.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A session ended on an unrecoverable fault.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Could not bind a listening socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ReceiverError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bind error.
    pub fn bind(addr: SocketAddr, source: io::Error) -> Self {
        Self::Bind { addr, source }
    }
}

/// Faults that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Declared frame length is zero or above the maximum.
    #[error("invalid frame length {length} (max: {max})", max = MAXIMUM_PACKET_LENGTH)]
    FramingViolation { length: u32 },

    /// Opcode is not handled by the dispatcher.
    #[error("unhandled opcode {0}")]
    UnknownOpcode(u8),

    /// Body could not be parsed for the opcode.
    #[error("malformed {opcode} payload: {source}")]
    MalformedPayload {
        opcode: Opcode,
        source: serde_json::Error,
    },

    /// Bytes were fed to a session that already ended.
    #[error("session is disconnected")]
    Disconnected,

    /// Any other protocol failure.
    #[error(transparent)]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for SessionError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::UnknownOpcode(code) => Self::UnknownOpcode(code),
            ProtocolError::MalformedPayload { opcode, source } => {
                Self::MalformedPayload { opcode, source }
            }
            other => Self::Protocol(other),
        }
    }
}
