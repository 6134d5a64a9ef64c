//! Protocol error types.

use thiserror::Error;

use crate::Opcode;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared or encoded frame exceeds the maximum length.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: u32 },

    /// Frame declared a length of zero, so it has no opcode byte.
    #[error("empty frame")]
    EmptyFrame,

    /// Opcode byte is not part of the protocol.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    /// JSON body does not match the shape expected for the opcode.
    #[error("malformed {opcode} payload: {source}")]
    MalformedPayload {
        opcode: Opcode,
        source: serde_json::Error,
    },

    /// Failed to serialize a message body to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
