//! FCast wire codec, opcodes and message types.
//!
//! FCast is a small binary protocol used by a sender (phone, browser) to
//! remote-control playback on a receiver over TCP.
//!
//! # Frame layout
//!
//! ```text
//! +---------------------+-----------+------------------------------+
//! | body length (4 LE)  |  opcode   |  JSON body (length - 1)      |
//! +---------------------+-----------+------------------------------+
//! ```
//!
//! The length covers the opcode byte and the body, so a frame without a
//! body declares a length of 1.
//!
//! # Example
//!
//! ```rust
//! use fcast_protocol::{Message, SeekMessage, decode_frame, encode_message};
//!
//! let bytes = encode_message(&Message::Seek(Some(SeekMessage::new(42.0)))).unwrap();
//! let decoded = decode_frame(&bytes[4..]).unwrap();
//! assert_eq!(decoded, Message::Seek(Some(SeekMessage::new(42.0))));
//! ```

mod codec;
mod error;
mod opcode;
mod types;

pub use codec::{
    FrameReader, FrameWriter, check_frame_length, decode_frame, encode_frame, encode_message,
};
pub use error::{ProtocolError, ProtocolResult};
pub use opcode::Opcode;
pub use types::{
    Message, PlayMessage, PlaybackErrorMessage, PlaybackState, PlaybackUpdateMessage,
    SeekMessage, SetSpeedMessage, SetVolumeMessage, VersionMessage, VolumeUpdateMessage,
    generation_time_now,
};

/// Protocol version announced in `Version` replies.
pub const PROTOCOL_VERSION: u64 = 1;

/// Maximum declared frame length (opcode + body) in bytes.
pub const MAXIMUM_PACKET_LENGTH: u32 = 32000;

/// Size of the little-endian length prefix.
pub const LENGTH_BYTES: usize = 4;

/// TCP port receivers listen on.
pub const DEFAULT_PORT: u16 = 46899;
