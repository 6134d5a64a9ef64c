//! Length-prefixed frame encoding and decoding.
//!
//! Every frame is a 4-byte little-endian length followed by the opcode byte
//! and an optional UTF-8 JSON body:
//!
//! ```text
//! +----------------+--------+-------------------+
//! | length (4 LE)  | opcode |  JSON (length-1)  |
//! +----------------+--------+-------------------+
//! ```

use std::io::{Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Message;
use crate::{LENGTH_BYTES, MAXIMUM_PACKET_LENGTH, Opcode};

/// Validates a declared frame length and returns it as a buffer size.
///
/// A frame must hold at least the opcode byte and may not exceed
/// [`MAXIMUM_PACKET_LENGTH`].
pub fn check_frame_length(length: u32) -> ProtocolResult<usize> {
    if length > MAXIMUM_PACKET_LENGTH {
        return Err(ProtocolError::FrameTooLarge {
            size: length as usize,
            max: MAXIMUM_PACKET_LENGTH,
        });
    }
    if length == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    Ok(length as usize)
}

/// Encodes a frame for `opcode` with an optional JSON body.
///
/// # Example
///
/// ```rust
/// use fcast_protocol::{Opcode, SeekMessage, encode_frame};
///
/// let bytes = encode_frame(Opcode::Seek, Some(&SeekMessage::new(3.0))).unwrap();
/// assert_eq!(bytes[4], 5);
/// ```
pub fn encode_frame<T: Serialize>(opcode: Opcode, message: Option<&T>) -> ProtocolResult<Vec<u8>> {
    let body = message.map(serde_json::to_vec).transpose()?;
    let body = body.as_deref().unwrap_or_default();

    let length = body.len() + 1;
    if length > MAXIMUM_PACKET_LENGTH as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAXIMUM_PACKET_LENGTH,
        });
    }

    let mut buffer = Vec::with_capacity(LENGTH_BYTES + length);
    buffer.extend_from_slice(&(length as u32).to_le_bytes());
    buffer.push(opcode.as_u8());
    buffer.extend_from_slice(body);
    Ok(buffer)
}

/// Encodes a [`Message`] as a complete frame.
pub fn encode_message(message: &Message) -> ProtocolResult<Vec<u8>> {
    let opcode = message.opcode();
    match message {
        Message::Play(body) => encode_frame(opcode, body.as_ref()),
        Message::Seek(body) => encode_frame(opcode, body.as_ref()),
        Message::PlaybackUpdate(body) => encode_frame(opcode, body.as_ref()),
        Message::VolumeUpdate(body) => encode_frame(opcode, body.as_ref()),
        Message::SetVolume(body) => encode_frame(opcode, body.as_ref()),
        Message::PlaybackError(body) => encode_frame(opcode, body.as_ref()),
        Message::SetSpeed(body) => encode_frame(opcode, body.as_ref()),
        Message::Version(body) => encode_frame(opcode, body.as_ref()),
        Message::None
        | Message::Pause
        | Message::Resume
        | Message::Stop
        | Message::Ping
        | Message::Pong => encode_frame::<()>(opcode, None),
    }
}

/// Decodes the `[opcode || body]` part of a frame (without the length prefix).
///
/// Bodies of opcodes that carry no payload are ignored. Unknown JSON fields
/// are ignored and missing optional fields take their defaults.
pub fn decode_frame(frame: &[u8]) -> ProtocolResult<Message> {
    let (&code, body) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
    let opcode = Opcode::try_from(code)?;
    let body = (!body.is_empty()).then_some(body);

    Ok(match opcode {
        Opcode::None => Message::None,
        Opcode::Play => Message::Play(parse_body(opcode, body)?),
        Opcode::Pause => Message::Pause,
        Opcode::Resume => Message::Resume,
        Opcode::Stop => Message::Stop,
        Opcode::Seek => Message::Seek(parse_body(opcode, body)?),
        Opcode::PlaybackUpdate => Message::PlaybackUpdate(parse_body(opcode, body)?),
        Opcode::VolumeUpdate => Message::VolumeUpdate(parse_body(opcode, body)?),
        Opcode::SetVolume => Message::SetVolume(parse_body(opcode, body)?),
        Opcode::PlaybackError => Message::PlaybackError(parse_body(opcode, body)?),
        Opcode::SetSpeed => Message::SetSpeed(parse_body(opcode, body)?),
        Opcode::Version => Message::Version(parse_body(opcode, body)?),
        Opcode::Ping => Message::Ping,
        Opcode::Pong => Message::Pong,
    })
}

fn parse_body<T: DeserializeOwned>(opcode: Opcode, body: Option<&[u8]>) -> ProtocolResult<Option<T>> {
    body.map(|bytes| {
        serde_json::from_slice(bytes)
            .map_err(|source| ProtocolError::MalformedPayload { opcode, source })
    })
    .transpose()
}

/// Reads framed messages from a blocking byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads a single frame.
    ///
    /// Returns `Ok(None)` if the stream ends before a length prefix.
    pub fn read_frame(&mut self) -> ProtocolResult<Option<Message>> {
        let mut len_buf = [0u8; LENGTH_BYTES];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let length = check_frame_length(u32::from_le_bytes(len_buf))?;

        let mut frame = vec![0u8; length];
        self.reader.read_exact(&mut frame)?;

        decode_frame(&frame).map(Some)
    }
}

/// Writes framed messages to a blocking byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single message as one frame.
    pub fn write_message(&mut self, message: &Message) -> ProtocolResult<()> {
        let data = encode_message(message)?;
        self.writer.write_all(&data)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayMessage, PlaybackState, PlaybackUpdateMessage, SeekMessage, VersionMessage};
    use std::io::Cursor;

    #[test]
    fn empty_frame_has_length_one() {
        let bytes = encode_message(&Message::Ping).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 12]);
    }

    #[test]
    fn length_covers_opcode_and_body() {
        let bytes = encode_frame(Opcode::Seek, Some(&SeekMessage::new(10.0))).unwrap();
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - LENGTH_BYTES);
        assert_eq!(bytes[4], Opcode::Seek.as_u8());
        assert_eq!(&bytes[5..], br#"{"time":10.0}"#);
    }

    #[test]
    fn playback_update_roundtrip() {
        let update = PlaybackUpdateMessage::new(12.5, PlaybackState::Playing).with_speed(1.0);
        let bytes = encode_message(&Message::PlaybackUpdate(Some(update.clone()))).unwrap();

        let decoded = decode_frame(&bytes[LENGTH_BYTES..]).unwrap();
        let Message::PlaybackUpdate(Some(decoded)) = decoded else {
            panic!("unexpected message: {decoded:?}");
        };
        assert_eq!(decoded.time, 12.5);
        assert_eq!(decoded.state, PlaybackState::Playing);
        assert_eq!(decoded.speed, 1.0);
        assert_eq!(decoded.duration, None);
    }

    #[test]
    fn decode_payload_opcode_without_body() {
        assert_eq!(decode_frame(&[Opcode::Play.as_u8()]).unwrap(), Message::Play(None));
        assert_eq!(decode_frame(&[Opcode::Seek.as_u8()]).unwrap(), Message::Seek(None));
    }

    #[test]
    fn decode_ignores_body_of_empty_opcodes() {
        let mut frame = vec![Opcode::Pause.as_u8()];
        frame.extend_from_slice(b"not json");
        assert_eq!(decode_frame(&frame).unwrap(), Message::Pause);
    }

    #[test]
    fn decode_play_with_unknown_fields() {
        let mut frame = vec![Opcode::Play.as_u8()];
        frame.extend_from_slice(br#"{"container":"video/mp4","url":"http://h/v.mp4","extra":true}"#);
        assert_eq!(
            decode_frame(&frame).unwrap(),
            Message::Play(Some(PlayMessage::url("video/mp4", "http://h/v.mp4")))
        );
    }

    #[test]
    fn decode_malformed_payload() {
        let mut frame = vec![Opcode::Seek.as_u8()];
        frame.extend_from_slice(br#"{"time":"soon"}"#);
        let result = decode_frame(&frame);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedPayload {
                opcode: Opcode::Seek,
                ..
            })
        ));
    }

    #[test]
    fn decode_unknown_opcode() {
        let result = decode_frame(&[99]);
        assert!(matches!(result, Err(ProtocolError::UnknownOpcode(99))));
    }

    #[test]
    fn decode_empty_frame() {
        assert!(matches!(decode_frame(&[]), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn frame_length_limits() {
        assert_eq!(check_frame_length(1).unwrap(), 1);
        assert_eq!(check_frame_length(MAXIMUM_PACKET_LENGTH).unwrap(), 32000);
        assert!(matches!(
            check_frame_length(MAXIMUM_PACKET_LENGTH + 1),
            Err(ProtocolError::FrameTooLarge { size: 32001, .. })
        ));
        assert!(matches!(check_frame_length(0), Err(ProtocolError::EmptyFrame)));
    }

    #[test]
    fn encode_rejects_oversized_body() {
        let play = PlayMessage::content("application/dash+xml", "x".repeat(40_000));
        let result = encode_frame(Opcode::Play, Some(&play));
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn frame_reader_writer_roundtrip() {
        let messages = vec![
            Message::Version(Some(VersionMessage { version: 1 })),
            Message::Play(Some(PlayMessage::url("video/mp4", "http://h/v.mp4").with_time(5.0))),
            Message::Pause,
            Message::Seek(Some(SeekMessage::new(30.0))),
        ];

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for message in &messages {
                writer.write_message(message).unwrap();
            }
            writer.flush().unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in &messages {
            let actual = reader.read_frame().unwrap().unwrap();
            assert_eq!(&actual, expected);
        }

        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn frame_reader_rejects_oversized_length() {
        let data = (MAXIMUM_PACKET_LENGTH + 1).to_le_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        assert!(matches!(
            reader.read_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
