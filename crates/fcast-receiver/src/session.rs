//! Per-connection protocol session.
//!
//! A [`Session`] turns the raw bytes read from one TCP connection into
//! frames, decodes them and dispatches the resulting messages to the
//! handlers registered with [`Session::on`]. Reads may be chunked
//! arbitrarily: a single call to [`Session::process`] can complete several
//! frames, and a single frame can span many calls.
//!
//! Ping and Version frames are answered by the session itself and never
//! reach handlers.

use std::collections::HashMap;

use fcast_protocol::{
    LENGTH_BYTES, Message, PROTOCOL_VERSION, VersionMessage, check_frame_length, decode_frame,
};
use tracing::{debug, info, trace, warn};

use crate::error::{SessionError, SessionResult};
use crate::event::Event;
use crate::sender::SessionSender;

/// Callback invoked for an event. Receives the sender of the originating
/// client and the decoded message.
pub type Handler = Box<dyn Fn(&SessionSender, &Message) + Send>;

/// Parse state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Collecting the 4-byte length prefix.
    AwaitingLength,
    /// Collecting the opcode and body of a frame.
    AwaitingBody,
    /// Closed or faulted. Terminal.
    Disconnected,
}

/// Protocol state bound to one connection.
pub struct Session {
    sender: SessionSender,
    state: SessionState,
    length_buf: [u8; LENGTH_BYTES],
    length_read: usize,
    body: Vec<u8>,
    packet_length: usize,
    listeners: HashMap<Event, Vec<Handler>>,
}

impl Session {
    /// Creates a session writing through `sender`.
    pub fn new(sender: SessionSender) -> Self {
        Self {
            sender,
            state: SessionState::AwaitingLength,
            length_buf: [0; LENGTH_BYTES],
            length_read: 0,
            body: Vec::new(),
            packet_length: 0,
            listeners: HashMap::new(),
        }
    }

    /// Returns the current parse state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the sender for this session.
    pub fn sender(&self) -> &SessionSender {
        &self.sender
    }

    /// Registers a handler for `event`.
    ///
    /// Handlers run in registration order on the task driving
    /// [`process`](Self::process). Registering the same handler twice makes
    /// it run twice.
    pub fn on<F>(&mut self, event: Event, handler: F)
    where
        F: Fn(&SessionSender, &Message) + Send + 'static,
    {
        self.listeners
            .entry(event)
            .or_default()
            .push(Box::new(handler));
    }

    /// Returns the number of handlers registered for `event`.
    pub fn handler_count(&self, event: Event) -> usize {
        self.listeners.get(&event).map_or(0, Vec::len)
    }

    /// Closes the session. Safe to call more than once.
    pub fn close(&mut self) {
        self.state = SessionState::Disconnected;
        self.sender.close();
    }

    /// Feeds bytes read from the socket.
    ///
    /// Every frame completed by `bytes` is dispatched before this returns,
    /// in arrival order. On a fatal fault the session is closed and the
    /// error returned; the session must not be fed again afterwards.
    pub fn process(&mut self, bytes: &[u8]) -> SessionResult<()> {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            remaining = match self.state {
                SessionState::AwaitingLength => self.handle_length_bytes(remaining)?,
                SessionState::AwaitingBody => self.handle_body_bytes(remaining)?,
                SessionState::Disconnected => return Err(SessionError::Disconnected),
            };
        }
        Ok(())
    }

    fn handle_length_bytes<'a>(&mut self, bytes: &'a [u8]) -> SessionResult<&'a [u8]> {
        let wanted = (LENGTH_BYTES - self.length_read).min(bytes.len());
        let (head, rest) = bytes.split_at(wanted);
        self.length_buf[self.length_read..self.length_read + wanted].copy_from_slice(head);
        self.length_read += wanted;

        if self.length_read == LENGTH_BYTES {
            let declared = u32::from_le_bytes(self.length_buf);
            self.length_read = 0;

            match check_frame_length(declared) {
                Ok(length) => {
                    trace!(session = self.sender.id(), length, "Frame length received");
                    self.packet_length = length;
                    self.body.reserve(length);
                    self.state = SessionState::AwaitingBody;
                }
                Err(e) => {
                    warn!(session = self.sender.id(), error = %e, "Invalid frame length, closing session");
                    self.close();
                    return Err(SessionError::FramingViolation { length: declared });
                }
            }
        }

        Ok(rest)
    }

    fn handle_body_bytes<'a>(&mut self, bytes: &'a [u8]) -> SessionResult<&'a [u8]> {
        let wanted = (self.packet_length - self.body.len()).min(bytes.len());
        let (head, rest) = bytes.split_at(wanted);
        self.body.extend_from_slice(head);

        if self.body.len() == self.packet_length {
            let mut frame = std::mem::take(&mut self.body);
            self.packet_length = 0;
            self.state = SessionState::AwaitingLength;

            let result = self.handle_frame(&frame);
            frame.clear();
            self.body = frame;

            if let Err(e) = result {
                warn!(session = self.sender.id(), error = %e, "Fatal frame, closing session");
                self.close();
                return Err(e);
            }
        }

        Ok(rest)
    }

    fn handle_frame(&mut self, frame: &[u8]) -> SessionResult<()> {
        let message = decode_frame(frame)?;
        trace!(session = self.sender.id(), opcode = %message.opcode(), "Frame received");

        match &message {
            Message::Ping => {
                debug!(session = self.sender.id(), "Ping received, sending pong");
                self.reply(&Message::Pong);
            }
            Message::Version(version) => {
                match version {
                    Some(v) => info!(
                        session = self.sender.id(),
                        client_version = v.version,
                        version = PROTOCOL_VERSION,
                        "Client reported version"
                    ),
                    None => debug!(session = self.sender.id(), "Version request without body"),
                }
                self.reply(&Message::Version(Some(VersionMessage {
                    version: PROTOCOL_VERSION,
                })));
            }
            _ => {
                let event = Event::from_opcode(message.opcode())
                    .ok_or(SessionError::UnknownOpcode(message.opcode().as_u8()))?;
                self.emit(event, &message);
            }
        }

        Ok(())
    }

    fn emit(&self, event: Event, message: &Message) {
        let Some(handlers) = self.listeners.get(&event) else {
            trace!(session = self.sender.id(), %event, "No handlers registered");
            return;
        };
        for handler in handlers {
            handler(&self.sender, message);
        }
    }

    fn reply(&self, message: &Message) {
        if let Err(e) = self.sender.send(message) {
            warn!(session = self.sender.id(), error = %e, "Failed to encode reply");
        }
    }
}
