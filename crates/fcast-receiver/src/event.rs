//! Events surfaced by a session to its handlers.

use std::fmt;
use std::str::FromStr;

use fcast_protocol::Opcode;

/// Sender commands a session emits to registered handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Play,
    Pause,
    Resume,
    Stop,
    Seek,
    SetVolume,
    SetSpeed,
}

impl Event {
    /// All events, in opcode order.
    pub const ALL: [Event; 7] = [
        Event::Play,
        Event::Pause,
        Event::Resume,
        Event::Stop,
        Event::Seek,
        Event::SetVolume,
        Event::SetSpeed,
    ];

    /// Maps an opcode to the event it raises, if any.
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Play => Some(Self::Play),
            Opcode::Pause => Some(Self::Pause),
            Opcode::Resume => Some(Self::Resume),
            Opcode::Stop => Some(Self::Stop),
            Opcode::Seek => Some(Self::Seek),
            Opcode::SetVolume => Some(Self::SetVolume),
            Opcode::SetSpeed => Some(Self::SetSpeed),
            _ => None,
        }
    }

    /// Returns the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Seek => "seek",
            Self::SetVolume => "set_volume",
            Self::SetSpeed => "set_speed",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for Event {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Event::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
