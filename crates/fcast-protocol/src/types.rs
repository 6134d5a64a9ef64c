//! Message bodies exchanged between senders and receivers.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::Opcode;

/// Playback state reported in [`PlaybackUpdateMessage`], encoded as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlaybackState {
    #[default]
    Idle = 0,
    Playing = 1,
    Paused = 2,
}

impl From<PlaybackState> for u8 {
    fn from(state: PlaybackState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for PlaybackState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Playing),
            2 => Ok(Self::Paused),
            other => Err(format!("invalid playback state: {other}")),
        }
    }
}

/// Returns the current time in milliseconds since the Unix epoch.
pub fn generation_time_now() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

fn default_speed() -> f64 {
    1.0
}

/// Treats an explicit `null` speed the same as a missing one.
fn speed_or_default<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_else(default_speed))
}

/// Request to start playing a URL or inline content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayMessage {
    /// MIME type of the media or manifest.
    pub container: String,
    /// Media URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline content (e.g. a DASH manifest) used when no URL is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Start position in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Initial playback speed.
    #[serde(default = "default_speed", deserialize_with = "speed_or_default")]
    pub speed: f64,
    /// Extra HTTP headers to use when fetching the media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl PlayMessage {
    /// Creates a play request for a URL.
    pub fn url(container: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            url: Some(url.into()),
            content: None,
            time: None,
            speed: default_speed(),
            headers: None,
        }
    }

    /// Creates a play request for inline content.
    pub fn content(container: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            url: None,
            content: Some(content.into()),
            time: None,
            speed: default_speed(),
            headers: None,
        }
    }

    /// Builder: set start time.
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// Builder: set playback speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}

/// Request to seek to an absolute position in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekMessage {
    pub time: f64,
}

impl SeekMessage {
    pub fn new(time: f64) -> Self {
        Self { time }
    }
}

/// Playback telemetry sent from the receiver to senders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackUpdateMessage {
    /// Current position in seconds.
    pub time: f64,
    /// Media duration in seconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub state: PlaybackState,
    #[serde(default = "default_speed", deserialize_with = "speed_or_default")]
    pub speed: f64,
    /// Milliseconds since the Unix epoch at which the update was produced.
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
}

impl PlaybackUpdateMessage {
    /// Creates an update stamped with the current time.
    pub fn new(time: f64, state: PlaybackState) -> Self {
        Self {
            time,
            duration: None,
            state,
            speed: default_speed(),
            generation_time: generation_time_now(),
        }
    }

    /// Creates the update sent when nothing is playing.
    pub fn idle() -> Self {
        Self::new(0.0, PlaybackState::Idle)
    }

    /// Builder: set playback speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Builder: set media duration.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

/// Volume telemetry sent from the receiver to senders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeUpdateMessage {
    /// Volume in the range 0.0 - 1.0.
    pub volume: f64,
    #[serde(rename = "generationTime")]
    pub generation_time: u64,
}

impl VolumeUpdateMessage {
    /// Creates an update stamped with the current time.
    pub fn new(volume: f64) -> Self {
        Self {
            volume,
            generation_time: generation_time_now(),
        }
    }
}

/// Request to change the volume (0.0 - 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetVolumeMessage {
    pub volume: f64,
}

/// Request to change the playback speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetSpeedMessage {
    #[serde(default = "default_speed", deserialize_with = "speed_or_default")]
    pub speed: f64,
}

/// Playback failure reported to senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackErrorMessage {
    pub message: String,
}

impl PlaybackErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Protocol version handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMessage {
    pub version: u64,
}

/// A decoded frame.
///
/// Variants for opcodes that carry a body hold `None` when the frame was
/// sent without one.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    None,
    Play(Option<PlayMessage>),
    Pause,
    Resume,
    Stop,
    Seek(Option<SeekMessage>),
    PlaybackUpdate(Option<PlaybackUpdateMessage>),
    VolumeUpdate(Option<VolumeUpdateMessage>),
    SetVolume(Option<SetVolumeMessage>),
    PlaybackError(Option<PlaybackErrorMessage>),
    SetSpeed(Option<SetSpeedMessage>),
    Version(Option<VersionMessage>),
    Ping,
    Pong,
}

impl Message {
    /// Returns the opcode this message is sent with.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::None => Opcode::None,
            Self::Play(_) => Opcode::Play,
            Self::Pause => Opcode::Pause,
            Self::Resume => Opcode::Resume,
            Self::Stop => Opcode::Stop,
            Self::Seek(_) => Opcode::Seek,
            Self::PlaybackUpdate(_) => Opcode::PlaybackUpdate,
            Self::VolumeUpdate(_) => Opcode::VolumeUpdate,
            Self::SetVolume(_) => Opcode::SetVolume,
            Self::PlaybackError(_) => Opcode::PlaybackError,
            Self::SetSpeed(_) => Opcode::SetSpeed,
            Self::Version(_) => Opcode::Version,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
        }
    }
}
