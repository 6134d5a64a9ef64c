//! Player capability interface.
//!
//! The receiver drives playback through [`Player`] and learns about
//! playback changes through the [`PlaybackListener`] it registers. Backends
//! invoke listener callbacks without holding their own locks so listeners
//! may query the player.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result type for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Errors reported by a player backend.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The backend cannot open the source.
    #[error("unsupported source: {0}")]
    Unsupported(String),

    /// The backend failed to carry out the command.
    #[error("player backend error: {0}")]
    Backend(String),
}

/// Adaptive manifest formats a source may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Hls,
    Dash,
}

/// Media to be played, always addressed by URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub url: String,
    /// MIME type to hand to the backend instead of probing.
    pub mime_type: Option<String>,
    /// Set when the URL points at an adaptive manifest.
    pub manifest: Option<ManifestKind>,
    /// Extra HTTP headers for fetching the media.
    pub headers: HashMap<String, String>,
}

impl MediaSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: None,
            manifest: None,
            headers: HashMap::new(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_manifest(mut self, kind: ManifestKind) -> Self {
        self.manifest = Some(kind);
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// Point-in-time view of the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
    /// Position in seconds.
    pub time: f64,
    pub duration: Option<f64>,
    pub speed: f64,
    pub paused: bool,
}

/// Callbacks a player invokes when playback changes.
pub trait PlaybackListener: Send + Sync {
    fn on_started(&self, status: &PlayerStatus);
    fn on_stopped(&self);
    fn on_paused(&self, status: &PlayerStatus);
    fn on_resumed(&self, status: &PlayerStatus);
    fn on_time_changed(&self, status: &PlayerStatus);
    fn on_error(&self, message: &str);
    fn on_volume_changed(&self, volume: f64);
}

/// Playback backend controlled by the receiver.
pub trait Player: Send + Sync {
    /// Starts playing `source`, replacing anything currently loaded.
    fn play(&self, source: &MediaSource) -> PlayerResult<()>;
    fn pause(&self) -> PlayerResult<()>;
    fn resume(&self) -> PlayerResult<()>;
    fn stop(&self) -> PlayerResult<()>;
    /// Seeks to an absolute position in seconds.
    fn seek(&self, time: f64) -> PlayerResult<()>;
    /// Sets the volume in the range 0.0 - 1.0.
    fn set_volume(&self, volume: f64) -> PlayerResult<()>;
    fn set_speed(&self, speed: f64) -> PlayerResult<()>;

    fn time(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    fn speed(&self) -> f64;
    fn is_paused(&self) -> bool;
    /// True while media is loaded, paused or not.
    fn is_playing(&self) -> bool;

    /// Registers the listener for playback callbacks, replacing any previous one.
    fn set_listener(&self, listener: Arc<dyn PlaybackListener>);

    fn status(&self) -> PlayerStatus {
        PlayerStatus {
            time: self.time(),
            duration: self.duration(),
            speed: self.speed(),
            paused: self.is_paused(),
        }
    }
}

#[derive(Debug)]
struct HeadlessState {
    source: Option<MediaSource>,
    /// Position at `anchor`.
    position: f64,
    /// Set while the clock is running.
    anchor: Option<Instant>,
    paused: bool,
    speed: f64,
    volume: f64,
}

impl HeadlessState {
    fn time(&self) -> f64 {
        match self.anchor {
            Some(anchor) => self.position + anchor.elapsed().as_secs_f64() * self.speed,
            None => self.position,
        }
    }

    fn status(&self) -> PlayerStatus {
        PlayerStatus {
            time: self.time(),
            duration: None,
            speed: self.speed,
            paused: self.paused,
        }
    }

    /// Folds elapsed time into `position` and restarts the clock if running.
    fn rebase(&mut self) {
        self.position = self.time();
        if self.anchor.is_some() {
            self.anchor = Some(Instant::now());
        }
    }
}

/// In-memory player that keeps a playback clock without decoding media.
///
/// Used when no media backend is attached, and in tests.
pub struct HeadlessPlayer {
    state: Mutex<HeadlessState>,
    listener: Mutex<Option<Arc<dyn PlaybackListener>>>,
}

impl Default for HeadlessPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                source: None,
                position: 0.0,
                anchor: None,
                paused: false,
                speed: 1.0,
                volume: 1.0,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Returns the loaded source, if any.
    pub fn source(&self) -> Option<MediaSource> {
        self.state().source.clone()
    }

    /// Returns the current volume.
    pub fn volume(&self) -> f64 {
        self.state().volume
    }

    /// Stops playback with an error, as a backend would on a decode failure.
    pub fn fail(&self, message: &str) {
        {
            let mut state = self.state();
            state.source = None;
            state.anchor = None;
            state.position = 0.0;
            state.paused = false;
        }
        info!(error = message, "Playback error");
        if let Some(listener) = self.listener() {
            listener.on_error(message);
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> Option<Arc<dyn PlaybackListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Player for HeadlessPlayer {
    fn play(&self, source: &MediaSource) -> PlayerResult<()> {
        let status = {
            let mut state = self.state();
            state.source = Some(source.clone());
            state.position = 0.0;
            state.anchor = Some(Instant::now());
            state.paused = false;
            state.status()
        };
        info!(url = %source.url, mime_type = ?source.mime_type, "Playback started");
        if let Some(listener) = self.listener() {
            listener.on_started(&status);
        }
        Ok(())
    }

    fn pause(&self) -> PlayerResult<()> {
        let status = {
            let mut state = self.state();
            if state.source.is_none() || state.paused {
                return Ok(());
            }
            state.position = state.time();
            state.anchor = None;
            state.paused = true;
            state.status()
        };
        debug!(time = status.time, "Paused");
        if let Some(listener) = self.listener() {
            listener.on_paused(&status);
        }
        Ok(())
    }

    fn resume(&self) -> PlayerResult<()> {
        let status = {
            let mut state = self.state();
            if state.source.is_none() || !state.paused {
                return Ok(());
            }
            state.anchor = Some(Instant::now());
            state.paused = false;
            state.status()
        };
        debug!(time = status.time, "Resumed");
        if let Some(listener) = self.listener() {
            listener.on_resumed(&status);
        }
        Ok(())
    }

    fn stop(&self) -> PlayerResult<()> {
        {
            let mut state = self.state();
            if state.source.is_none() {
                return Ok(());
            }
            state.source = None;
            state.anchor = None;
            state.position = 0.0;
            state.paused = false;
        }
        debug!("Stopped");
        if let Some(listener) = self.listener() {
            listener.on_stopped();
        }
        Ok(())
    }

    fn seek(&self, time: f64) -> PlayerResult<()> {
        let mut state = self.state();
        if state.source.is_none() {
            return Err(PlayerError::Backend("nothing is playing".to_string()));
        }
        state.position = time.max(0.0);
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
        debug!(time, "Seeked");
        Ok(())
    }

    fn set_volume(&self, volume: f64) -> PlayerResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.state().volume = volume;
        if let Some(listener) = self.listener() {
            listener.on_volume_changed(volume);
        }
        Ok(())
    }

    fn set_speed(&self, speed: f64) -> PlayerResult<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlayerError::Backend(format!("invalid speed {speed}")));
        }
        let status = {
            let mut state = self.state();
            state.rebase();
            state.speed = speed;
            state.source.is_some().then(|| state.status())
        };
        if let (Some(status), Some(listener)) = (status, self.listener()) {
            listener.on_time_changed(&status);
        }
        Ok(())
    }

    fn time(&self) -> f64 {
        self.state().time()
    }

    /// No media is decoded, so the length is never known.
    fn duration(&self) -> Option<f64> {
        None
    }

    fn speed(&self) -> f64 {
        self.state().speed
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn is_playing(&self) -> bool {
        self.state().source.is_some()
    }

    fn set_listener(&self, listener: Arc<dyn PlaybackListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn status(&self) -> PlayerStatus {
        self.state().status()
    }
}
