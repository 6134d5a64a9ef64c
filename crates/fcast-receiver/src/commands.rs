//! Handlers for sender commands.
//!
//! [`CommandHandler`] registers one handler per [`Event`] on every new
//! session and translates the commands into [`Player`] calls.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fcast_protocol::{
    Message, PlayMessage, PlaybackErrorMessage, PlaybackState, PlaybackUpdateMessage,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::debounce::Debouncer;
use crate::event::Event;
use crate::manifest::ManifestHandle;
use crate::notify::Notifier;
use crate::player::{ManifestKind, MediaSource, Player, PlayerResult};
use crate::sender::{SessionId, SessionSender};
use crate::session::Session;

/// MIME type handed to the player for HLS playlists.
pub const HLS_MIME_TYPE: &str = "application/x-mpegURL";

/// Containers accepted for inline DASH manifests.
pub const DASH_CONTAINERS: [&str; 2] = ["application/dash+xml", "application/xml+dash"];

/// Why a Play request could not be turned into a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRejection {
    /// Inline content with a container other than DASH.
    UnhandledContainer(String),
    /// Inline DASH content while the manifest server is disabled.
    ManifestServerDisabled,
    /// Neither `url` nor `content` was set.
    NothingToPlay,
}

/// Translates session events into player calls.
pub struct CommandHandler {
    player: Arc<dyn Player>,
    manifest: Option<ManifestHandle>,
    notifier: Arc<dyn Notifier>,
    seeks: Debouncer<SessionId>,
}

impl CommandHandler {
    pub fn new(
        player: Arc<dyn Player>,
        manifest: Option<ManifestHandle>,
        notifier: Arc<dyn Notifier>,
        seek_debounce: Duration,
    ) -> Self {
        Self {
            player,
            manifest,
            notifier,
            seeks: Debouncer::new(seek_debounce),
        }
    }

    /// Registers a handler for every sender command on `session`.
    pub fn register(self: &Arc<Self>, session: &mut Session) {
        for event in Event::ALL {
            let handler = Arc::clone(self);
            session.on(event, move |sender, message| {
                handler.handle(event, sender, message);
            });
        }
    }

    /// Handles one command from `sender`.
    pub fn handle(&self, event: Event, sender: &SessionSender, message: &Message) {
        debug!(session = sender.id(), %event, "Client request");

        let result = match message {
            Message::Play(Some(play)) => {
                self.play(sender, play);
                Ok(())
            }
            Message::Seek(Some(seek)) => {
                self.seek(sender, seek.time);
                Ok(())
            }
            Message::Pause => self.player.pause(),
            Message::Resume => self.player.resume(),
            Message::Stop => self.player.stop(),
            Message::SetVolume(Some(volume)) => self.player.set_volume(volume.volume),
            Message::SetSpeed(Some(speed)) => self.player.set_speed(speed.speed),
            _ => {
                debug!(session = sender.id(), %event, "Command without payload ignored");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(session = sender.id(), %event, error = %e, "Player rejected command");
        }
    }

    fn play(&self, sender: &SessionSender, play: &PlayMessage) {
        let source = match self.resolve_source(play) {
            Ok(source) => source,
            Err(PlayRejection::UnhandledContainer(container)) => {
                self.notifier
                    .warning(&format!("Unhandled content container {container}"));
                return;
            }
            Err(PlayRejection::ManifestServerDisabled) => {
                self.notifier
                    .warning("Manifest server is disabled, cannot play inline DASH content");
                return;
            }
            Err(PlayRejection::NothingToPlay) => {
                debug!(session = sender.id(), "Play request without url or content");
                return;
            }
        };

        self.notifier.info("Starting player ...");
        if let Err(e) = self.start(&source, play) {
            warn!(session = sender.id(), url = %source.url, error = %e, "Failed to start playback");
            if let Err(e) = sender.send_playback_error(&PlaybackErrorMessage::new(e.to_string())) {
                warn!(session = sender.id(), error = %e, "Failed to send playback error");
            }
        }
    }

    fn start(&self, source: &MediaSource, play: &PlayMessage) -> PlayerResult<()> {
        if self.player.is_playing() {
            self.player.stop()?;
        }
        self.player.play(source)?;
        if let Some(time) = play.time.filter(|time| *time > 0.0) {
            self.player.seek(time)?;
        }
        if play.speed != 1.0 {
            self.player.set_speed(play.speed)?;
        }
        Ok(())
    }

    /// Works out what the player should open for `play`.
    pub fn resolve_source(&self, play: &PlayMessage) -> Result<MediaSource, PlayRejection> {
        let source = if let Some(url) = &play.url {
            if is_hls_url(url) {
                info!(url, "Detected HLS stream");
                MediaSource::new(url.clone())
                    .with_mime_type(HLS_MIME_TYPE)
                    .with_manifest(ManifestKind::Hls)
            } else {
                let source = MediaSource::new(url.clone());
                if play.container.is_empty() {
                    source
                } else {
                    source.with_mime_type(play.container.clone())
                }
            }
        } else if let Some(content) = &play.content {
            if !DASH_CONTAINERS.contains(&play.container.as_str()) {
                return Err(PlayRejection::UnhandledContainer(play.container.clone()));
            }
            let manifest = self
                .manifest
                .as_ref()
                .ok_or(PlayRejection::ManifestServerDisabled)?;
            info!(bytes = content.len(), "Detected DASH stream");
            MediaSource::new(manifest.publish(&play.container, content))
                .with_mime_type(play.container.clone())
                .with_manifest(ManifestKind::Dash)
        } else {
            return Err(PlayRejection::NothingToPlay);
        };

        Ok(source.with_headers(play.headers.clone().unwrap_or_default()))
    }

    /// Reports the target position at once, then applies the seek after
    /// the debounce window.
    fn seek(&self, sender: &SessionSender, time: f64) {
        let state = if self.player.is_paused() {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        };
        let update = PlaybackUpdateMessage::new(time, state).with_speed(self.player.speed());
        if let Err(e) = sender.send_playback_update(&update) {
            warn!(session = sender.id(), error = %e, "Failed to send seek feedback");
        }

        let player = Arc::clone(&self.player);
        let session = sender.id();
        self.seeks.arm(session, move || {
            debug!(session, time, "Applying seek");
            if let Err(e) = player.seek(time) {
                warn!(session, time, error = %e, "Seek failed");
            }
        });
    }
}

/// Returns true if the URL path ends in `.m3u8`.
pub fn is_hls_url(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    Path::new(&path)
        .extension()
        .is_some_and(|extension| extension == "m3u8")
}
