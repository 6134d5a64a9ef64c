//! FCast receiver: TCP listener, sessions, playback control.
//!
//! This crate provides the receiving side of the FCast protocol:
//! - A TCP listener with one task per connected sender
//! - Per-connection sessions that frame, decode and dispatch commands
//! - Broadcast of playback state back to every connected sender
//! - A local HTTP server for DASH manifests sent inline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fcast_receiver::{HeadlessPlayer, LogNotifier, Receiver, ReceiverConfig, SignalHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!
//!     let receiver = Receiver::bind(
//!         ReceiverConfig::default(),
//!         Arc::new(HeadlessPlayer::new()),
//!         Arc::new(LogNotifier),
//!         signals.shutdown_handle(),
//!     )
//!     .await?;
//!     receiver.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod logging;

mod bridge;
mod commands;
mod config;
mod debounce;
mod error;
mod event;
mod handler;
mod manifest;
mod notify;
mod player;
mod receiver;
mod sender;
mod server;
mod session;
mod signals;

pub use bridge::{PlaybackBridge, PlaybackMonitor, SessionRegistry, playback_update};
pub use commands::{CommandHandler, DASH_CONTAINERS, HLS_MIME_TYPE, PlayRejection, is_hls_url};
pub use config::{
    ManifestSettings, NotificationSettings, ReceiverConfig, SeekSettings, ServerSettings,
};
pub use debounce::Debouncer;
pub use error::{ReceiverError, ReceiverResult, SessionError, SessionResult};
pub use event::{Event, UnknownEvent};
pub use handler::{ConnectionHandler, make_connection_handler};
pub use manifest::{ManifestHandle, ManifestServer, ManifestStore};
pub use notify::{DesktopNotifier, LogNotifier, Notifier, NotifyLevel, notifier_from_settings};
pub use player::{
    HeadlessPlayer, ManifestKind, MediaSource, PlaybackListener, Player, PlayerError,
    PlayerResult, PlayerStatus,
};
pub use receiver::Receiver;
pub use sender::{DEFAULT_OUTBOUND_CAPACITY, OutboundQueue, SessionId, SessionSender};
pub use server::{Connection, ConnectionGuard, ReceiverServer};
pub use session::{Handler, Session, SessionState};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
