//! Receiver configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/fcast-receiver/config.toml` by default. Every section and
//! field is optional; missing values take the defaults below.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fcast_protocol::{DEFAULT_PORT, MAXIMUM_PACKET_LENGTH};
use serde::{Deserialize, Serialize};

use crate::error::{ReceiverError, ReceiverResult};
use crate::sender::DEFAULT_OUTBOUND_CAPACITY;

/// Configuration for the receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Listener settings.
    pub server: ServerSettings,

    /// Seek handling.
    pub seek: SeekSettings,

    /// Local DASH manifest server.
    pub manifest: ManifestSettings,

    /// Operator notifications.
    pub notifications: NotificationSettings,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on.
    pub bind_address: IpAddr,

    /// TCP port to listen on.
    pub port: u16,

    /// How often an idle read loop checks for close and shutdown.
    pub poll_interval_ms: u64,

    /// Size of each socket read.
    pub read_buffer_size: usize,

    /// Cap on concurrently served connections. Unlimited when unset.
    pub max_connections: Option<usize>,

    /// Period of the playback position monitor.
    pub monitor_interval_ms: u64,

    /// Frames queued per client before it counts as stalled.
    pub outbound_queue_frames: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_interval_ms: 50,
            read_buffer_size: MAXIMUM_PACKET_LENGTH as usize,
            max_connections: None,
            monitor_interval_ms: 50,
            outbound_queue_frames: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.max(1))
    }
}

/// Seek handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekSettings {
    /// Quiet period before a burst of seeks is applied.
    pub debounce_ms: u64,
}

impl Default for SeekSettings {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}

impl SeekSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Local HTTP server publishing DASH manifests sent inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    pub enabled: bool,

    pub bind_address: IpAddr,

    /// Port to serve on. 0 picks a free port.
    pub port: u16,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }
}

impl ManifestSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Operator notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Show desktop notifications in addition to logging.
    pub desktop: bool,

    /// Application name shown on notifications.
    pub app_name: String,

    /// Notification timeout in seconds.
    pub timeout_secs: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            desktop: false,
            app_name: "FCast Receiver".to_string(),
            timeout_secs: 3,
        }
    }
}

impl ReceiverConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> ReceiverResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ReceiverResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReceiverError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> ReceiverResult<Self> {
        toml::from_str(content)
            .map_err(|e| ReceiverError::config(format!("failed to parse config: {}", e)))
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml(&self) -> ReceiverResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ReceiverError::config(format!("failed to serialize config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fcast-receiver")
    }

    /// Builder: set the listener port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Builder: set the listener address.
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.server.bind_address = address;
        self
    }

    /// Builder: enable or disable the manifest server.
    pub fn with_manifest_server(mut self, enabled: bool) -> Self {
        self.manifest.enabled = enabled;
        self
    }

    /// Builder: set the seek debounce window.
    pub fn with_seek_debounce(mut self, debounce: Duration) -> Self {
        self.seek.debounce_ms = debounce.as_millis() as u64;
        self
    }
}
