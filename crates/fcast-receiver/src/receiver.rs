//! Top-level assembly of the receiver.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::{PlaybackBridge, PlaybackMonitor, SessionRegistry};
use crate::commands::CommandHandler;
use crate::config::ReceiverConfig;
use crate::error::ReceiverResult;
use crate::handler::{ConnectionHandler, make_connection_handler};
use crate::manifest::ManifestServer;
use crate::notify::Notifier;
use crate::player::Player;
use crate::server::ReceiverServer;
use crate::signals::ShutdownHandle;

/// A bound receiver, ready to serve senders.
pub struct Receiver {
    config: ReceiverConfig,
    server: ReceiverServer,
    manifest: Option<ManifestServer>,
    player: Arc<dyn Player>,
    bridge: Arc<PlaybackBridge>,
    notifier: Arc<dyn Notifier>,
    shutdown: ShutdownHandle,
}

impl Receiver {
    /// Binds the listener and the manifest server and attaches the bridge
    /// to `player`.
    pub async fn bind(
        config: ReceiverConfig,
        player: Arc<dyn Player>,
        notifier: Arc<dyn Notifier>,
        shutdown: ShutdownHandle,
    ) -> ReceiverResult<Self> {
        notifier.info("Starting FCast receiver ...");

        let server = match ReceiverServer::bind(&config.server).await {
            Ok(server) => server,
            Err(e) => {
                notifier.error("Bind failed");
                return Err(e);
            }
        };

        let manifest = if config.manifest.enabled {
            Some(ManifestServer::start(&config.manifest, shutdown.clone()).await?)
        } else {
            debug!("Manifest server disabled");
            None
        };

        let bridge = Arc::new(PlaybackBridge::new(SessionRegistry::new()));
        player.set_listener(bridge.clone());

        notifier.info(&format!(
            "Server listening on port {}",
            server.local_addr().port()
        ));

        Ok(Self {
            config,
            server,
            manifest,
            player,
            bridge,
            notifier,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Address of the manifest server, when enabled.
    pub fn manifest_addr(&self) -> Option<SocketAddr> {
        self.manifest.as_ref().map(ManifestServer::local_addr)
    }

    /// Sessions currently connected.
    pub fn registry(&self) -> &SessionRegistry {
        self.bridge.registry()
    }

    /// Serves senders until shutdown is triggered.
    pub async fn run(self) -> ReceiverResult<()> {
        let Self {
            config,
            server,
            manifest,
            player,
            bridge,
            notifier,
            shutdown,
        } = self;

        let monitor = PlaybackMonitor::spawn(
            player.clone(),
            bridge.clone(),
            config.server.monitor_interval(),
            shutdown.clone(),
        );

        let commands = Arc::new(CommandHandler::new(
            player.clone(),
            manifest.as_ref().map(ManifestServer::handle),
            notifier.clone(),
            config.seek.debounce(),
        ));
        let handler = Arc::new(ConnectionHandler::new(
            commands,
            bridge.registry().clone(),
            notifier,
            &config.server,
            shutdown.clone(),
        ));

        let result = server
            .run_until_shutdown(make_connection_handler(handler), shutdown.wait().wait())
            .await;

        // Make sure the monitor, the manifest server and open sessions stop
        // even if the accept loop ended on its own.
        shutdown.trigger();
        if let Err(e) = monitor.await {
            warn!(error = %e, "Playback monitor failed");
        }
        if let Some(manifest) = manifest {
            manifest.join().await;
        }
        if let Err(e) = player.stop() {
            warn!(error = %e, "Failed to stop player");
        }

        info!("Receiver stopped");
        result
    }
}
