//! Per-connection driver.
//!
//! Binds a [`Session`] to an accepted socket, spawns the writer task,
//! registers the command handlers and feeds socket reads into the session
//! until the client leaves, the session faults or the receiver shuts down.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::bridge::SessionRegistry;
use crate::commands::CommandHandler;
use crate::config::ServerSettings;
use crate::error::{ReceiverError, ReceiverResult};
use crate::notify::Notifier;
use crate::sender::SessionSender;
use crate::server::Connection;
use crate::session::Session;
use crate::signals::ShutdownHandle;

/// How long a closed session's writer may keep flushing to its client.
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Serves accepted connections.
pub struct ConnectionHandler {
    commands: Arc<CommandHandler>,
    registry: SessionRegistry,
    notifier: Arc<dyn Notifier>,
    shutdown: ShutdownHandle,
    poll_interval: Duration,
    read_buffer_size: usize,
    outbound_capacity: usize,
}

impl ConnectionHandler {
    pub fn new(
        commands: Arc<CommandHandler>,
        registry: SessionRegistry,
        notifier: Arc<dyn Notifier>,
        settings: &ServerSettings,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            commands,
            registry,
            notifier,
            shutdown,
            poll_interval: settings.poll_interval(),
            read_buffer_size: settings.read_buffer_size.max(1),
            outbound_capacity: settings.outbound_queue_frames,
        }
    }

    /// Serves one connection to completion.
    ///
    /// The session is registered for broadcasts for as long as it is read,
    /// and always unregistered and closed before this returns.
    pub async fn handle_connection(&self, connection: Connection) -> ReceiverResult<()> {
        let id = connection.id();
        let peer = connection.peer();
        let (stream, _guard) = connection.into_stream();
        let (mut reader, writer) = stream.into_split();

        let (sender, queue) = SessionSender::with_capacity(id, Some(peer), self.outbound_capacity);
        let mut writer_task = tokio::spawn(queue.run(writer, sender.clone()));

        let mut session = Session::new(sender.clone());
        self.commands.register(&mut session);
        self.registry.add(sender);

        info!(session = id, peer = %peer, "Client connected");
        self.notifier.info(&format!("Connection from {}", peer.ip()));

        let result = self.read_loop(&mut session, &mut reader).await;

        self.registry.remove(id);
        session.close();
        match tokio::time::timeout(WRITER_GRACE, &mut writer_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = id, error = %e, "Writer task failed"),
            Err(_elapsed) => {
                debug!(session = id, "Client is not reading, dropping unsent frames");
                writer_task.abort();
            }
        }

        info!(session = id, peer = %peer, "Client disconnected");
        self.notifier
            .info(&format!("Connection closed from {}", peer.ip()));
        result
    }

    /// Feeds socket reads into `session`.
    ///
    /// Reads wait at most one poll interval so that shutdown and a close
    /// requested through the sender are noticed while the client is idle.
    async fn read_loop<R>(&self, session: &mut Session, reader: &mut R) -> ReceiverResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let id = session.sender().id();
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            if self.shutdown.is_shutdown() {
                debug!(session = id, "Shutdown requested, ending session");
                return Ok(());
            }
            if session.sender().is_closed() {
                debug!(session = id, "Session closed, ending read loop");
                return Ok(());
            }

            match tokio::time::timeout(self.poll_interval, reader.read(&mut buf)).await {
                Err(_elapsed) => continue,
                Ok(Ok(0)) => {
                    debug!(session = id, "Client closed connection");
                    return Ok(());
                }
                Ok(Ok(n)) => session.process(&buf[..n])?,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Creates the per-connection callback for
/// [`ReceiverServer::run`](crate::server::ReceiverServer::run).
pub fn make_connection_handler(
    handler: Arc<ConnectionHandler>,
) -> impl Fn(Connection) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
+ Send
+ Sync
+ 'static {
    move |connection| {
        let handler = handler.clone();
        Box::pin(async move {
            let id = connection.id();
            match handler.handle_connection(connection).await {
                Ok(()) => {}
                Err(ReceiverError::Session(e)) => {
                    warn!(session = id, error = %e, "Session ended on protocol fault");
                }
                Err(e) => {
                    warn!(session = id, error = %e, "Connection handler error");
                }
            }
        })
    }
}
