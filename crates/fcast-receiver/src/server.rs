//! TCP listener for sender connections.
//!
//! Each accepted connection is handed to a handler future running on its
//! own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::config::ServerSettings;
use crate::error::{ReceiverError, ReceiverResult};
use crate::sender::SessionId;

/// TCP server accepting sender connections.
pub struct ReceiverServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    /// Limits concurrently served connections when configured.
    connection_semaphore: Option<Arc<Semaphore>>,
    next_id: AtomicU64,
}

impl ReceiverServer {
    /// Binds the listener described by `settings`.
    pub async fn bind(settings: &ServerSettings) -> ReceiverResult<Self> {
        let addr = settings.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ReceiverError::bind(addr, e))?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Receiver listening");

        Ok(Self {
            listener,
            local_addr,
            connection_semaphore: settings
                .max_connections
                .map(|max| Arc::new(Semaphore::new(max.max(1)))),
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts a single connection.
    ///
    /// Waits for a free slot first when a connection limit is configured.
    pub async fn accept(&self) -> ReceiverResult<Connection> {
        let permit = match &self.connection_semaphore {
            // The semaphore is never closed.
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        let (stream, peer) = self.listener.accept().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, peer = %peer, "Accepted new connection");

        Ok(Connection {
            id,
            stream,
            peer,
            _permit: permit,
        })
    }

    /// Runs the accept loop, spawning `handler` for each connection.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn run<F, Fut>(&self, handler: F) -> ReceiverResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ReceiverResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// An accepted sender connection.
pub struct Connection {
    id: SessionId,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Connection {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Splits the connection into its stream and a guard holding the
    /// connection slot.
    pub fn into_stream(self) -> (TcpStream, ConnectionGuard) {
        (
            self.stream,
            ConnectionGuard {
                _permit: self._permit,
            },
        )
    }
}

/// Holds a connection slot until dropped.
pub struct ConnectionGuard {
    _permit: Option<OwnedSemaphorePermit>,
}
