//! Local HTTP server for manifests sent inline.
//!
//! A sender may push a DASH manifest as the body of a Play message instead
//! of a URL. The receiver publishes it here and hands the player
//! `http://<host>:<port>/manifest`. Only the most recent manifest is kept.

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ManifestSettings;
use crate::error::{ReceiverError, ReceiverResult};
use crate::signals::ShutdownHandle;

#[derive(Debug, Clone)]
struct Published {
    content_type: String,
    content: String,
}

/// The manifest currently being served.
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    current: Arc<RwLock<Option<Published>>>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the served manifest.
    pub fn set(&self, content_type: impl Into<String>, content: impl Into<String>) {
        let published = Published {
            content_type: content_type.into(),
            content: content.into(),
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(published);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_empty(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn get(&self) -> Option<Published> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to a running manifest server.
#[derive(Debug, Clone)]
pub struct ManifestHandle {
    store: ManifestStore,
    host: String,
    port: u16,
}

impl ManifestHandle {
    /// Publishes `content` and returns the URL it is served at.
    pub fn publish(&self, content_type: &str, content: &str) -> String {
        self.store.set(content_type, content);
        debug!(content_type, bytes = content.len(), "Published manifest");
        self.url()
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}/manifest", self.host, self.port)
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }
}

/// Running manifest server.
pub struct ManifestServer {
    handle: ManifestHandle,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ManifestServer {
    /// Binds the server and starts serving until `shutdown` triggers.
    pub async fn start(
        settings: &ManifestSettings,
        shutdown: ShutdownHandle,
    ) -> ReceiverResult<Self> {
        let addr = settings.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ReceiverError::bind(addr, e))?;
        let local_addr = listener.local_addr()?;

        let store = ManifestStore::new();
        let app = router(store.clone());

        let task = tokio::spawn(async move {
            let stop = shutdown.wait();
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.wait())
                .await
            {
                warn!(error = %e, "Manifest server failed");
            }
            debug!("Manifest server stopped");
        });

        let host = if local_addr.ip().is_unspecified() {
            "localhost".to_string()
        } else {
            local_addr.ip().to_string()
        };
        info!(addr = %local_addr, "Manifest server listening");

        Ok(Self {
            handle: ManifestHandle {
                store,
                host,
                port: local_addr.port(),
            },
            local_addr,
            task,
        })
    }

    pub fn handle(&self) -> ManifestHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the server task to finish after shutdown.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

fn router(store: ManifestStore) -> Router {
    Router::new()
        .route("/manifest", get(serve_manifest))
        .with_state(store)
}

/// GET/HEAD /manifest
async fn serve_manifest(State(store): State<ManifestStore>) -> Response {
    match store.get() {
        Some(published) => (
            [(header::CONTENT_TYPE, published.content_type)],
            published.content,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalHandler;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn request(addr: SocketAddr, method: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request =
            format!("{method} /manifest HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    fn settings() -> ManifestSettings {
        ManifestSettings {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }

    #[tokio::test]
    async fn serves_published_manifest() {
        let signals = SignalHandler::new();
        let server = ManifestServer::start(&settings(), signals.shutdown_handle())
            .await
            .unwrap();
        let handle = server.handle();

        let empty = request(server.local_addr(), "GET").await;
        assert!(empty.starts_with("HTTP/1.1 404"));
        assert!(empty.ends_with("Not found"));

        let url = handle.publish("application/dash+xml", "<MPD/>");
        assert_eq!(
            url,
            format!("http://127.0.0.1:{}/manifest", server.local_addr().port())
        );

        let response = request(server.local_addr(), "GET").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("content-type: application/dash+xml"));
        assert!(response.ends_with("<MPD/>"));

        let head = request(server.local_addr(), "HEAD").await;
        assert!(head.starts_with("HTTP/1.1 200"));
        assert!(!head.contains("<MPD/>"));

        signals.trigger_shutdown();
        server.join().await;
    }

    #[test]
    fn store_replaces_and_clears() {
        let store = ManifestStore::new();
        assert!(store.is_empty());

        store.set("application/dash+xml", "a");
        store.set("application/xml+dash", "b");
        let current = store.get().unwrap();
        assert_eq!(current.content_type, "application/xml+dash");
        assert_eq!(current.content, "b");

        store.clear();
        assert!(store.is_empty());
    }
}
