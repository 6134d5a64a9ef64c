//! Outbound path of a session.
//!
//! Frames are encoded on the caller's thread and queued to a writer task
//! that owns the socket's write half. A failed write or a full queue marks
//! the path dead; later sends are dropped without error. The read side
//! never observes write failures.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fcast_protocol::{
    Message, PlaybackErrorMessage, PlaybackUpdateMessage, ProtocolResult, VolumeUpdateMessage,
    encode_message,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Identifier assigned to each accepted connection.
pub type SessionId = u64;

/// Frames a session may have queued before its peer counts as stalled.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

struct SenderInner {
    id: SessionId,
    peer: Option<SocketAddr>,
    tx: mpsc::Sender<Outgoing>,
    dead: AtomicBool,
    closed: AtomicBool,
}

/// Cloneable handle used to write frames to one client.
#[derive(Clone)]
pub struct SessionSender {
    inner: Arc<SenderInner>,
}

impl fmt::Debug for SessionSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSender")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("dead", &self.is_dead())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionSender {
    /// Creates a sender and the queue its writer task drains.
    pub fn new(id: SessionId, peer: Option<SocketAddr>) -> (Self, OutboundQueue) {
        Self::with_capacity(id, peer, DEFAULT_OUTBOUND_CAPACITY)
    }

    /// Like [`new`](Self::new) with room for `capacity` queued frames.
    pub fn with_capacity(
        id: SessionId,
        peer: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sender = Self {
            inner: Arc::new(SenderInner {
                id,
                peer,
                tx,
                dead: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        };
        (sender, OutboundQueue { rx })
    }

    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the remote address, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    /// Returns true once a write failed or the session was closed.
    pub fn is_dead(&self) -> bool {
        self.inner.dead.load(Ordering::Acquire)
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Sends a playback update to this client.
    pub fn send_playback_update(&self, update: &PlaybackUpdateMessage) -> ProtocolResult<()> {
        self.send(&Message::PlaybackUpdate(Some(update.clone())))
    }

    /// Sends a volume update to this client.
    pub fn send_volume_update(&self, update: &VolumeUpdateMessage) -> ProtocolResult<()> {
        self.send(&Message::VolumeUpdate(Some(update.clone())))
    }

    /// Sends a playback error to this client.
    pub fn send_playback_error(&self, error: &PlaybackErrorMessage) -> ProtocolResult<()> {
        self.send(&Message::PlaybackError(Some(error.clone())))
    }

    /// Encodes `message` and queues it for writing.
    ///
    /// Returns `Ok(())` without sending when the outbound path is dead.
    pub fn send(&self, message: &Message) -> ProtocolResult<()> {
        if self.is_dead() {
            trace!(session = self.id(), opcode = %message.opcode(), "Dropping frame for dead session");
            return Ok(());
        }

        let frame = encode_message(message)?;
        match self.inner.tx.try_send(Outgoing::Frame(frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    session = self.id(),
                    "Outbound queue full, client stopped reading, outbound path is now dead"
                );
                self.mark_dead();
            }
            Err(TrySendError::Closed(_)) => self.mark_dead(),
        }
        Ok(())
    }

    /// Closes the session. Safe to call more than once.
    ///
    /// The writer task shuts the socket's write half down and the read loop
    /// stops at its next poll tick.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.dead.store(true, Ordering::Release);
        // On a full queue the writer stops once it has drained it.
        let _ = self.inner.tx.try_send(Outgoing::Close);
        debug!(session = self.id(), "Session closed");
    }

    fn mark_dead(&self) {
        self.inner.dead.store(true, Ordering::Release);
    }
}

/// Receiving end of a [`SessionSender`], drained by the writer task.
pub struct OutboundQueue {
    rx: mpsc::Receiver<Outgoing>,
}

impl OutboundQueue {
    /// Writes queued frames to `writer` until the session closes or a write fails.
    pub async fn run<W>(mut self, mut writer: W, sender: SessionSender)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(outgoing) = self.rx.recv().await {
            match outgoing {
                Outgoing::Frame(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(
                            session = sender.id(),
                            error = %e,
                            "Error while sending frame to client, outbound path is now dead"
                        );
                        sender.mark_dead();
                        break;
                    }
                    if sender.is_closed() && self.rx.is_empty() {
                        let _ = writer.shutdown().await;
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = writer.shutdown().await;
                    break;
                }
            }
        }
        debug!(session = sender.id(), "Writer stopped");
    }

    /// Pops the next queued frame without a writer task.
    #[cfg(test)]
    pub(crate) fn try_next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.rx.try_recv().ok()? {
                Outgoing::Frame(frame) => return Some(frame),
                Outgoing::Close => continue,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fcast_protocol::{LENGTH_BYTES, Opcode, PlaybackState, decode_frame};

    /// Writer whose every write fails with a broken pipe.
    pub(crate) struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn send_queues_encoded_frame() {
        let (sender, mut queue) = SessionSender::new(1, None);
        sender
            .send_playback_update(&PlaybackUpdateMessage::new(3.0, PlaybackState::Playing))
            .unwrap();

        let frame = queue.try_next_frame().unwrap();
        assert_eq!(frame[LENGTH_BYTES], Opcode::PlaybackUpdate.as_u8());
        let message = decode_frame(&frame[LENGTH_BYTES..]).unwrap();
        assert!(matches!(message, Message::PlaybackUpdate(Some(_))));
    }

    #[test]
    fn close_is_idempotent_and_silences_sends() {
        let (sender, mut queue) = SessionSender::new(2, None);
        sender.close();
        sender.close();
        assert!(sender.is_closed());
        assert!(sender.is_dead());

        sender.send(&Message::Pong).unwrap();
        assert!(queue.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn writer_streams_frames_in_order() {
        let (sender, queue) = SessionSender::new(3, None);
        sender.send(&Message::Pong).unwrap();
        sender
            .send_volume_update(&VolumeUpdateMessage::new(0.5))
            .unwrap();
        sender.close();

        let mut output = Vec::new();
        queue.run(&mut output, sender.clone()).await;

        assert_eq!(&output[..5], &[1, 0, 0, 0, Opcode::Pong.as_u8()]);
        assert_eq!(output[5 + LENGTH_BYTES], Opcode::VolumeUpdate.as_u8());
    }

    #[tokio::test]
    async fn write_failure_marks_sender_dead() {
        let (sender, queue) = SessionSender::new(4, None);
        sender.send(&Message::Pong).unwrap();

        queue.run(FailingWriter, sender.clone()).await;

        assert!(sender.is_dead());
        assert!(!sender.is_closed());
        // Later sends are silently dropped.
        sender
            .send_playback_update(&PlaybackUpdateMessage::idle())
            .unwrap();
    }

    #[test]
    fn full_queue_marks_sender_dead() {
        let (sender, mut queue) = SessionSender::with_capacity(5, None, 2);
        sender.send(&Message::Pong).unwrap();
        sender.send(&Message::Pong).unwrap();
        assert!(!sender.is_dead());

        sender.send(&Message::Pong).unwrap();
        assert!(sender.is_dead());
        assert!(!sender.is_closed());

        assert!(queue.try_next_frame().is_some());
        assert!(queue.try_next_frame().is_some());
        assert!(queue.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn writer_stops_after_close_on_full_queue() {
        let (sender, queue) = SessionSender::with_capacity(6, None, 1);
        sender.send(&Message::Pong).unwrap();
        sender.close();

        let mut output = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            queue.run(&mut output, sender.clone()),
        )
        .await
        .expect("writer did not stop");
        assert_eq!(output, vec![1, 0, 0, 0, Opcode::Pong.as_u8()]);
    }
}
