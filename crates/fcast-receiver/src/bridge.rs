//! Fan-out of player state to connected clients.
//!
//! [`SessionRegistry`] tracks the sender of every live session.
//! [`PlaybackBridge`] is registered as the player's listener and turns
//! playback callbacks into PlaybackUpdate, VolumeUpdate and PlaybackError
//! broadcasts. [`PlaybackMonitor`] polls the player so clients see the
//! position advance once per second of media time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fcast_protocol::{
    Message, PlaybackErrorMessage, PlaybackState, PlaybackUpdateMessage, VolumeUpdateMessage,
};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::player::{PlaybackListener, Player, PlayerStatus};
use crate::sender::{SessionId, SessionSender};
use crate::signals::ShutdownHandle;

/// Senders of all connected sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<Vec<SessionSender>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sender: SessionSender) {
        self.lock().push(sender);
    }

    /// Removes the session with `id`. Returns false if it was not registered.
    pub fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|sender| sender.id() != id);
        sessions.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a copy of the registered senders.
    pub fn snapshot(&self) -> Vec<SessionSender> {
        self.lock().clone()
    }

    /// Sends `message` to every registered session.
    ///
    /// Dead sessions drop the frame silently. The registry lock is not held
    /// while sending.
    pub fn broadcast(&self, message: &Message) {
        let sessions = self.snapshot();
        trace!(opcode = %message.opcode(), sessions = sessions.len(), "Broadcasting");
        for sender in sessions {
            if let Err(e) = sender.send(message) {
                warn!(session = sender.id(), error = %e, "Failed to send broadcast");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionSender>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builds the update clients receive for `status`.
pub fn playback_update(status: &PlayerStatus) -> PlaybackUpdateMessage {
    let state = if status.paused {
        PlaybackState::Paused
    } else {
        PlaybackState::Playing
    };
    PlaybackUpdateMessage::new(status.time, state)
        .with_duration(status.duration)
        .with_speed(status.speed)
}

/// Player listener broadcasting playback changes to every session.
pub struct PlaybackBridge {
    registry: SessionRegistry,
    last_second: Mutex<Option<u64>>,
}

impl PlaybackBridge {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            last_second: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Broadcasts the position if playback crossed into a new whole second.
    ///
    /// Returns true if an update was sent.
    pub fn tick(&self, player: &dyn Player) -> bool {
        if !player.is_playing() {
            return false;
        }
        let status = player.status();
        if !self.advance_second(status.time) {
            return false;
        }
        self.broadcast_status(&status);
        true
    }

    fn advance_second(&self, time: f64) -> bool {
        let second = time.max(0.0).floor() as u64;
        let mut last = self.last_second.lock().unwrap_or_else(PoisonError::into_inner);
        if *last == Some(second) {
            return false;
        }
        *last = Some(second);
        true
    }

    fn reset_second(&self) {
        *self.last_second.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn broadcast_status(&self, status: &PlayerStatus) {
        let update = playback_update(status);
        self.registry
            .broadcast(&Message::PlaybackUpdate(Some(update)));
    }

    fn broadcast_idle(&self) {
        self.reset_second();
        self.registry
            .broadcast(&Message::PlaybackUpdate(Some(PlaybackUpdateMessage::idle())));
    }
}

impl PlaybackListener for PlaybackBridge {
    fn on_started(&self, status: &PlayerStatus) {
        self.advance_second(status.time);
        self.broadcast_status(status);
    }

    fn on_stopped(&self) {
        self.broadcast_idle();
    }

    fn on_paused(&self, status: &PlayerStatus) {
        self.broadcast_status(status);
    }

    fn on_resumed(&self, status: &PlayerStatus) {
        self.broadcast_status(status);
    }

    fn on_time_changed(&self, status: &PlayerStatus) {
        self.advance_second(status.time);
        self.broadcast_status(status);
    }

    fn on_error(&self, message: &str) {
        self.broadcast_idle();
        self.registry.broadcast(&Message::PlaybackError(Some(
            PlaybackErrorMessage::new(message),
        )));
    }

    fn on_volume_changed(&self, volume: f64) {
        self.registry
            .broadcast(&Message::VolumeUpdate(Some(VolumeUpdateMessage::new(volume))));
    }
}

/// Periodically drives [`PlaybackBridge::tick`].
pub struct PlaybackMonitor;

impl PlaybackMonitor {
    /// Spawns the monitor task. It stops when `shutdown` triggers.
    pub fn spawn(
        player: Arc<dyn Player>,
        bridge: Arc<PlaybackBridge>,
        period: Duration,
        shutdown: ShutdownHandle,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let stop = shutdown.wait().wait();
            tokio::pin!(stop);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        bridge.tick(&*player);
                    }
                }
            }
            debug!("Playback monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{HeadlessPlayer, MediaSource};
    use crate::sender::OutboundQueue;
    use crate::signals::SignalHandler;
    use fcast_protocol::{LENGTH_BYTES, decode_frame};

    fn client(registry: &SessionRegistry, id: SessionId) -> (SessionSender, OutboundQueue) {
        let (sender, queue) = SessionSender::new(id, None);
        registry.add(sender.clone());
        (sender, queue)
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<Message> {
        std::iter::from_fn(|| queue.try_next_frame())
            .map(|frame| decode_frame(&frame[LENGTH_BYTES..]).unwrap())
            .collect()
    }

    fn states(messages: &[Message]) -> Vec<PlaybackState> {
        messages
            .iter()
            .filter_map(|message| match message {
                Message::PlaybackUpdate(Some(update)) => Some(update.state),
                _ => None,
            })
            .collect()
    }

    fn bridged_player(registry: &SessionRegistry) -> (Arc<HeadlessPlayer>, Arc<PlaybackBridge>) {
        let player = Arc::new(HeadlessPlayer::new());
        let bridge = Arc::new(PlaybackBridge::new(registry.clone()));
        player.set_listener(bridge.clone());
        (player, bridge)
    }

    #[test]
    fn registry_add_remove() {
        let registry = SessionRegistry::new();
        let (_a, _qa) = client(&registry, 1);
        let (_b, _qb) = client(&registry, 2);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(1));
        assert!(!registry.remove(1));
        assert_eq!(registry.snapshot()[0].id(), 2);
    }

    #[test]
    fn broadcast_reaches_every_session() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (b, mut qb) = client(&registry, 2);
        b.close();

        registry.broadcast(&Message::Pong);
        assert_eq!(drain(&mut qa), vec![Message::Pong]);
        assert!(drain(&mut qb).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_is_broadcast() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (player, _bridge) = bridged_player(&registry);

        player.play(&MediaSource::new("http://h/v.mp4")).unwrap();
        player.pause().unwrap();
        player.resume().unwrap();
        player.stop().unwrap();

        assert_eq!(
            states(&drain(&mut qa)),
            vec![
                PlaybackState::Playing,
                PlaybackState::Paused,
                PlaybackState::Playing,
                PlaybackState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn error_sends_idle_then_error() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (player, _bridge) = bridged_player(&registry);

        player.play(&MediaSource::new("http://h/v.mp4")).unwrap();
        player.fail("boom");

        let messages = drain(&mut qa);
        assert_eq!(
            messages.last(),
            Some(&Message::PlaybackError(Some(PlaybackErrorMessage::new("boom"))))
        );
        assert_eq!(
            states(&messages),
            vec![PlaybackState::Playing, PlaybackState::Idle]
        );
    }

    #[test]
    fn volume_is_broadcast() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (player, _bridge) = bridged_player(&registry);

        player.set_volume(0.3).unwrap();
        match drain(&mut qa).as_slice() {
            [Message::VolumeUpdate(Some(update))] => assert_eq!(update.volume, 0.3),
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_only_reports_new_seconds() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (player, bridge) = bridged_player(&registry);

        assert!(!bridge.tick(&*player));

        player.play(&MediaSource::new("http://h/v.mp4")).unwrap();
        drain(&mut qa);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(!bridge.tick(&*player));

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(bridge.tick(&*player));
        assert!(!bridge.tick(&*player));
        assert_eq!(drain(&mut qa).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_stops_on_shutdown() {
        let registry = SessionRegistry::new();
        let (_a, mut qa) = client(&registry, 1);
        let (player, bridge) = bridged_player(&registry);
        let signals = SignalHandler::new();

        player.play(&MediaSource::new("http://h/v.mp4")).unwrap();
        drain(&mut qa);

        let task = PlaybackMonitor::spawn(
            player.clone(),
            bridge,
            Duration::from_millis(50),
            signals.shutdown_handle(),
        );

        tokio::time::sleep(Duration::from_millis(2_020)).await;
        assert_eq!(states(&drain(&mut qa)).len(), 2);

        signals.trigger_shutdown();
        task.await.unwrap();
    }
}
