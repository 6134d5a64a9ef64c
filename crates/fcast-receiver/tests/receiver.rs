//! End-to-end tests against a receiver on a loopback socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use fcast_protocol::{
    Message, PlayMessage, PlaybackState, PlaybackUpdateMessage, SeekMessage, SetVolumeMessage,
    VersionMessage, decode_frame, encode_message,
};
use fcast_receiver::{
    HeadlessPlayer, LogNotifier, Player, Receiver, ReceiverConfig, ReceiverResult,
    SessionRegistry, SignalHandler,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(3);

struct Running {
    addr: SocketAddr,
    manifest_addr: Option<SocketAddr>,
    registry: SessionRegistry,
    player: Arc<HeadlessPlayer>,
    signals: SignalHandler,
    task: JoinHandle<ReceiverResult<()>>,
}

impl Running {
    async fn start(manifest: bool) -> Self {
        let config = ReceiverConfig::default()
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_manifest_server(manifest);
        let player = Arc::new(HeadlessPlayer::new());
        let signals = SignalHandler::new();

        let receiver = Receiver::bind(
            config,
            player.clone(),
            Arc::new(LogNotifier),
            signals.shutdown_handle(),
        )
        .await
        .unwrap();

        Self {
            addr: receiver.local_addr(),
            manifest_addr: receiver.manifest_addr(),
            registry: receiver.registry().clone(),
            player,
            signals,
            task: tokio::spawn(receiver.run()),
        }
    }

    async fn connect(&self) -> TcpStream {
        let before = self.registry.len();
        let stream = TcpStream::connect(self.addr).await.unwrap();
        wait_until(|| self.registry.len() > before).await;
        stream
    }

    async fn stop(self) {
        self.signals.trigger_shutdown();
        let result = tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn send(stream: &mut TcpStream, message: Message) {
    stream
        .write_all(&encode_message(&message).unwrap())
        .await
        .unwrap();
}

async fn read_message(stream: &mut TcpStream) -> Message {
    tokio::time::timeout(WAIT, async {
        let mut length = [0u8; 4];
        stream.read_exact(&mut length).await.unwrap();
        let mut frame = vec![0u8; u32::from_le_bytes(length) as usize];
        stream.read_exact(&mut frame).await.unwrap();
        decode_frame(&frame).unwrap()
    })
    .await
    .expect("no frame received in time")
}

async fn next_update(stream: &mut TcpStream) -> PlaybackUpdateMessage {
    loop {
        if let Message::PlaybackUpdate(Some(update)) = read_message(stream).await {
            return update;
        }
    }
}

async fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buf))
        .await
        .expect("connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn version_and_ping_are_answered() {
    let receiver = Running::start(false).await;
    let mut client = receiver.connect().await;

    send(&mut client, Message::Version(Some(VersionMessage { version: 1 }))).await;
    send(&mut client, Message::Ping).await;

    assert_eq!(
        read_message(&mut client).await,
        Message::Version(Some(VersionMessage { version: 1 }))
    );
    assert_eq!(read_message(&mut client).await, Message::Pong);

    receiver.stop().await;
}

#[tokio::test]
async fn play_state_is_broadcast_to_every_client() {
    let receiver = Running::start(false).await;
    let mut sender = receiver.connect().await;
    let mut watcher = receiver.connect().await;

    send(
        &mut sender,
        Message::Play(Some(PlayMessage::url("video/mp4", "http://h/v.mp4"))),
    )
    .await;
    for client in [&mut sender, &mut watcher] {
        assert_eq!(next_update(client).await.state, PlaybackState::Playing);
    }

    send(&mut watcher, Message::Pause).await;
    for client in [&mut sender, &mut watcher] {
        assert_eq!(next_update(client).await.state, PlaybackState::Paused);
    }

    send(&mut sender, Message::SetVolume(Some(SetVolumeMessage { volume: 0.5 }))).await;
    match read_message(&mut watcher).await {
        Message::VolumeUpdate(Some(update)) => assert_eq!(update.volume, 0.5),
        other => panic!("expected volume update, got {other:?}"),
    }

    send(&mut watcher, Message::Stop).await;
    for client in [&mut sender, &mut watcher] {
        assert_eq!(next_update(client).await.state, PlaybackState::Idle);
    }

    receiver.stop().await;
}

#[tokio::test]
async fn seek_is_acknowledged_then_applied() {
    let receiver = Running::start(false).await;
    let mut client = receiver.connect().await;

    send(
        &mut client,
        Message::Play(Some(PlayMessage::url("video/mp4", "http://h/v.mp4"))),
    )
    .await;
    assert_eq!(next_update(&mut client).await.state, PlaybackState::Playing);

    send(&mut client, Message::Seek(Some(SeekMessage::new(42.0)))).await;
    let feedback = next_update(&mut client).await;
    assert_eq!(feedback.time, 42.0);
    assert_eq!(feedback.state, PlaybackState::Playing);

    // The monitor reports the new position once the debounced seek lands.
    let applied = next_update(&mut client).await;
    assert!(applied.time >= 42.0, "position {} before seek target", applied.time);
    assert!(receiver.player.time() >= 42.0);

    receiver.stop().await;
}

#[tokio::test]
async fn one_shot_seek_lands_after_client_leaves() {
    let receiver = Running::start(false).await;
    let mut player_client = receiver.connect().await;

    send(
        &mut player_client,
        Message::Play(Some(PlayMessage::url("video/mp4", "http://h/v.mp4"))),
    )
    .await;
    assert_eq!(next_update(&mut player_client).await.state, PlaybackState::Playing);

    let mut one_shot = receiver.connect().await;
    send(&mut one_shot, Message::Seek(Some(SeekMessage::new(42.0)))).await;
    drop(one_shot);
    wait_until(|| receiver.registry.len() == 1).await;

    wait_until(|| receiver.player.time() >= 42.0).await;

    receiver.stop().await;
}

#[tokio::test]
async fn oversized_frame_closes_only_that_connection() {
    let receiver = Running::start(false).await;
    let mut bad = receiver.connect().await;
    let mut good = receiver.connect().await;

    bad.write_all(&32001u32.to_le_bytes()).await.unwrap();
    assert_closed(&mut bad).await;
    wait_until(|| receiver.registry.len() == 1).await;

    send(&mut good, Message::Ping).await;
    assert_eq!(read_message(&mut good).await, Message::Pong);

    receiver.stop().await;
}

#[tokio::test]
async fn unknown_opcode_closes_connection() {
    let receiver = Running::start(false).await;
    let mut client = receiver.connect().await;

    client.write_all(&[1, 0, 0, 0, 99]).await.unwrap();
    assert_closed(&mut client).await;
    wait_until(|| receiver.registry.is_empty()).await;

    receiver.stop().await;
}

#[tokio::test]
async fn dash_manifest_is_served_over_http() {
    let receiver = Running::start(true).await;
    let manifest_addr = receiver.manifest_addr.unwrap();
    let mut client = receiver.connect().await;

    send(
        &mut client,
        Message::Play(Some(PlayMessage::content(
            "application/dash+xml",
            "<MPD>live</MPD>",
        ))),
    )
    .await;
    assert_eq!(next_update(&mut client).await.state, PlaybackState::Playing);

    let source = receiver.player.source().unwrap();
    assert_eq!(
        source.url,
        format!("http://127.0.0.1:{}/manifest", manifest_addr.port())
    );

    let mut http = TcpStream::connect(manifest_addr).await.unwrap();
    http.write_all(b"GET /manifest HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    http.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("<MPD>live</MPD>"));

    receiver.stop().await;
}

#[tokio::test]
async fn shutdown_disconnects_clients() {
    let receiver = Running::start(false).await;
    let mut client = receiver.connect().await;

    receiver.signals.trigger_shutdown();
    assert_closed(&mut client).await;

    receiver.stop().await;
}
