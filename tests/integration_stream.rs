//! Streaming integration tests
//!
//! Drives a real `IngestClient` against loopback TCP peers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use detlink::detection::{CanvasSize, Detection, DetectionMessage, DetectionView, LogRenderer, ModelResolution};
use detlink::error::Result;
use detlink::net::{
    ChannelListener, ConnectRequest, ConnectionState, DispatchControl, Framing, IngestClient, IngestClientConfig,
    ReplayPeer, ReplayPeerConfig, StreamEvent, StreamListener, TickResult,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;

const ONE_PERSON: &str = r#"{"detections": [{"class_name": "person", "bbox": [100, 200, 300, 500]}]}"#;
const ONE_DOG: &str = r#"{"detections": [{"class_name": "dog", "bbox": [0, 0, 10, 10]}]}"#;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Connect a client and return it with the server side of the socket.
async fn connected(framing: Framing) -> (IngestClient, TcpStream, UnboundedReceiver<StreamEvent>) {
    let (listener, port) = listener().await;
    let mut client = IngestClient::new(IngestClientConfig::with_address("127.0.0.1", port).with_framing(framing));
    let (events, rx) = ChannelListener::new();
    client.subscribe(Rc::new(RefCell::new(events)));

    let (accepted, connected) = tokio::join!(listener.accept(), client.connect_and_wait());
    connected.unwrap();
    let (server, _) = accepted.unwrap();
    (client, server, rx)
}

/// Tick until `done` holds or two seconds pass.
async fn tick_until(client: &mut IngestClient, mut done: impl FnMut(&TickResult, &IngestClient) -> bool) -> TickResult {
    for _ in 0..400 {
        let result = client.tick();
        if done(&result, client) {
            return result;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached; state {:?}", client.state());
}

fn drain(rx: &mut UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count_disconnects(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| **e == StreamEvent::Disconnected).count()
}

/// Integration test: verify a raw read is delivered as one message
#[tokio::test]
async fn test_raw_read_is_one_message() {
    let (mut client, mut server, mut rx) = connected(Framing::Raw).await;

    server.write_all(ONE_PERSON.as_bytes()).await.unwrap();
    let result = tick_until(&mut client, |r, _| matches!(r, TickResult::Dispatched(_))).await;

    assert_eq!(result, TickResult::Dispatched(1));
    assert_eq!(drain(&mut rx), vec![StreamEvent::Message(ONE_PERSON.to_string())]);
    assert_eq!(client.stats().bytes_read, ONE_PERSON.len() as u64);
}

/// Integration test: verify line framing reassembles a message split across writes
#[tokio::test]
async fn test_line_framing_reassembles_split_writes() {
    let (mut client, mut server, mut rx) = connected(Framing::Line).await;

    let (head, tail) = ONE_PERSON.split_at(20);
    server.write_all(head.as_bytes()).await.unwrap();
    server.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.write_all(format!("{}\n{}\n", tail, ONE_DOG).as_bytes()).await.unwrap();

    tick_until(&mut client, |_, c| c.stats().frames_dispatched == 2).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            StreamEvent::Message(ONE_PERSON.to_string()),
            StreamEvent::Message(ONE_DOG.to_string()),
        ]
    );
}

/// Integration test: verify length-prefixed frames are decoded
#[tokio::test]
async fn test_length_prefixed_framing() {
    let (mut client, mut server, mut rx) = connected(Framing::LengthPrefixed).await;

    let mut bytes = (ONE_DOG.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(ONE_DOG.as_bytes());
    server.write_all(&bytes).await.unwrap();

    tick_until(&mut client, |_, c| c.stats().frames_dispatched == 1).await;
    assert_eq!(drain(&mut rx), vec![StreamEvent::Message(ONE_DOG.to_string())]);
}

/// Integration test: verify peer close produces exactly one disconnect
#[tokio::test]
async fn test_peer_close_disconnects_exactly_once() {
    let (mut client, server, mut rx) = connected(Framing::Raw).await;
    drop(server);

    let result = tick_until(&mut client, |r, _| *r == TickResult::Disconnected).await;
    assert_eq!(result, TickResult::Disconnected);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Later ticks and explicit disconnects do not fire again
    assert_eq!(client.tick(), TickResult::Idle);
    assert!(!client.disconnect());
    assert_eq!(count_disconnects(&drain(&mut rx)), 1);
    assert_eq!(client.stats().disconnects, 1);
}

/// Integration test: verify explicit disconnect notifies subscribers once
#[tokio::test]
async fn test_explicit_disconnect_fires_once() {
    let (mut client, _server, mut rx) = connected(Framing::Raw).await;

    assert!(client.disconnect());
    assert!(!client.disconnect());
    assert_eq!(client.tick(), TickResult::Idle);
    assert_eq!(drain(&mut rx), vec![StreamEvent::Disconnected]);
}

/// Integration test: verify an oversized frame tears the connection down
#[tokio::test]
async fn test_framing_error_is_stream_error() {
    let (mut client, mut server, mut rx) = connected(Framing::LengthPrefixed).await;

    // Claims a frame far above the 1 MB limit
    server.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
    tick_until(&mut client, |r, _| *r == TickResult::Disconnected).await;

    assert_eq!(drain(&mut rx), vec![StreamEvent::Disconnected]);
}

/// Integration test: verify connect while connecting starts no second attempt
#[tokio::test]
async fn test_connect_while_connecting_is_noop() {
    let (listener, port) = listener().await;
    let mut client = IngestClient::new(IngestClientConfig::with_address("127.0.0.1", port));

    assert_eq!(client.connect(), ConnectRequest::Started);
    assert_eq!(client.connect(), ConnectRequest::AlreadyConnecting);
    assert_eq!(client.connection().attempts(), 1);

    let (_accepted, result) = tokio::join!(
        listener.accept(),
        tick_until(&mut client, |r, _| *r == TickResult::Connected)
    );
    assert_eq!(result, TickResult::Connected);
    assert_eq!(client.connect(), ConnectRequest::AlreadyConnected);
    assert_eq!(client.connection().attempts(), 1);
}

/// Integration test: verify a failed connect does not notify subscribers
#[tokio::test]
async fn test_connect_failure_reports_and_stays_quiet() {
    let port = listener().await.1;
    let mut client = IngestClient::new(IngestClientConfig::with_address("127.0.0.1", port));
    let (events, mut rx) = ChannelListener::new();
    client.subscribe(Rc::new(RefCell::new(events)));

    client.connect();
    let result = tick_until(&mut client, |r, _| matches!(r, TickResult::ConnectFailed(_))).await;

    assert!(matches!(result, TickResult::ConnectFailed(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(drain(&mut rx).is_empty());
}

struct HangUpAfterFirst {
    seen: Vec<String>,
}

impl StreamListener for HangUpAfterFirst {
    fn on_message(&mut self, raw: &str, control: &mut DispatchControl) {
        self.seen.push(raw.to_string());
        control.request_disconnect();
    }
}

/// Integration test: verify a listener can disconnect from inside a callback
#[tokio::test]
async fn test_disconnect_from_callback() {
    let (mut client, mut server, mut rx) = connected(Framing::Line).await;
    let hang_up = Rc::new(RefCell::new(HangUpAfterFirst { seen: Vec::new() }));
    client.subscribe(Rc::clone(&hang_up));

    server.write_all(format!("{}\n{}\n", ONE_PERSON, ONE_DOG).as_bytes()).await.unwrap();
    let result = tick_until(&mut client, |r, _| matches!(r, TickResult::Dispatched(n) if *n > 0)).await;

    assert_eq!(result, TickResult::Dispatched(1));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(hang_up.borrow().seen, vec![ONE_PERSON.to_string()]);
    assert_eq!(client.tick(), TickResult::Idle);
    assert_eq!(
        drain(&mut rx),
        vec![StreamEvent::Message(ONE_PERSON.to_string()), StreamEvent::Disconnected]
    );
}

/// Integration test: verify the view keeps only the latest decoded message
#[tokio::test]
async fn test_view_tracks_latest_message() {
    let (mut client, mut server, _rx) = connected(Framing::Line).await;
    let view = Rc::new(RefCell::new(DetectionView::new(
        LogRenderer,
        ModelResolution::default(),
        CanvasSize::new(800.0, 800.0),
    )));
    client.subscribe(Rc::clone(&view));

    server.write_all(format!("{}\n{}\n", ONE_PERSON, ONE_DOG).as_bytes()).await.unwrap();
    tick_until(&mut client, |_, c| c.stats().frames_dispatched == 2).await;
    assert_eq!(view.borrow().len(), 1);
    assert_eq!(view.borrow().active().next().unwrap().0.class_name, "dog");

    server.write_all(b"{not json\n").await.unwrap();
    tick_until(&mut client, |_, c| c.stats().frames_dispatched == 3).await;
    assert_eq!(view.borrow().len(), 1);
    assert_eq!(view.borrow().stats().rejected, 1);

    server.write_all(b"{\"detections\": []}\n").await.unwrap();
    tick_until(&mut client, |_, c| c.stats().frames_dispatched == 4).await;
    assert!(view.borrow().is_empty());
}

/// Integration test: verify run_until ends with a final disconnect
#[tokio::test]
async fn test_run_until_sends_final_disconnect() {
    let (mut client, _server, mut rx) = connected(Framing::Raw).await;

    let stats = client.run_until(tokio::time::sleep(Duration::from_millis(30))).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(stats.disconnects, 1);
    assert_eq!(drain(&mut rx), vec![StreamEvent::Disconnected]);
}

/// Integration test: verify reconnecting while connected is not counted
#[tokio::test]
async fn test_connect_and_wait_when_connected_counts_once() {
    let (mut client, _server, _rx) = connected(Framing::Raw).await;
    assert_eq!(client.stats().connects, 1);

    client.connect_and_wait().await.unwrap();
    client.connect_and_wait().await.unwrap();

    assert_eq!(client.stats().connects, 1);
    assert_eq!(client.connection().attempts(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

/// Integration test: verify dropping a connected client sends a final disconnect
#[tokio::test]
async fn test_drop_sends_final_disconnect() {
    let (client, _server, mut rx) = connected(Framing::Raw).await;
    drop(client);
    assert_eq!(drain(&mut rx), vec![StreamEvent::Disconnected]);
}

/// Integration test: verify replay peer output reaches the view end to end
#[tokio::test]
async fn test_replay_peer_to_client() -> Result<()> {
    let messages = vec![
        DetectionMessage::new(vec![Detection::new("person", [100, 200, 300, 500])]),
        DetectionMessage::new(vec![Detection::new("dog", [0, 0, 10, 10]), Detection::new("cat", [5, 5, 6, 6])]),
    ];
    let config = ReplayPeerConfig {
        framing: Framing::Line,
        interval: Duration::ZERO,
        repeat: false,
    };
    let peer = ReplayPeer::bind("127.0.0.1:0", config).await?;
    let port = peer.local_addr()?.port();

    let mut client = IngestClient::new(IngestClientConfig::with_address("127.0.0.1", port).with_framing(Framing::Line));
    let view = Rc::new(RefCell::new(DetectionView::new(
        LogRenderer,
        ModelResolution::default(),
        CanvasSize::new(800.0, 800.0),
    )));
    client.subscribe(Rc::clone(&view));

    let (served, connected) = tokio::join!(peer.serve_one(&messages), client.connect_and_wait());
    connected?;
    assert_eq!(served?.sent(), 2);

    // Peer shuts down after the script, so the client ends disconnected
    tick_until(&mut client, |r, _| *r == TickResult::Disconnected).await;
    assert_eq!(client.stats().frames_dispatched, 2);
    assert_eq!(view.borrow().stats().applied, 2);
    // Disconnect retires the last active set
    assert!(view.borrow().is_empty());
    Ok(())
}
