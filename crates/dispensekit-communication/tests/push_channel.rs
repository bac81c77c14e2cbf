//! Push channel against a local WebSocket server

use dispensekit_communication::{DeviceGateway, PushChannel, SyncEngine, SyncEngineConfig};
use dispensekit_core::{PushSink, RawSlot, SlotId, SlotRecord, SyncEvent, TransportError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Seen {
    Slots(Vec<RawSlot>),
    Tag(String),
    Closed,
}

struct RecordingSink(mpsc::UnboundedSender<Seen>);

impl PushSink for RecordingSink {
    fn on_slots(&self, entries: Vec<RawSlot>) {
        let _ = self.0.send(Seen::Slots(entries));
    }

    fn on_tag(&self, tag: String) {
        let _ = self.0.send(Seen::Tag(tag));
    }

    fn on_closed(&self) {
        let _ = self.0.send(Seen::Closed);
    }
}

/// Serve one client: push `frames`, then forward every text frame received
async fn serve_once(
    frames: Vec<&'static str>,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::text(frame)).await.unwrap();
        }
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = received_tx.send(text.to_string());
            }
        }
    });

    (addr, received_rx, server)
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn frames_are_dispatched_and_commands_sent() {
    let (addr, mut received, server) = serve_once(vec![
        r#"{"type":"pillData","pills":[{"name":"Aspirin","count":8},{"name":"Zinc","count":2}]}"#,
        "not a frame",
        r#"{"type":"rfid","tag":"04A1B2"}"#,
    ])
    .await;
    let (tx, mut seen) = mpsc::unbounded_channel();

    let channel = PushChannel::connect(
        &format!("ws://{}", addr),
        Arc::new(RecordingSink(tx)),
        WAIT,
    )
    .await
    .unwrap();

    let Seen::Slots(slots) = next_seen(&mut seen).await else {
        panic!("expected slot list first");
    };
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[1].id, SlotId(2));
    assert_eq!(next_seen(&mut seen).await, Seen::Tag("04A1B2".to_string()));

    assert_eq!(channel.fetch_snapshot().await.unwrap(), slots);

    channel.send_dispense(SlotId(2), 90).await.unwrap();
    channel.send_update(SlotId(1), "Ibuprofen", 12).await.unwrap();

    let first = next_frame(&mut received).await;
    assert_eq!(first, json!({"type": "servo", "servo": 1, "open": true}));
    let second = next_frame(&mut received).await;
    assert_eq!(
        second,
        json!({"type": "updatePill", "servo": 0, "name": "Ibuprofen", "count": 12})
    );

    channel.close().await;
    assert_eq!(next_seen(&mut seen).await, Seen::Closed);
    assert!(!channel.is_open());
    assert_eq!(
        channel.send_dispense(SlotId(1), 90).await.unwrap_err(),
        TransportError::ChannelClosed
    );

    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn connection_loss_keeps_last_known_slots() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::text(
            r#"{"type":"pillData","pills":[{"name":"Iron","count":6}]}"#,
        ))
        .await
        .unwrap();
        ws.close(None).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let http = dispensekit_communication::HttpDeviceGateway::new(
        "http://127.0.0.1:9",
        Duration::from_secs(1),
    )
    .unwrap();
    let engine = Arc::new(SyncEngine::new(Arc::new(http), SyncEngineConfig::default()));
    let mut events = engine.subscribe();

    let channel = PushChannel::connect(&format!("ws://{}", addr), engine.clone(), WAIT)
        .await
        .unwrap();

    loop {
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if event == SyncEvent::ChannelClosed {
            break;
        }
    }

    assert_eq!(
        engine.records(),
        vec![SlotRecord::new(SlotId(1), "Iron", 6)]
    );
    assert!(!channel.is_open());
    drop(channel);
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, _seen) = mpsc::unbounded_channel();
    let result = PushChannel::connect(
        &format!("ws://{}", addr),
        Arc::new(RecordingSink(tx)),
        WAIT,
    )
    .await;

    assert!(matches!(
        result,
        Err(TransportError::ConnectionFailed { .. })
    ));
}
