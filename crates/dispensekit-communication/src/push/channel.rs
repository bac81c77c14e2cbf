//! WebSocket push channel
//!
//! One reader task dispatches inbound frames to a [`PushSink`]; one writer
//! task drains an outbound queue. A dropped connection is reported once via
//! [`PushSink::on_closed`] and is not re-established.

use super::envelope::{pushed_to_raw, InboundEnvelope, OutboundEnvelope};
use crate::gateway::{Ack, DeviceGateway};
use async_trait::async_trait;
use dispensekit_core::{PushSink, RawSlot, SlotId, TransportError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Default time allowed for the WebSocket handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the close handshake before tasks are aborted
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live connection to the device's push endpoint
pub struct PushChannel {
    /// Endpoint URL
    url: String,
    /// Outbound frame queue drained by the writer task
    outbound: mpsc::UnboundedSender<Message>,
    /// Last slot list pushed by the device
    latest: watch::Receiver<Option<Vec<RawSlot>>>,
    /// Cleared once the reader stops
    open: Arc<AtomicBool>,
    /// Handshake and snapshot wait timeout
    timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    /// Connect to `url` and start dispatching inbound frames to `sink`
    pub async fn connect(
        url: &str,
        sink: Arc<dyn PushSink>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        tracing::info!("Connecting push channel to {}", url);

        let (stream, _response) = match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => {
                tracing::error!("Push channel connect to {} failed: {}", url, e);
                return Err(TransportError::connection(e.to_string()));
            }
            Err(_) => {
                tracing::error!("Push channel connect to {} timed out", url);
                return Err(TransportError::Timeout {
                    timeout_ms: connect_timeout.as_millis() as u64,
                });
            }
        };

        let (write_half, read_half) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (latest_tx, latest) = watch::channel(None);
        let open = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(send_task(write_half, outbound_rx));
        let reader = tokio::spawn(receive_task(read_half, sink, latest_tx, open.clone()));

        tracing::info!("Push channel connected to {}", url);
        Ok(Self {
            url: url.to_string(),
            outbound,
            latest,
            open,
            timeout: connect_timeout,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the reader is still receiving
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Last slot list pushed by the device, if any
    pub fn latest_slots(&self) -> Option<Vec<RawSlot>> {
        self.latest.borrow().clone()
    }

    /// Queue a frame for the device
    pub fn send(&self, envelope: OutboundEnvelope) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ChannelClosed);
        }
        let text = envelope
            .to_text()
            .map_err(|e| TransportError::malformed(e.to_string()))?;
        tracing::debug!("Push channel send: {}", text);
        self.outbound
            .send(Message::text(text))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Close the connection and wait for both tasks to finish
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));

        let writer = self.writer.lock().take();
        if let Some(mut handle) = writer {
            if timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let reader = self.reader.lock().take();
        if let Some(mut handle) = reader {
            if timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                tracing::warn!("Push channel reader did not stop, aborting");
                handle.abort();
            }
        }

        self.open.store(false, Ordering::SeqCst);
        tracing::info!("Push channel to {} closed", self.url);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.writer.get_mut().take() {
            handle.abort();
        }
    }
}

async fn send_task(
    mut write: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            tracing::warn!("Push channel write failed: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

async fn receive_task(
    mut read: SplitStream<WsStream>,
    sink: Arc<dyn PushSink>,
    latest: watch::Sender<Option<Vec<RawSlot>>>,
    open: Arc<AtomicBool>,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(text.as_str(), sink.as_ref(), &latest),
            Ok(Message::Close(frame)) => {
                // Keep reading so the close reply is flushed; the stream ends after it.
                tracing::debug!("Push channel closing: {:?}", frame);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Push channel read failed: {}", e);
                break;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    sink.on_closed();
}

fn dispatch(text: &str, sink: &dyn PushSink, latest: &watch::Sender<Option<Vec<RawSlot>>>) {
    match InboundEnvelope::parse(text) {
        Ok(InboundEnvelope::Rfid { tag }) => {
            tracing::info!("RFID tag scanned: {}", tag);
            sink.on_tag(tag);
        }
        Ok(InboundEnvelope::PillData { pills }) => {
            let entries = pushed_to_raw(pills);
            tracing::debug!("Device pushed {} slot entries", entries.len());
            latest.send_replace(Some(entries.clone()));
            sink.on_slots(entries);
        }
        Err(e) => tracing::debug!("Ignoring unrecognised push frame: {}", e),
    }
}

#[async_trait]
impl DeviceGateway for PushChannel {
    /// Waits for the first pushed slot list when none has arrived yet
    async fn fetch_snapshot(&self) -> Result<Vec<RawSlot>, TransportError> {
        let mut latest = self.latest.clone();
        let waited = timeout(self.timeout, async move {
            latest
                .wait_for(Option::is_some)
                .await
                .map(|slots| slots.clone())
                .ok()
                .flatten()
        })
        .await;

        match waited {
            Ok(Some(slots)) => Ok(slots),
            Ok(None) => Err(TransportError::ChannelClosed),
            Err(_) => Err(TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn send_dispense(&self, slot: SlotId, _angle: u16) -> Result<Ack, TransportError> {
        self.send(OutboundEnvelope::dispense(slot))?;
        Ok(Ack::new(format!("Dispense sent to slot {}", slot)))
    }

    async fn send_update(
        &self,
        slot: SlotId,
        label: &str,
        count: u32,
    ) -> Result<Ack, TransportError> {
        self.send(OutboundEnvelope::update(slot, label, count))?;
        Ok(Ack::new(format!("Update sent to slot {}", slot)))
    }

    fn name(&self) -> &str {
        "push"
    }
}
