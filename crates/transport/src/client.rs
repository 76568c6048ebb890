use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use scribe_pipeline::VoiceSegment;

use crate::protocol::{ClientMessage, WorkerMessage, PROTOCOL_VERSION};
use crate::TransportError;

/// Fixed backoff between reconnect attempts while the session is alive.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Bounded outbound queue; overflow drops segments rather than buffering
/// unbounded audio in memory.
const OUTBOUND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

/// Events surfaced to the session coordinator.
#[derive(Debug)]
pub enum InferenceEvent {
    Connected,
    Disconnected,
    Transcription(crate::protocol::Transcription),
    WorkerError(crate::protocol::WorkerError),
}

/// Message-oriented client to the ASR worker.
///
/// Owns exactly one logical connection for the lifetime of a session.
/// The connection task reconnects with a fixed backoff; anything queued
/// or in flight when the link drops is lost and never resubmitted, so a
/// worker outage shows up as a gap in segment indices, not as duplicate
/// or reordered log entries.
pub struct InferenceClient {
    outbound_tx: mpsc::Sender<ClientMessage>,
    connected: Arc<AtomicBool>,
    task: AbortHandle,
}

impl InferenceClient {
    /// Spawns the connection task. Returns the client handle and the
    /// event stream for the coordinator.
    pub fn connect(url: String) -> (Self, mpsc::Receiver<InferenceEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_loop(
            url,
            outbound_rx,
            event_tx,
            Arc::clone(&connected),
        ))
        .abort_handle();

        (
            Self {
                outbound_tx,
                connected,
                task,
            },
            event_rx,
        )
    }

    /// Best-effort enqueue of a finalized segment. Dropped with a
    /// warning when the link is down or the queue is full; the session
    /// log stays consistent either way.
    pub fn send_segment(&self, segment: &VoiceSegment) {
        if !self.connected.load(Ordering::Acquire) {
            warn!(
                participant = %segment.participant_id,
                index = segment.index,
                "inference link down, dropping segment"
            );
            return;
        }

        let msg = ClientMessage::audio_segment(segment);
        if self.outbound_tx.try_send(msg).is_err() {
            warn!(
                participant = %segment.participant_id,
                index = segment.index,
                "outbound queue full, dropping segment"
            );
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Tears down the connection task. In-flight sends are dropped.
    pub fn stop(&self) {
        self.task.abort();
        self.connected.store(false, Ordering::Release);
    }
}

impl Drop for InferenceClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connection_loop(
    url: String,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    event_tx: mpsc::Sender<InferenceEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                info!(%url, "inference worker connected");
                connected.store(true, Ordering::Release);
                if event_tx.send(InferenceEvent::Connected).await.is_err() {
                    return;
                }

                let reason = drive(ws, &mut outbound_rx, &event_tx).await;

                connected.store(false, Ordering::Release);
                match reason {
                    Ok(()) => {
                        // Coordinator went away; nothing left to serve.
                        return;
                    }
                    Err(TransportError::ProtocolViolation(detail)) => {
                        warn!(%detail, "protocol violation, reconnecting");
                    }
                    Err(TransportError::Disconnected) => {
                        warn!("inference worker disconnected");
                    }
                }
                if event_tx.send(InferenceEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "inference worker unreachable");
            }
        }

        // Jobs queued while the link was down are stale by the time we
        // reconnect; drop them rather than resubmitting old audio.
        let mut dropped = 0usize;
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "discarded segments queued across reconnect");
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Pumps one live connection. Returns `Ok(())` when the coordinator side
/// has gone away, `Err` with the reason the connection ended otherwise.
async fn drive(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    event_tx: &mpsc::Sender<InferenceEvent>,
) -> Result<(), TransportError> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(msg) = outbound else {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "unserializable outbound message, dropped");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    return Err(TransportError::Disconnected);
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let event = parse_worker_message(&text)?;
                        if event_tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            return Err(TransportError::Disconnected);
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Err(TransportError::ProtocolViolation(
                            "unexpected binary frame".into(),
                        ));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(TransportError::Disconnected);
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        return Err(TransportError::Disconnected);
                    }
                }
            }
        }
    }
}

fn parse_worker_message(text: &str) -> Result<InferenceEvent, TransportError> {
    let msg: WorkerMessage = serde_json::from_str(text)
        .map_err(|e| TransportError::ProtocolViolation(format!("unparsable message: {e}")))?;

    match msg {
        WorkerMessage::Transcription(t) => {
            if t.v != PROTOCOL_VERSION {
                return Err(TransportError::ProtocolViolation(format!(
                    "unsupported protocol version {}",
                    t.v
                )));
            }
            Ok(InferenceEvent::Transcription(t))
        }
        WorkerMessage::Error(e) => {
            if e.v != PROTOCOL_VERSION {
                return Err(TransportError::ProtocolViolation(format!(
                    "unsupported protocol version {}",
                    e.v
                )));
            }
            Ok(InferenceEvent::WorkerError(e))
        }
    }
}
