//! WebSocket connection manager
//!
//! Owns the single logical connection to the assistant service.
//!
//! # Connection Flow
//!
//! 1. `open()` - Establish the WebSocket (once per session lifetime) and
//!    immediately request the initial video frame
//! 2. `send()` - Fire-and-forget outbound events (dropped when not open)
//! 3. `take_events()` - Hand the decoded inbound stream to the dispatcher
//! 4. `close()` - Release the socket unconditionally
//!
//! There is no automatic reconnect: a lost connection leaves the manager
//! `closed` and every later send is a silent no-op until the application
//! decides otherwise.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use super::protocol::{ClientEvent, ServerEvent};
use super::ConnectionError;

type WsSink =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Observable state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
}

/// The single logical connection to the assistant service.
///
/// At most one live socket exists at a time; only this manager opens or
/// closes it.
pub struct Connection {
    status: Arc<Mutex<ConnectionStatus>>,
    write: Arc<tokio::sync::Mutex<Option<WsSink>>>,
    /// Taken by `open()`; doubles as the once-only guard. When the receiver
    /// task ends (or open fails) the sender drops, which closes the inbound
    /// stream and lets the dispatcher observe the loss.
    inbound_tx: Mutex<Option<mpsc::Sender<ServerEvent>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<ServerEvent>>>,
    receiver_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Connection {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        Self {
            status: Arc::new(Mutex::new(ConnectionStatus::Closed)),
            write: Arc::new(tokio::sync::Mutex::new(None)),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            receiver_task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    /// Take ownership of the decoded inbound event stream.
    ///
    /// The session's dispatcher holds this for the lifetime of the session;
    /// the stream ends when the connection is lost or closed.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.inbound_rx.lock().unwrap().take()
    }

    /// Establish the connection.
    ///
    /// A no-op if `open()` was already called (whether the connection is
    /// still connecting, open, or has since been lost): establishing happens
    /// exactly once per session lifetime, and reconnection is an explicit
    /// external decision.
    ///
    /// On success the status becomes `open`, a background task starts
    /// decoding inbound frames, and one `request_frame` event is sent.
    pub async fn open(&self, url: &str) -> Result<(), ConnectionError> {
        let Some(inbound_tx) = self.inbound_tx.lock().unwrap().take() else {
            log::debug!("open ignored: connection was already opened");
            return Ok(());
        };

        *self.status.lock().unwrap() = ConnectionStatus::Connecting;
        log::info!("Connecting to assistant service at {}", url);

        let (ws_stream, _response) = match connect_async(url).await {
            Ok(pair) => pair,
            Err(e) => {
                // inbound_tx drops here, ending the dispatcher's stream.
                *self.status.lock().unwrap() = ConnectionStatus::Closed;
                return Err(ConnectionError::OpenFailed(e.to_string()));
            }
        };

        let (write, mut read) = ws_stream.split();
        *self.write.lock().await = Some(write);
        *self.status.lock().unwrap() = ConnectionStatus::Open;
        log::info!("Connection open");

        let status = self.status.clone();
        let task = tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if inbound_tx.send(event).await.is_err() {
                                    log::debug!("Inbound channel closed");
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Dropping undecodable frame: {}", e),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Connection closed by server");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Connection error: {}", e);
                        break;
                    }
                    _ => {} // Ignore ping/pong/binary
                }
            }
            *status.lock().unwrap() = ConnectionStatus::Closed;
            log::debug!("Receiver task exiting");
        });
        *self.receiver_task.lock().unwrap() = Some(task);

        // The service pushes frames only on request; ask for the first one
        // as soon as the connection is up.
        self.send(ClientEvent::RequestFrame).await;

        Ok(())
    }

    /// Fire-and-forget send.
    ///
    /// Dropped silently (debug-logged) unless the connection is open; events
    /// are never queued for later delivery. A transport error during the send
    /// marks the connection closed.
    pub async fn send(&self, event: ClientEvent) {
        if self.status() != ConnectionStatus::Open {
            log::debug!(
                "Dropping outbound {} event: connection not open",
                event.channel()
            );
            return;
        }

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to encode outbound event: {}", e);
                return;
            }
        };

        let mut write = self.write.lock().await;
        if let Some(sink) = write.as_mut() {
            if let Err(e) = sink.send(Message::Text(json)).await {
                log::warn!("Send failed, connection is closed: {}", e);
                *self.status.lock().unwrap() = ConnectionStatus::Closed;
            }
        }
    }

    /// Tear the connection down.
    ///
    /// The socket resource is released unconditionally; an in-flight send
    /// finishes first (the write half is mutex-guarded), then the sink is
    /// dropped.
    pub async fn close(&self) {
        if let Some(task) = self.receiver_task.lock().unwrap().take() {
            task.abort();
        }

        let mut write = self.write.lock().await;
        if let Some(mut sink) = write.take() {
            if let Err(e) = sink.close().await {
                log::warn!("Error closing socket: {}", e);
            }
        }

        *self.status.lock().unwrap() = ConnectionStatus::Closed;
        log::info!("Connection closed");
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Ensure the receiver task is aborted if the connection is dropped
        // without close().
        if let Some(task) = self.receiver_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_while_never_opened_is_dropped() {
        let connection = Connection::new();
        assert_eq!(connection.status(), ConnectionStatus::Closed);

        // Must be a silent no-op, not a panic or an error.
        connection.send(ClientEvent::chat("hello")).await;
        assert_eq!(connection.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn open_failure_marks_connection_closed() {
        let connection = Connection::new();

        // Nothing listens on this port; the handshake is refused.
        let result = connection.open("ws://127.0.0.1:1/ws").await;
        assert!(result.is_err());
        assert_eq!(connection.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn second_open_is_a_no_op() {
        let connection = Connection::new();

        let _ = connection.open("ws://127.0.0.1:1/ws").await;
        // Establishing happens once per lifetime; a later call neither
        // reconnects nor errors.
        assert!(connection.open("ws://127.0.0.1:1/ws").await.is_ok());
        assert_eq!(connection.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn close_without_open_is_safe() {
        let connection = Connection::new();
        connection.close().await;
        assert_eq!(connection.status(), ConnectionStatus::Closed);
    }
}
