//! Transport boundary between the session and the sensor endpoint.
//!
//! The sensor board pushes text frames over a WebSocket. Instead of callbacks,
//! a transport reports everything that happens on the connection as a
//! [`TransportEvent`] on an mpsc channel, which the control loop consumes next
//! to operator commands.
//!
//! A transport runs on its own detached task. The session only keeps a
//! [`ConnectionHandle`] holding the close signal; dropping the handle closes
//! the connection too.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

/// Close code reported when the client ends the connection itself.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// One text frame (or UTF-8 binary frame).
    Message(String),
    /// A failure description; a `Closed` follows when the connection is lost.
    Error(String),
    /// The connection ended. Always the last event.
    Closed {
        /// WebSocket close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason or a short description of why the stream ended.
        reason: String,
    },
}

/// Abstract duplex stream to the sensor endpoint.
///
/// `run` connects to `url`, forwards events until the connection ends or
/// `close` fires, and always finishes with exactly one
/// [`TransportEvent::Closed`]. Sending is not part of the contract.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Drive one connection to completion.
    async fn run(
        &self,
        url: String,
        events: mpsc::Sender<TransportEvent>,
        close: oneshot::Receiver<()>,
    );
}

/// Owned close signal of a running transport task.
#[derive(Debug)]
pub struct ConnectionHandle {
    close_tx: Option<oneshot::Sender<()>>,
}

impl ConnectionHandle {
    /// Spawn `transport` for `url`; events arrive on the returned receiver.
    pub fn open(
        transport: Arc<dyn Transport>,
        url: String,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(async move {
            transport.run(url, events_tx, close_rx).await;
        });
        (
            Self {
                close_tx: Some(close_tx),
            },
            events_rx,
        )
    }

    /// Ask the transport to close. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            // The task may already be gone after a remote close.
            let _ = tx.send(());
        }
    }
}

/// Prepend `ws://` to a bare `host[:port][/path]`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else {
        format!("ws://{url}")
    }
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn run(
        &self,
        url: String,
        events: mpsc::Sender<TransportEvent>,
        mut close: oneshot::Receiver<()>,
    ) {
        // The receiver may be gone if the session already stopped; nothing to do then.
        let emit = |event: TransportEvent| {
            let events = events.clone();
            async move {
                let _ = events.send(event).await;
            }
        };

        debug!("Connecting to {}", url);
        let stream = tokio::select! {
            result = connect_async(url.as_str()) => match result {
                Ok((stream, _)) => stream,
                Err(e) => {
                    emit(TransportEvent::Error(e.to_string())).await;
                    emit(TransportEvent::Closed {
                        code: None,
                        reason: "connect failed".to_string(),
                    })
                    .await;
                    return;
                }
            },
            _ = &mut close => {
                emit(TransportEvent::Closed {
                    code: Some(NORMAL_CLOSURE),
                    reason: "closed before connecting".to_string(),
                })
                .await;
                return;
            }
        };
        emit(TransportEvent::Opened).await;

        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                _ = &mut close => {
                    let _ = write.send(Message::Close(None)).await;
                    emit(TransportEvent::Closed {
                        code: Some(NORMAL_CLOSURE),
                        reason: "closed by client".to_string(),
                    })
                    .await;
                    return;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(TransportEvent::Message(text.as_str().to_owned())).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => emit(TransportEvent::Message(text.to_owned())).await,
                        Err(e) => emit(TransportEvent::Error(format!("non-UTF-8 binary frame: {e}"))).await,
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                            None => (None, String::new()),
                        };
                        emit(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        emit(TransportEvent::Error(e.to_string())).await;
                        emit(TransportEvent::Closed {
                            code: None,
                            reason: "stream error".to_string(),
                        })
                        .await;
                        return;
                    }
                    None => {
                        emit(TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        })
                        .await;
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn normalize_adds_scheme_only_when_missing() {
        assert_eq!(normalize_url("192.168.4.1/ws"), "ws://192.168.4.1/ws");
        assert_eq!(normalize_url(" ws://10.0.0.2/ws "), "ws://10.0.0.2/ws");
        assert_eq!(normalize_url("wss://sensor.local/ws"), "wss://sensor.local/ws");
    }

    #[tokio::test]
    async fn connect_failure_reports_error_then_closed() {
        // Grab a free port and release it so nothing is listening there.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (_handle, mut events) =
            ConnectionHandle::open(Arc::new(WsTransport), format!("ws://{addr}/ws"), 8);

        assert!(matches!(events.recv().await, Some(TransportEvent::Error(_))));
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Closed { code: None, .. })
        ));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn receives_text_frames_and_client_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::text("MPU6050: ax=1\nBend Sensor: 200\n"))
                .await
                .unwrap();
            // Keep the socket open until the client has closed.
            let _ = release_rx.await;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (mut handle, mut events) =
            ConnectionHandle::open(Arc::new(WsTransport), format!("ws://{addr}/ws"), 8);

        assert_eq!(events.recv().await, Some(TransportEvent::Opened));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Message(
                "MPU6050: ax=1\nBend Sensor: 200\n".to_string()
            ))
        );

        handle.close();
        handle.close();
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Closed {
                code: Some(NORMAL_CLOSURE),
                ..
            })
        ));
        let _ = release_tx.send(());
        server.await.unwrap();
    }
}
