//! Realtime channel abstraction.
//!
//! The connection manager never touches a socket directly. A
//! [`ChannelConnector`] opens a channel and hands back a pair of queues:
//! lifecycle events and inbound frames arrive on `incoming`, outbound text
//! goes into `outgoing`. Dropping `outgoing` closes the channel.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle and data events produced by an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame.
    Message(String),
    /// The channel reported an error. Connectors that lose the underlying
    /// transport follow it with `Closed`; a later `Message` means the
    /// channel survived.
    Error(String),
    /// The channel is gone.
    Closed { code: Option<u16>, reason: String },
}

/// An open realtime channel.
#[derive(Debug)]
pub struct RealtimeChannel {
    pub incoming: mpsc::UnboundedReceiver<ChannelEvent>,
    pub outgoing: mpsc::UnboundedSender<String>,
}

impl RealtimeChannel {
    /// Creates a connected pair: the channel handed to the manager and the
    /// far-end queues feeding it.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<ChannelEvent>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        (
            Self {
                incoming: incoming_rx,
                outgoing: outgoing_tx,
            },
            incoming_tx,
            outgoing_rx,
        )
    }
}

/// Opens realtime channels.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Opens a channel to `url`. Resolves once the channel is open.
    async fn open(&self, url: &Url) -> SyncResult<RealtimeChannel>;
}

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, url: &Url) -> SyncResult<RealtimeChannel> {
        debug!("Opening WebSocket to {}{}", url.origin().ascii_serialization(), url.path());
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::Http(response) => SyncError::Http {
                    status: response.status().as_u16(),
                    body: "WebSocket upgrade rejected".to_string(),
                },
                other => SyncError::Network(format!("WebSocket connect failed: {other}")),
            })?;

        let (channel, incoming_tx, outgoing_rx) = RealtimeChannel::pair();
        tokio::spawn(pump(ws, incoming_tx, outgoing_rx));
        Ok(channel)
    }
}

/// Bridges one socket to the channel queues until either side goes away.
async fn pump(
    ws: WsStream,
    incoming: mpsc::UnboundedSender<ChannelEvent>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = incoming.closed() => {
                let _ = sink.close().await;
                return;
            }

            out = outgoing.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!("WebSocket send failed: {}", e);
                        let _ = incoming.send(ChannelEvent::Error(e.to_string()));
                        let _ = incoming.send(ChannelEvent::Closed { code: None, reason: e.to_string() });
                        return;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = incoming.send(ChannelEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        let _ = incoming.send(ChannelEvent::Message(text));
                    }
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, "server closed connection".to_string()),
                    };
                    let _ = incoming.send(ChannelEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = incoming.send(ChannelEvent::Error(e.to_string()));
                    let _ = incoming.send(ChannelEvent::Closed { code: None, reason: e.to_string() });
                    return;
                }
                None => {
                    let _ = incoming.send(ChannelEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}

/// Scripted connector for tests.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    enum Outcome {
        Accept(RealtimeChannel),
        Fail(String),
        Hang,
    }

    /// The server side of a mock channel.
    pub struct MockRemote {
        events: mpsc::UnboundedSender<ChannelEvent>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    impl MockRemote {
        /// Pushes a raw text frame to the client.
        pub fn push(&self, text: impl Into<String>) {
            let _ = self.events.send(ChannelEvent::Message(text.into()));
        }

        /// Pushes a JSON frame to the client.
        pub fn push_json(&self, value: &serde_json::Value) {
            self.push(value.to_string());
        }

        /// Reports a channel error (without closing).
        pub fn error(&self, reason: impl Into<String>) {
            let _ = self.events.send(ChannelEvent::Error(reason.into()));
        }

        /// Closes the channel from the server side.
        pub fn close(&self) {
            let _ = self.events.send(ChannelEvent::Closed {
                code: Some(1006),
                reason: "closed by mock".to_string(),
            });
        }

        /// Next message the client sent, if any.
        pub fn try_recv_sent(&mut self) -> Option<String> {
            self.sent.try_recv().ok()
        }

        /// Waits for the next message the client sends.
        pub async fn recv_sent(&mut self) -> Option<String> {
            self.sent.recv().await
        }
    }

    /// A connector whose open outcomes are queued up front. With nothing
    /// queued, every open fails.
    #[derive(Default)]
    pub struct MockConnector {
        script: Mutex<VecDeque<Outcome>>,
        attempts: Mutex<Vec<(Instant, Url)>>,
    }

    impl MockConnector {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Next open succeeds; returns the far end.
        pub fn accept_next(&self) -> MockRemote {
            let (channel, events, sent) = RealtimeChannel::pair();
            self.script.lock().unwrap().push_back(Outcome::Accept(channel));
            MockRemote { events, sent }
        }

        /// Next open fails.
        pub fn fail_next(&self, reason: impl Into<String>) {
            self.script
                .lock()
                .unwrap()
                .push_back(Outcome::Fail(reason.into()));
        }

        /// Next open never resolves.
        pub fn hang_next(&self) {
            self.script.lock().unwrap().push_back(Outcome::Hang);
        }

        /// Number of open attempts so far.
        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }

        /// When each open attempt happened.
        pub fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }

        /// Gaps between consecutive attempts.
        pub fn attempt_gaps(&self) -> Vec<std::time::Duration> {
            self.attempt_times()
                .windows(2)
                .map(|w| w[1].duration_since(w[0]))
                .collect()
        }

        /// URLs the client tried to open.
        pub fn attempt_urls(&self) -> Vec<Url> {
            self.attempts.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl ChannelConnector for MockConnector {
        async fn open(&self, url: &Url) -> SyncResult<RealtimeChannel> {
            self.attempts
                .lock()
                .unwrap()
                .push((Instant::now(), url.clone()));
            let outcome = self.script.lock().unwrap().pop_front();
            match outcome {
                Some(Outcome::Accept(channel)) => Ok(channel),
                Some(Outcome::Fail(reason)) => Err(SyncError::Network(reason)),
                Some(Outcome::Hang) => futures::future::pending().await,
                None => Err(SyncError::Network("connection refused".to_string())),
            }
        }
    }
}
