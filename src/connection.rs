//! WebSocket connection to the backend
//!
//! Exactly one socket is opened per process. There is no reconnect, no
//! heartbeat and no buffering past the outbound channel: once the socket is
//! closed, anything submitted is dropped with a warning.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::protocol::{InboundEvent, OutboundRequest};

const CHANNEL_CAPACITY: usize = 64;

/// Where the socket is in its (single) lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "connected",
            ConnectionState::Closed => "disconnected",
        }
    }
}

/// Somewhere to put outbound requests.
pub trait Outbox: Send {
    /// Hand `request` to the transport. Never blocks; returns `false` if the
    /// request was lost.
    fn send(&self, request: OutboundRequest) -> bool;
}

/// Outbox backed by the connection's writer channel.
#[derive(Debug, Clone)]
pub struct ChannelOutbox {
    tx: mpsc::Sender<OutboundRequest>,
}

impl ChannelOutbox {
    pub fn new(tx: mpsc::Sender<OutboundRequest>) -> Self {
        Self { tx }
    }
}

impl Outbox for ChannelOutbox {
    fn send(&self, request: OutboundRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(req)) => {
                warn!("socket closed, message {} lost", req.id);
                false
            }
            Err(mpsc::error::TrySendError::Full(req)) => {
                warn!("outbound queue full, message {} lost", req.id);
                false
            }
        }
    }
}

/// The live connection: outbound sender, inbound events, state.
pub struct Connection {
    pub outbox: ChannelOutbox,
    pub inbound: mpsc::Receiver<InboundEvent>,
    pub state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Start connecting to `url` in the background.
    pub fn open(url: impl Into<String>) -> Self {
        let url = url.into();
        let (out_tx, out_rx) = mpsc::channel::<OutboundRequest>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<InboundEvent>(CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(run_socket(url, out_rx, in_tx, state_tx));

        Self {
            outbox: ChannelOutbox::new(out_tx),
            inbound: in_rx,
            state: state_rx,
            task,
        }
    }

    /// Split into the pieces the UI loop owns.
    pub fn into_parts(
        self,
    ) -> (
        ChannelOutbox,
        mpsc::Receiver<InboundEvent>,
        watch::Receiver<ConnectionState>,
        JoinHandle<()>,
    ) {
        (self.outbox, self.inbound, self.state, self.task)
    }
}

async fn run_socket(
    url: String,
    mut outbound: mpsc::Receiver<OutboundRequest>,
    inbound: mpsc::Sender<InboundEvent>,
    state: watch::Sender<ConnectionState>,
) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            error!("websocket connect to {} failed: {}", url, e);
            let _ = state.send(ConnectionState::Closed);
            // Dropping the receiver turns later sends into lost messages.
            outbound.close();
            return;
        }
    };
    info!("connected to {}", url);
    let _ = state.send(ConnectionState::Open);

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            request = outbound.recv() => {
                let Some(request) = request else {
                    debug!("outbound channel closed, shutting socket");
                    let _ = sink.close().await;
                    break;
                };
                let text = match request.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode request {}: {}", request.id, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("websocket send failed, message {} lost: {}", request.id, e);
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match InboundEvent::from_json(&text) {
                        Some(event) => {
                            if inbound.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => debug!("dropping unrecognized frame: {}", text),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("websocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    outbound.close();
    let _ = state.send(ConnectionState::Closed);
}
