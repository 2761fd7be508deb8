//! WebSocket link to the desktop agent
//!
//! The engine connects outward as a WebSocket **client** to the desktop
//! agent that performs app, system, keyboard and mouse commands.
//!
//! Protocol:
//! - `{"type":"auth_hello","auth_token":...}` right after connecting
//! - `{"type":"command","id":...,"command":...,"params":{...}}` per command
//! - `{"type":"ack","id":...,"success":bool,"error":...}` back from the agent
//! - `{"type":"ping"}` answered with `{"type":"pong"}`
//!
//! Commands are matched to acks by correlation id. A command whose ack does
//! not arrive in time fails; its pending entry is dropped either way.

use async_trait::async_trait;
use futures::stream::StreamExt;
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sdk::errors::EngineError;
use sdk::ports::{DesktopAck, DesktopChannel};

use crate::config::DesktopConfig;

/// Buffer for frames waiting to be written to the socket
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Frame sent to the desktop agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Sent immediately after connecting to authenticate
    AuthHello {
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_token: Option<String>,
    },
    /// A command awaiting acknowledgement
    Command {
        id: String,
        command: String,
        params: serde_json::Value,
    },
    /// Reply to an agent ping
    Pong,
}

/// Frame received from the desktop agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Ack {
        id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Ping,
}

type PendingAcks = HashMap<String, oneshot::Sender<DesktopAck>>;

/// Request/acknowledge client for the desktop agent
#[derive(Clone)]
pub struct DesktopLink {
    outbound: mpsc::Sender<OutboundFrame>,
    pending: Arc<Mutex<PendingAcks>>,
    connected: Arc<AtomicBool>,
}

/// Drops a command's pending entry when its send completes or is abandoned
struct PendingGuard<'a> {
    link: &'a DesktopLink,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.link.lock_pending().remove(&self.id);
    }
}

impl DesktopLink {
    /// Create a link whose frames are delivered to the returned receiver
    ///
    /// The caller owns the transport: it writes the frames out and feeds
    /// replies back through [`DesktopLink::handle_inbound`]. The link starts
    /// out connected.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let link = Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
        };
        (link, rx)
    }

    /// Connect to the desktop agent over WebSocket
    ///
    /// Spawns an auto-reconnect loop in the background. Commands fail with
    /// `DesktopUnavailable` while the socket is down.
    pub fn connect(config: DesktopConfig) -> Self {
        let (link, rx) = Self::new(OUTBOUND_BUFFER_SIZE);
        link.connected.store(false, Ordering::SeqCst);

        tokio::spawn(reconnect_loop(config, link.clone(), rx));

        link
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingAcks> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of commands still waiting for an ack
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Process one text frame from the agent
    ///
    /// Returns the frame to send back, if any.
    pub fn handle_inbound(&self, text: &str) -> Option<OutboundFrame> {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to parse desktop frame: {} (raw: {})", e, text);
                return None;
            }
        };

        match frame {
            InboundFrame::Ack { id, success, error } => {
                match self.lock_pending().remove(&id) {
                    Some(responder) => {
                        let _ = responder.send(DesktopAck { id, success, error });
                    }
                    None => debug!("Ack for unknown or expired command {}", id),
                }
                None
            }
            InboundFrame::Ping => Some(OutboundFrame::Pong),
        }
    }

    /// Fail every command still waiting for an ack
    fn fail_pending(&self) {
        let dropped = {
            let mut pending = self.lock_pending();
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            warn!("Desktop link lost with {} commands unacknowledged", dropped);
        }
    }
}

#[async_trait]
impl DesktopChannel for DesktopLink {
    async fn send(
        &self,
        command: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<DesktopAck, EngineError> {
        if !self.is_connected() {
            return Err(EngineError::DesktopUnavailable);
        }

        let id = format!("cmd-{}", Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);
        let _guard = PendingGuard {
            link: self,
            id: id.clone(),
        };

        debug!("Desktop command {} ({})", command, id);
        let frame = OutboundFrame::Command {
            id,
            command: command.to_string(),
            params,
        };
        if self.outbound.send(frame).await.is_err() {
            return Err(EngineError::DesktopUnavailable);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(_)) => Err(EngineError::Desktop(
                "connection lost before acknowledgement".to_string(),
            )),
            Err(_) => Err(EngineError::AckTimeout {
                command: command.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// Auto-reconnect loop. Keeps trying to maintain a connection.
async fn reconnect_loop(
    config: DesktopConfig,
    link: DesktopLink,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) {
    loop {
        info!("Desktop link connecting to {}", config.url);

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Desktop link connected to {}", config.url);

                let (mut write, mut read) = ws_stream.split();

                let hello = OutboundFrame::AuthHello {
                    auth_token: config.auth_token.clone(),
                };
                if let Ok(json) = serde_json::to_string(&hello) {
                    if let Err(e) = write.send(WsMessage::Text(json)).await {
                        warn!("Failed to send auth hello: {}", e);
                    }
                }
                link.set_connected(true);

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(WsMessage::Text(text))) => {
                                    if let Some(reply) = link.handle_inbound(&text) {
                                        if let Ok(json) = serde_json::to_string(&reply) {
                                            if let Err(e) = write.send(WsMessage::Text(json)).await {
                                                warn!("Failed to send reply: {}", e);
                                                break;
                                            }
                                        }
                                    }
                                }
                                Some(Ok(WsMessage::Ping(data))) => {
                                    let _ = write.send(WsMessage::Pong(data)).await;
                                }
                                Some(Ok(WsMessage::Close(_))) | None => {
                                    info!("Desktop link closed by agent");
                                    break;
                                }
                                Some(Err(e)) => {
                                    warn!("Desktop link read error: {}", e);
                                    break;
                                }
                                _ => {} // Binary, Pong, Frame: ignore
                            }
                        }
                        frame = outbound_rx.recv() => {
                            match frame {
                                Some(frame) => {
                                    if let Ok(json) = serde_json::to_string(&frame) {
                                        if let Err(e) = write.send(WsMessage::Text(json)).await {
                                            warn!("Failed to send desktop frame: {}", e);
                                            break;
                                        }
                                    }
                                }
                                None => {
                                    info!("Desktop link dropped, stopping");
                                    return;
                                }
                            }
                        }
                    }
                }

                link.set_connected(false);
                link.fail_pending();
            }
            Err(e) => {
                error!("Desktop link failed to connect: {}", e);
            }
        }

        info!(
            "Desktop link reconnecting in {}s...",
            config.reconnect_delay_secs
        );
        tokio::time::sleep(Duration::from_secs(config.reconnect_delay_secs)).await;
    }
}
