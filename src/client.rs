//! Client connection
//!
//! A `Client` is the room's view of one connection: its id, display name
//! and the sending half of its outbound queue. The room holds the only
//! sender, so removing a client from the room closes its queue. A client
//! the room drops for falling behind is also told to disconnect, since a
//! peer that stopped reading never lets its queue drain.
//!
//! The two pumps bridge the WebSocket and the room:
//! - `read_pump`: socket → decode → stamp → room forward
//! - `write_pump`: outbound queue → encode → socket

use std::fmt::Display;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, warn};

use crate::error::SendError;
use crate::identity::Identity;
use crate::message::{ChatMessage, ClientMessage};
use crate::room::RoomHandle;
use crate::types::ClientId;

/// Receiving half of a client's outbound queue
pub type Outbound = mpsc::Receiver<Arc<ChatMessage>>;

/// Connected client as registered in a room
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Display name, for logs and traces
    pub name: String,
    /// Room → Client message queue
    sender: mpsc::Sender<Arc<ChatMessage>>,
    /// Fired when the room drops this client
    kick: Option<oneshot::Sender<()>>,
}

impl Client {
    /// Create a client and its bounded outbound queue
    pub fn new(id: ClientId, name: impl Into<String>, capacity: usize) -> (Self, Outbound) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let client = Self {
            id,
            name: name.into(),
            sender,
            kick: None,
        };
        (client, receiver)
    }

    /// Receiver that resolves once the room drops this client
    ///
    /// Resolves with an error instead if the client is removed normally.
    pub fn on_disconnect(&mut self) -> oneshot::Receiver<()> {
        let (kick, kicked) = oneshot::channel();
        self.kick = Some(kick);
        kicked
    }

    /// Tell the connection to shut down
    pub fn disconnect(&mut self) {
        if let Some(kick) = self.kick.take() {
            let _ = kick.send(());
        }
    }

    /// Enqueue without waiting
    pub fn try_send(&self, msg: Arc<ChatMessage>) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Enqueue, waiting for space
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: Arc<ChatMessage>) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Why a read pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExit {
    /// Close frame or end of stream
    Closed,
    /// Transport error or undecodable frame
    Failed,
    /// The room is gone
    RoomClosed,
}

/// Why a write pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteExit {
    /// The room closed the queue and everything queued was written
    QueueClosed,
    /// Writing to the socket failed
    WriteFailed,
}

/// Inbound pump
///
/// Reads frames until the stream ends or fails, forwarding each decoded
/// message to the room stamped with the receipt time, the sender's name
/// and the sender's avatar.
pub async fn read_pump<S>(mut stream: S, room: &RoomHandle, identity: &Identity) -> ReadExit
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let decoded = match frame {
            Ok(WsMessage::Text(text)) => ClientMessage::from_json(&text),
            Ok(WsMessage::Binary(bytes)) => ClientMessage::from_slice(&bytes),
            Ok(WsMessage::Close(_)) => {
                debug!("{} sent close frame", identity.name);
                return ReadExit::Closed;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("Read failed for {}: {}", identity.name, e);
                return ReadExit::Failed;
            }
        };

        let incoming = match decoded {
            Ok(incoming) => incoming,
            Err(e) => {
                debug!("Undecodable frame from {}: {}", identity.name, e);
                return ReadExit::Failed;
            }
        };

        let msg = ChatMessage::received(identity.name.as_str(), incoming.message);
        let msg = msg.with_avatar(resolve_avatar(room, identity).await);

        if room.forward(msg).await.is_err() {
            debug!("Room closed, ending read pump for {}", identity.name);
            return ReadExit::RoomClosed;
        }
    }

    ReadExit::Closed
}

/// Look up the sender's avatar on the blocking pool
///
/// Resolvers may touch the filesystem. Any failure leaves the avatar out.
async fn resolve_avatar(room: &RoomHandle, identity: &Identity) -> Option<String> {
    let avatars = room.avatars();
    let owner = identity.clone();
    match tokio::task::spawn_blocking(move || avatars.avatar_url(&owner)).await {
        Ok(Ok(url)) => Some(url),
        Ok(Err(e)) => {
            debug!("No avatar for {}: {}", identity.name, e);
            None
        }
        Err(e) => {
            warn!("Avatar lookup for {} failed: {}", identity.name, e);
            None
        }
    }
}

/// Outbound pump
///
/// Writes queued messages until the queue is closed, then closes the sink.
/// Messages already queued when the room closes the queue are still
/// written. Closing an already closed sink is harmless; the error is
/// ignored.
pub async fn write_pump<S>(mut sink: S, mut queue: Outbound) -> WriteExit
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let mut exit = WriteExit::QueueClosed;

    while let Some(msg) = queue.recv().await {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
            debug!("WebSocket send failed, ending write pump: {}", e);
            exit = WriteExit::WriteFailed;
            break;
        }
    }

    let _ = sink.close().await;
    exit
}
