//! Room actor implementation
//!
//! The room owns its membership map and nothing else touches it. Joins,
//! leaves and messages to broadcast all arrive through one mailbox and are
//! handled one at a time by `Room::run`, so there is no lock around the
//! map. Connection tasks only ever hold a `RoomHandle`.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::avatar::{Avatar, TryAvatars};
use crate::client::{read_pump, write_pump, Client};
use crate::error::{AppError, SendError};
use crate::identity::Identity;
use crate::message::ChatMessage;
use crate::trace::{self, Tracer};
use crate::types::ClientId;

/// Default outbound queue capacity per client
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default room mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// What the room does when a client's outbound queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backpressure {
    /// Drop the client: remove it from the room and close its queue.
    /// Everyone else still gets the message.
    #[default]
    Disconnect,
    /// Wait for space. One stuck client stalls the whole room.
    Block,
}

/// Room tuning
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Outbound queue capacity per client
    pub queue_capacity: usize,
    /// Mailbox capacity of the coordination loop
    pub mailbox_capacity: usize,
    /// Full-queue policy
    pub backpressure: Backpressure,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            backpressure: Backpressure::default(),
        }
    }
}

/// Events sent from connections to the room
#[derive(Debug)]
pub enum RoomEvent {
    /// Client wants to join
    Join(Client),
    /// Client is leaving
    Leave(ClientId),
    /// Message to broadcast
    Forward(Arc<ChatMessage>),
    /// Snapshot of current membership
    Members(oneshot::Sender<Vec<ClientId>>),
}

/// The room actor
///
/// Created with `Room::new`, which also returns the handle connections use
/// to talk to it. Spawn `run` once before accepting any connection.
pub struct Room {
    /// Current members: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Event receiver
    mailbox: mpsc::Receiver<RoomEvent>,
    /// Activity sink
    tracer: Box<dyn Tracer>,
    /// Full-queue policy
    backpressure: Backpressure,
}

impl Room {
    /// Create a room and its handle
    pub fn new(config: RoomConfig) -> (Self, RoomHandle) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        let room = Self {
            clients: HashMap::new(),
            mailbox,
            tracer: Box::new(trace::off()),
            backpressure: config.backpressure,
        };
        let handle = RoomHandle {
            mailbox: sender,
            avatars: Arc::new(TryAvatars::default()),
            queue_capacity: config.queue_capacity.max(1),
        };
        (room, handle)
    }

    /// Replace the default no-op tracer
    pub fn with_tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Run the coordination loop
    ///
    /// Handles events one at a time until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Room started ({:?} on full queue)", self.backpressure);

        while let Some(event) = self.mailbox.recv().await {
            self.handle_event(event).await;
        }

        info!("Room shutting down");
    }

    /// Process a single event
    async fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join(client) => self.handle_join(client),
            RoomEvent::Leave(client_id) => self.handle_leave(client_id),
            RoomEvent::Forward(msg) => self.handle_forward(msg).await,
            RoomEvent::Members(reply) => {
                let _ = reply.send(self.clients.keys().copied().collect());
            }
        }
    }

    fn handle_join(&mut self, client: Client) {
        debug!("Client {} ({}) joined", client.id, client.name);
        self.clients.insert(client.id, client);
        self.tracer.trace(&[&"New client joined"]);
    }

    fn handle_leave(&mut self, client_id: ClientId) {
        // Dropping the entry drops the only queue sender, which ends the
        // client's write pump once it has drained.
        if self.clients.remove(&client_id).is_some() {
            debug!("Client {} left", client_id);
            self.tracer.trace(&[&"Client left"]);
        }
    }

    async fn handle_forward(&mut self, msg: Arc<ChatMessage>) {
        self.tracer.trace(&[&"Message received: ", &msg.message]);

        let mut dropped = Vec::new();
        for client in self.clients.values() {
            let result = match self.backpressure {
                Backpressure::Disconnect => client.try_send(Arc::clone(&msg)),
                Backpressure::Block => client.send(Arc::clone(&msg)).await,
            };
            match result {
                Ok(()) => self.tracer.trace(&[&" -- sent to client"]),
                Err(SendError::QueueFull) => {
                    warn!("Queue full for {} ({}), disconnecting", client.id, client.name);
                    dropped.push(client.id);
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Queue closed for {}", client.id);
                    dropped.push(client.id);
                }
            }
        }

        for client_id in dropped {
            if let Some(mut client) = self.clients.remove(&client_id) {
                client.disconnect();
                self.tracer.trace(&[&"Client dropped"]);
            }
        }
    }
}

/// Which side of a connection finished first
enum PumpEnd {
    Read,
    Write,
    Kicked,
}

/// Cloneable handle to a running room
///
/// Everything a connection needs: the room's mailbox, the avatar
/// resolvers and the per-client queue size.
#[derive(Clone)]
pub struct RoomHandle {
    mailbox: mpsc::Sender<RoomEvent>,
    avatars: Arc<dyn Avatar>,
    queue_capacity: usize,
}

impl RoomHandle {
    /// Use `avatars` to decorate messages from this room's clients
    pub fn with_avatars(mut self, avatars: impl Avatar + 'static) -> Self {
        self.avatars = Arc::new(avatars);
        self
    }

    /// Avatar resolvers for this room
    pub fn avatars(&self) -> Arc<dyn Avatar> {
        Arc::clone(&self.avatars)
    }

    /// Outbound queue capacity for new clients
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Submit a join event
    pub async fn join(&self, client: Client) -> Result<(), AppError> {
        self.send(RoomEvent::Join(client)).await
    }

    /// Submit a leave event. Leaving a room you are not in is a no-op.
    pub async fn leave(&self, client_id: ClientId) -> Result<(), AppError> {
        self.send(RoomEvent::Leave(client_id)).await
    }

    /// Submit a message for broadcast to every member, sender included
    pub async fn forward(&self, msg: ChatMessage) -> Result<(), AppError> {
        self.send(RoomEvent::Forward(Arc::new(msg))).await
    }

    /// Current members, as seen by the coordination loop
    pub async fn members(&self) -> Result<Vec<ClientId>, AppError> {
        let (reply, members) = oneshot::channel();
        self.send(RoomEvent::Members(reply)).await?;
        members.await.map_err(|_| AppError::RoomClosed)
    }

    async fn send(&self, event: RoomEvent) -> Result<(), AppError> {
        self.mailbox
            .send(event)
            .await
            .map_err(|_| AppError::RoomClosed)
    }

    /// Serve one upgraded connection
    ///
    /// Joins the room, runs the write pump on its own task and the read
    /// pump on this one. Returns once the client is gone and its socket
    /// has been closed.
    pub async fn accept<S>(&self, ws: WebSocketStream<S>, identity: Identity) -> Result<(), AppError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut client, queue) =
            Client::new(ClientId::new(), identity.name.as_str(), self.queue_capacity);
        let client_id = client.id;
        let mut kicked = client.on_disconnect();
        self.join(client).await?;
        info!("{} joined as {}", identity.name, client_id);

        let (ws_sender, ws_receiver) = ws.split();
        let mut writer = tokio::spawn(write_pump(ws_sender, queue));

        let ended = tokio::select! {
            exit = read_pump(ws_receiver, self, &identity) => {
                debug!("Read pump for {} ended: {:?}", client_id, exit);
                PumpEnd::Read
            }
            exit = &mut writer => {
                debug!("Write pump for {} ended first: {:?}", client_id, exit);
                PumpEnd::Write
            }
            Ok(()) = &mut kicked => PumpEnd::Kicked,
        };

        let left = self.leave(client_id).await;

        match ended {
            PumpEnd::Read => match writer.await {
                Ok(exit) => debug!("Write pump for {} ended: {:?}", client_id, exit),
                Err(e) => warn!("Write pump for {} panicked: {}", client_id, e),
            },
            PumpEnd::Write => {}
            PumpEnd::Kicked => {
                // The writer may be parked on a peer that stopped reading.
                // Aborting it drops the last half of the socket.
                warn!("{} ({}) dropped by the room", identity.name, client_id);
                writer.abort();
                let _ = writer.await;
            }
        }

        info!("{} ({}) disconnected", identity.name, client_id);
        left
    }
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Tracer for Recorder {
        fn trace(&self, args: &[&dyn std::fmt::Display]) {
            let line: String = args.iter().map(|a| a.to_string()).collect();
            self.0.lock().unwrap().push(line);
        }
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn msg(text: &str) -> ChatMessage {
        ChatMessage::received("Alice", text)
    }

    #[tokio::test]
    async fn test_join_and_leave_update_membership() {
        let (mut room, _handle) = Room::new(RoomConfig::default());
        let (client, _rx) = Client::new(ClientId::new(), "Alice", 8);
        let id = client.id;

        room.handle_event(RoomEvent::Join(client)).await;
        assert!(room.clients.contains_key(&id));

        room.handle_event(RoomEvent::Leave(id)).await;
        assert!(room.clients.is_empty());
    }

    #[tokio::test]
    async fn test_leave_closes_queue() {
        let (mut room, _handle) = Room::new(RoomConfig::default());
        let (client, mut rx) = Client::new(ClientId::new(), "Alice", 8);
        let id = client.id;

        room.handle_event(RoomEvent::Join(client)).await;
        room.handle_event(RoomEvent::Forward(Arc::new(msg("bye")))).await;
        room.handle_event(RoomEvent::Leave(id)).await;

        assert_eq!(rx.recv().await.unwrap().message, "bye");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_leave_unknown_client_is_noop() {
        let recorder = Arc::new(Recorder::default());
        let (room, _handle) = Room::new(RoomConfig::default());
        let mut room = room.with_tracer(Arc::clone(&recorder));
        let (client, _rx) = Client::new(ClientId::new(), "Alice", 8);
        let id = client.id;

        room.handle_event(RoomEvent::Join(client)).await;
        room.handle_event(RoomEvent::Leave(ClientId::new())).await;
        room.handle_event(RoomEvent::Leave(id)).await;
        room.handle_event(RoomEvent::Leave(id)).await;

        assert!(room.clients.is_empty());
        assert_eq!(recorder.lines(), vec!["New client joined", "Client left"]);
    }

    #[tokio::test]
    async fn test_forward_traces_each_delivery() {
        let recorder = Arc::new(Recorder::default());
        let (room, _handle) = Room::new(RoomConfig::default());
        let mut room = room.with_tracer(Arc::clone(&recorder));
        let (alice, _alice_rx) = Client::new(ClientId::new(), "Alice", 8);
        let (bob, _bob_rx) = Client::new(ClientId::new(), "Bob", 8);

        room.handle_event(RoomEvent::Join(alice)).await;
        room.handle_event(RoomEvent::Join(bob)).await;
        room.handle_event(RoomEvent::Forward(Arc::new(msg("hi")))).await;

        assert_eq!(
            recorder.lines(),
            vec![
                "New client joined",
                "New client joined",
                "Message received: hi",
                " -- sent to client",
                " -- sent to client",
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_drops_client_with_closed_queue() {
        let (mut room, _handle) = Room::new(RoomConfig::default());
        let (alice, alice_rx) = Client::new(ClientId::new(), "Alice", 8);
        let (bob, mut bob_rx) = Client::new(ClientId::new(), "Bob", 8);
        let bob_id = bob.id;

        room.handle_event(RoomEvent::Join(alice)).await;
        room.handle_event(RoomEvent::Join(bob)).await;
        drop(alice_rx);
        room.handle_event(RoomEvent::Forward(Arc::new(msg("hi")))).await;

        assert_eq!(room.clients.keys().copied().collect::<Vec<_>>(), vec![bob_id]);
        assert_eq!(bob_rx.recv().await.unwrap().message, "hi");
    }

    #[tokio::test]
    async fn test_forward_disconnects_full_queue() {
        let config = RoomConfig {
            queue_capacity: 1,
            ..RoomConfig::default()
        };
        let recorder = Arc::new(Recorder::default());
        let (room, handle) = Room::new(config);
        let mut room = room.with_tracer(Arc::clone(&recorder));
        let (alice, mut alice_rx) = Client::new(ClientId::new(), "Alice", handle.queue_capacity());

        room.handle_event(RoomEvent::Join(alice)).await;
        room.handle_event(RoomEvent::Forward(Arc::new(msg("one")))).await;
        room.handle_event(RoomEvent::Forward(Arc::new(msg("two")))).await;

        assert!(room.clients.is_empty());
        assert!(recorder.lines().contains(&"Client dropped".to_string()));
        assert_eq!(alice_rx.recv().await.unwrap().message, "one");
        assert!(alice_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_client_is_told_to_disconnect() {
        let config = RoomConfig {
            queue_capacity: 1,
            ..RoomConfig::default()
        };
        let (mut room, handle) = Room::new(config);
        let (mut alice, _alice_rx) = Client::new(ClientId::new(), "Alice", handle.queue_capacity());
        let (mut bob, _bob_rx) = Client::new(ClientId::new(), "Bob", 8);
        let bob_id = bob.id;
        let mut alice_kicked = alice.on_disconnect();
        let bob_kicked = bob.on_disconnect();

        room.handle_event(RoomEvent::Join(alice)).await;
        room.handle_event(RoomEvent::Join(bob)).await;
        room.handle_event(RoomEvent::Forward(Arc::new(msg("one")))).await;
        assert!(alice_kicked.try_recv().is_err());

        room.handle_event(RoomEvent::Forward(Arc::new(msg("two")))).await;
        assert_eq!(alice_kicked.await, Ok(()));

        // A plain leave only closes the signal.
        room.handle_event(RoomEvent::Leave(bob_id)).await;
        assert!(bob_kicked.await.is_err());
    }

    #[tokio::test]
    async fn test_members_query() {
        let (room, handle) = Room::new(RoomConfig::default());
        tokio::spawn(room.run());

        let (alice, _rx) = Client::new(ClientId::new(), "Alice", 8);
        let id = alice.id;
        handle.join(alice).await.unwrap();

        assert_eq!(handle.members().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_run_stops_when_handles_dropped() {
        let (room, handle) = Room::new(RoomConfig::default());
        let task = tokio::spawn(room.run());
        drop(handle);
        task.await.unwrap();
    }
}
