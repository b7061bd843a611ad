//! WebSocket Chat Room Library
//!
//! A broadcast chat room built with tokio-tungstenite: every message a
//! client sends is relayed to every client in the room, the sender
//! included.
//!
//! # Features
//! - WebSocket connection handling on a single room path
//! - Identity from a base64 JSON `auth` cookie
//! - Server-assigned timestamps
//! - Avatar decoration from an ordered list of resolvers
//! - Pluggable activity tracer (no-op by default)
//! - Explicit full-queue policy (disconnect or block)
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Room` is the only owner of the membership map
//! - Each connection runs a read pump and a write pump
//! - No locks needed - joins, leaves and broadcasts all go through the
//!   room's mailbox
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_room::{handle_connection, Room, RoomConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (room, handle) = Room::new(RoomConfig::default());
//!
//!     tokio::spawn(room.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let handle = handle.clone();
//!         tokio::spawn(async move { handle_connection(stream, handle, "/room").await });
//!     }
//! }
//! ```

pub mod avatar;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod message;
pub mod room;
pub mod trace;
pub mod types;

// Re-export main types for convenience
pub use avatar::{Avatar, TryAvatars};
pub use client::{Client, Outbound};
pub use config::Config;
pub use error::{AppError, AvatarError, IdentityError, SendError};
pub use handler::handle_connection;
pub use identity::Identity;
pub use message::{ChatMessage, ClientMessage};
pub use room::{Backpressure, Room, RoomConfig, RoomHandle};
pub use trace::Tracer;
pub use types::ClientId;
