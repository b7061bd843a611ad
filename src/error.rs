//! Error types for the chat room
//!
//! Defines connection-level errors, outbound queue errors and the
//! collaborator errors (avatar resolution, identity decoding).
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Connection-level errors
///
/// None of these ever reach the room's coordination loop; they end the
/// connection that produced them and nothing else.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The room's coordination loop is gone (mailbox closed)
    #[error("Room closed")]
    RoomClosed,

    /// Handshake completed without an authenticated identity
    #[error("Unauthorized")]
    Unauthorized,
}

/// Outbound queue errors
///
/// Occurs when the room tries to hand a message to a client's queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The outbound pump has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The queue is at capacity
    #[error("Queue full")]
    QueueFull,
}

/// Avatar resolution errors
///
/// Always non-fatal: the message is forwarded without an avatar.
#[derive(Debug, Error)]
pub enum AvatarError {
    /// This resolver has no avatar for the user
    #[error("Unable to get an avatar URL")]
    NoAvatarUrl,

    /// Reading the avatar directory failed
    #[error("Avatar IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding the `auth` cookie into an identity
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No `auth` cookie on the request
    #[error("Missing auth cookie")]
    MissingCookie,

    /// Cookie value is not valid base64
    #[error("Invalid cookie encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Cookie payload is not a valid identity
    #[error("Invalid identity: {0}")]
    Json(#[from] serde_json::Error),
}
