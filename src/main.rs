//! WebSocket Chat Room - Entry Point
//!
//! Starts the TCP listener and the room actor, accepting connections.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_room::avatar::{AuthAvatar, FileSystemAvatar, GravatarAvatar, TryAvatars};
use chat_room::config::TraceSink;
use chat_room::{handle_connection, trace, Config, Room};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_room=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_room=info")),
        )
        .init();

    let config = Config::parse();

    // Start TCP listener
    let listener = TcpListener::bind(config.addr).await?;
    info!(
        "WebSocket Chat Room listening on ws://{}{}",
        listener.local_addr()?,
        config.path
    );

    // Avatar strategies, in priority order
    let avatars = TryAvatars::default()
        .push(FileSystemAvatar::new(&config.avatar_dir))
        .push(AuthAvatar)
        .push(GravatarAvatar);

    // Create the room actor and start it before accepting anyone
    let (mut room, handle) = Room::new(config.room_config());
    match config.trace {
        TraceSink::Off => {}
        TraceSink::Stdout => room = room.with_tracer(trace::new(std::io::stdout())),
        TraceSink::Log => room = room.with_tracer(trace::LogTracer),
    }
    let handle = handle.with_avatars(avatars);
    tokio::spawn(room.run());

    info!("Room actor started");

    let path: Arc<str> = Arc::from(config.path.as_str());

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let room = handle.clone();
                let path = Arc::clone(&path);

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, room, &path).await {
                        warn!("Connection from {} dropped: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
