//! Server configuration
//!
//! Command line flags with environment variable fallbacks.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::room::{Backpressure, RoomConfig};

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default WebSocket path
pub const DEFAULT_PATH: &str = "/room";

/// WebSocket chat room server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, env = "CHAT_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Path clients upgrade on
    #[arg(long, env = "CHAT_PATH", default_value = DEFAULT_PATH)]
    pub path: String,

    /// Outbound queue capacity per client
    #[arg(long, env = "CHAT_QUEUE_CAPACITY", default_value = "256")]
    pub queue_capacity: NonZeroUsize,

    /// Room mailbox capacity
    #[arg(long, env = "CHAT_MAILBOX_CAPACITY", default_value = "256")]
    pub mailbox_capacity: NonZeroUsize,

    /// What to do when a client's queue is full
    #[arg(long, env = "CHAT_BACKPRESSURE", value_enum, default_value_t = Backpressure::Disconnect)]
    pub backpressure: Backpressure,

    /// Directory holding uploaded avatars, named by user id
    #[arg(long, env = "CHAT_AVATAR_DIR", default_value = "avatars")]
    pub avatar_dir: PathBuf,

    /// Where room activity is traced
    #[arg(long, env = "CHAT_TRACE", value_enum, default_value_t = TraceSink::Off)]
    pub trace: TraceSink,
}

/// Destination for room activity traces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TraceSink {
    /// Discard
    #[default]
    Off,
    /// One line per event on stdout
    Stdout,
    /// Debug-level log events
    Log,
}

impl Config {
    /// Room settings derived from this configuration
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            queue_capacity: self.queue_capacity.get(),
            mailbox_capacity: self.mailbox_capacity.get(),
            backpressure: self.backpressure,
        }
    }
}
