//! Room activity tracing
//!
//! A `Tracer` is an append-only sink for human-readable room events.
//! The room calls it from inside its coordination loop, so a slow tracer
//! slows down fan-out for everyone.

use std::fmt::{self, Display};
use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Sink for room activity events
pub trait Tracer: Send + Sync {
    /// Record one event. The arguments are concatenated without separators.
    fn trace(&self, args: &[&dyn Display]);
}

impl<T: Tracer + ?Sized> Tracer for Arc<T> {
    fn trace(&self, args: &[&dyn Display]) {
        (**self).trace(args)
    }
}

impl<T: Tracer + ?Sized> Tracer for Box<T> {
    fn trace(&self, args: &[&dyn Display]) {
        (**self).trace(args)
    }
}

/// Tracer that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct Off;

impl Tracer for Off {
    fn trace(&self, _args: &[&dyn Display]) {}
}

/// Create the no-op tracer
pub fn off() -> Off {
    Off
}

/// Tracer writing one line per event to a `Write` sink
pub struct WriterTracer<W> {
    out: Mutex<W>,
}

/// Create a tracer that writes to `out`
pub fn new<W: Write + Send>(out: W) -> WriterTracer<W> {
    WriterTracer {
        out: Mutex::new(out),
    }
}

impl<W> WriterTracer<W> {
    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Tracer for WriterTracer<W> {
    fn trace(&self, args: &[&dyn Display]) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        // Tracing must never take the room down; write errors are dropped.
        let _ = writeln!(out, "{}", Joined(args));
    }
}

impl<W> fmt::Debug for WriterTracer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterTracer").finish_non_exhaustive()
    }
}

/// Tracer forwarding events to the `tracing` subscriber at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace(&self, args: &[&dyn Display]) {
        debug!(target: "chat_room::trace", "{}", Joined(args));
    }
}

struct Joined<'a>(&'a [&'a dyn Display]);

impl Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for arg in self.0 {
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}
