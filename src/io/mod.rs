// src/io/mod.rs
//
// Byte-stream source contract and the sources shipped with the crate.
// A source owns its own I/O context and reports through a `SourceListener`.

pub mod serial;
pub mod stream;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SourceError;

pub use stream::ReadSource;

/// Current wall-clock time in microseconds since the Unix epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Callbacks a byte source invokes from its I/O context.
///
/// Chunks must be delivered in arrival order. After `on_error` the source
/// delivers nothing further.
pub trait SourceListener: Send + Sync {
    /// The source is open and about to deliver data
    fn on_open(&self, description: &str);

    /// A chunk of bytes arrived
    fn on_data(&self, chunk: &[u8]);

    /// The stream failed or the device went away
    fn on_error(&self, error: SourceError);
}

/// A byte-stream source: a serial port, a replay file, a test double.
pub trait ByteSource: Send {
    /// Open the underlying device and start delivering to `listener`
    fn open(&mut self, listener: Arc<dyn SourceListener>) -> Result<(), SourceError>;

    /// Stop delivery and release the device. Must be idempotent and must not
    /// deadlock when called from inside a listener callback.
    fn close(&mut self);

    /// Human-readable name used in log lines
    fn describe(&self) -> String;
}
