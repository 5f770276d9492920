// src/error.rs
//
// Error types for the framing, analysis and source layers.

use thiserror::Error;

/// Errors surfaced by the line framer.
#[derive(Debug, Error)]
pub enum FramerError {
    /// A completed line was not valid UTF-8 under the strict decode policy.
    #[error("line {sequence} is not valid UTF-8: {source}")]
    Decode {
        sequence: u64,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Errors returned by `AnalysisQueue::submit`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("analysis queue is shut down")]
    Closed,
    #[error("analysis queue is full ({capacity} pending tasks)")]
    Full { capacity: usize },
}

/// Error raised by an analysis handler for a single task.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("display channel closed")]
    DisplayClosed,
    #[error("{0}")]
    Failed(String),
}

/// Errors from a byte-stream source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {port}: {message}")]
    Open { port: String, message: String },
    #[error("device disconnected")]
    Disconnected,
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source is already open")]
    AlreadyOpen,
}

/// Errors from loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Crate-level error for host-facing entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Framer(#[from] FramerError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("failed to start analysis worker: {0}")]
    Worker(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
