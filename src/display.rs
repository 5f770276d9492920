// src/display.rs
//
// Hand-off from the analysis worker to the presentation context.
// The worker only sends `DisplayUpdate`s; the sink itself is driven on the
// host's UI thread by `drive_sink`.

use serde::Serialize;
use std::sync::mpsc;

use crate::analysis::Reading;
use crate::error::AnalysisError;

/// Status text shown when the port opens
pub const STATUS_OPENED: &str = "serial opened";
/// Status text shown when the stream fails or the device is unplugged
pub const STATUS_DEVICE_OFF: &str = "device off";

/// Why a pipeline stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum TeardownReason {
    /// The host asked the pipeline to stop
    Stopped,
    /// The byte source failed or disconnected
    Error(String),
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownReason::Stopped => write!(f, "stopped"),
            TeardownReason::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Message from the core to the presentation context
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUpdate {
    Reading(Reading),
    Status(String),
    Closed(TeardownReason),
}

/// Presentation layer. Only ever called on the context that runs `drive_sink`.
pub trait PresentationSink {
    fn show(&mut self, text: &str);

    /// Called once when the pipeline has shut down
    fn teardown(&mut self, reason: &TeardownReason);

    /// Display a reading. Defaults to showing its value text.
    fn show_reading(&mut self, reading: &Reading) {
        self.show(&reading.value);
    }
}

/// Sending half of the display channel, cloned into the worker
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::Sender<DisplayUpdate>,
}

impl DisplayHandle {
    pub fn reading(&self, reading: Reading) -> Result<(), AnalysisError> {
        self.send(DisplayUpdate::Reading(reading))
    }

    pub fn status(&self, text: &str) -> Result<(), AnalysisError> {
        self.send(DisplayUpdate::Status(text.to_string()))
    }

    pub fn closed(&self, reason: TeardownReason) -> Result<(), AnalysisError> {
        self.send(DisplayUpdate::Closed(reason))
    }

    fn send(&self, update: DisplayUpdate) -> Result<(), AnalysisError> {
        self.tx.send(update).map_err(|_| AnalysisError::DisplayClosed)
    }
}

/// Create the display channel. Unbounded: the worker never waits on the UI.
pub fn display_channel() -> (DisplayHandle, mpsc::Receiver<DisplayUpdate>) {
    let (tx, rx) = mpsc::channel();
    (DisplayHandle { tx }, rx)
}

/// Apply one update to the sink. Returns the teardown reason for `Closed`.
pub fn apply_update(sink: &mut dyn PresentationSink, update: DisplayUpdate) -> Option<TeardownReason> {
    match update {
        DisplayUpdate::Reading(reading) => {
            sink.show_reading(&reading);
            None
        }
        DisplayUpdate::Status(text) => {
            sink.show(&text);
            None
        }
        DisplayUpdate::Closed(reason) => {
            sink.teardown(&reason);
            Some(reason)
        }
    }
}

/// Run the sink on the calling thread until the pipeline closes.
///
/// If every sender goes away without a `Closed` message the sink is torn down
/// with `TeardownReason::Stopped`.
pub fn drive_sink(
    rx: &mpsc::Receiver<DisplayUpdate>,
    sink: &mut dyn PresentationSink,
) -> TeardownReason {
    for update in rx.iter() {
        if let Some(reason) = apply_update(sink, update) {
            return reason;
        }
    }
    let reason = TeardownReason::Stopped;
    sink.teardown(&reason);
    reason
}
