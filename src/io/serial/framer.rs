// src/io/serial/framer.rs
//
// Line framing for text-oriented serial devices.
// Reassembles arbitrary byte chunks into lines terminated by LF, CRLF or a bare CR.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::FramerError;
use crate::io::now_us;

// =============================================================================
// Constants
// =============================================================================

const LF: u8 = b'\n';
const CR: u8 = b'\r';

// =============================================================================
// Types
// =============================================================================

/// How completed line bytes are turned into text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Invalid UTF-8 is reported as `FramerError::Decode` and the line is not emitted
    #[default]
    Strict,
    /// Invalid sequences are replaced with U+FFFD and the line is emitted
    Lossy,
}

/// Framer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFramerConfig {
    pub decode_policy: DecodePolicy,
    /// Force a split once an unterminated line reaches this many bytes (None = unlimited)
    pub max_line_length: Option<usize>,
}

/// A complete line extracted from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedLine {
    /// Position of this line's terminator event within the stream, starting at 0
    pub sequence: u64,
    pub text: String,
    /// True when the line came from `flush()` or a max-length split, not a terminator
    pub incomplete: bool,
    pub timestamp_us: u64,
}

/// Per-line framing outcome, in terminator order
pub type FramedLine = Result<CompletedLine, FramerError>;

// =============================================================================
// Framer State
// =============================================================================

struct LineState {
    buffer: Vec<u8>,
    /// Last emitted line ended on a bare CR, so a following LF closes a CRLF pair
    last_was_cr: bool,
    /// A max-length split just emitted the buffer; the next terminator only closes it
    split_pending: bool,
    /// Set by `finish`; later input is refused
    finished: bool,
    next_sequence: u64,
    config: LineFramerConfig,
}

impl LineState {
    fn new(config: LineFramerConfig) -> Self {
        LineState {
            buffer: Vec::with_capacity(256),
            last_was_cr: false,
            split_pending: false,
            finished: false,
            next_sequence: 0,
            config,
        }
    }

    fn feed<F: FnMut(FramedLine)>(&mut self, data: &[u8], out: &mut F) {
        for &byte in data {
            match byte {
                LF => {
                    if self.last_was_cr && self.buffer.is_empty() {
                        // Second half of CRLF; the CR already emitted the line
                        self.last_was_cr = false;
                        continue;
                    }
                    self.last_was_cr = false;
                    if self.take_split_terminator() {
                        continue;
                    }
                    // CR never reaches the buffer, so there is no trailing CR to strip
                    let bytes = std::mem::take(&mut self.buffer);
                    out(self.complete(bytes, false));
                }
                CR => {
                    self.last_was_cr = true;
                    if self.take_split_terminator() {
                        continue;
                    }
                    let bytes = std::mem::take(&mut self.buffer);
                    out(self.complete(bytes, false));
                }
                _ => {
                    self.buffer.push(byte);
                    self.last_was_cr = false;
                    self.split_pending = false;

                    if let Some(max) = self.config.max_line_length {
                        if max > 0 && self.buffer.len() >= max {
                            let bytes = std::mem::take(&mut self.buffer);
                            out(self.complete(bytes, true));
                            self.split_pending = true;
                        }
                    }
                }
            }
        }
    }

    /// A terminator right after a forced split ends that line, not a new empty one
    fn take_split_terminator(&mut self) -> bool {
        let pending = self.split_pending && self.buffer.is_empty();
        self.split_pending = false;
        pending
    }

    fn flush(&mut self) -> Option<FramedLine> {
        self.last_was_cr = false;
        self.split_pending = false;
        if self.buffer.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.buffer);
        Some(self.complete(bytes, true))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.last_was_cr = false;
        self.split_pending = false;
    }

    /// Decode and stamp one line. The sequence advances even when decoding fails
    fn complete(&mut self, bytes: Vec<u8>, incomplete: bool) -> FramedLine {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let text = match self.config.decode_policy {
            DecodePolicy::Strict => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    return Err(FramerError::Decode {
                        sequence,
                        source: e.utf8_error(),
                    })
                }
            },
            DecodePolicy::Lossy => String::from_utf8_lossy(&bytes).into_owned(),
        };

        Ok(CompletedLine {
            sequence,
            text,
            incomplete,
            timestamp_us: now_us(),
        })
    }
}

// =============================================================================
// Public LineFramer
// =============================================================================

/// Stateful line framer for streaming serial text.
///
/// All operations serialize on an internal lock, so a teardown flush can
/// safely race a late data callback. Lines are produced in terminator order.
/// `feed_with` and `finish` run their callback while holding the lock, so a
/// caller that forwards lines from the callback forwards them in that order too.
pub struct LineFramer {
    state: Mutex<LineState>,
}

impl LineFramer {
    pub fn new(config: LineFramerConfig) -> Self {
        LineFramer {
            state: Mutex::new(LineState::new(config)),
        }
    }

    /// Feed raw bytes into the framer.
    /// Returns every line completed by a terminator in this chunk.
    pub fn feed(&self, data: &[u8]) -> Vec<FramedLine> {
        let mut lines = Vec::new();
        self.feed_with(data, |line| lines.push(line));
        lines
    }

    /// Feed raw bytes, handing each completed line to `emit` under the framer lock.
    /// Returns false, consuming nothing, once the framer has been finished.
    pub fn feed_with<F: FnMut(FramedLine)>(&self, data: &[u8], mut emit: F) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        state.feed(data, &mut emit);
        true
    }

    /// Emit any buffered bytes as an incomplete line.
    /// Call when the stream ends so a final unterminated line is not lost.
    pub fn flush(&self) -> Option<FramedLine> {
        self.lock().flush()
    }

    /// Flush the trailing line into `emit` and refuse all further input.
    /// Any `feed_with` that got the lock first has already emitted its lines.
    pub fn finish<F: FnOnce(FramedLine)>(&self, emit: F) {
        let mut state = self.lock();
        state.finished = true;
        if let Some(line) = state.flush() {
            emit(line);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Drop buffered bytes without emitting them.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Number of bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.lock().buffer.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LineState> {
        // A panic mid-feed leaves the buffer consistent (bytes are only pushed or taken)
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(LineFramerConfig::default())
    }
}
