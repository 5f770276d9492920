// src/pipeline.rs
//
// Wires a byte source to the line framer, the framer to the analysis queue,
// and the queue's results to the display channel.
//
// Contexts:
// - source I/O thread: on_open / on_data / on_error
// - analysis worker:   parse and hand readings to the display channel
// - host UI thread:    drains the display channel (see display::drive_sink)

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::analysis::{self, AnalysisQueue, QueueCapacity, QueueStats};
use crate::display::{DisplayHandle, TeardownReason, STATUS_DEVICE_OFF, STATUS_OPENED};
use crate::error::{Error, FramerError, QueueError, SourceError};
use crate::io::serial::{CompletedLine, FramedLine, LineFramer, LineFramerConfig};
use crate::io::{ByteSource, SourceListener};

const LOG_PREFIX: &str = "[pipeline]";

/// Pipeline tuning, usually taken from `Settings`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub framer: LineFramerConfig,
    pub queue_capacity: QueueCapacity,
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub bytes_received: u64,
    pub lines_framed: u64,
    pub decode_errors: u64,
    /// Lines the queue refused (full or already shut down)
    pub lines_dropped: u64,
    pub queue: QueueStats,
}

#[derive(Default)]
struct Counters {
    bytes_received: AtomicU64,
    lines_framed: AtomicU64,
    decode_errors: AtomicU64,
    lines_dropped: AtomicU64,
}

/// Serial line pipeline. Shared as `Arc<Pipeline>`; it is the source's listener.
pub struct Pipeline {
    framer: LineFramer,
    queue: AnalysisQueue,
    display: DisplayHandle,
    source: Mutex<Option<Box<dyn ByteSource>>>,
    closed: AtomicBool,
    counters: Counters,
}

impl Pipeline {
    /// Build the pipeline and start its analysis worker.
    pub fn new(config: PipelineConfig, display: DisplayHandle) -> Result<Arc<Self>, Error> {
        let worker_display = display.clone();
        let queue = AnalysisQueue::new("analysis", config.queue_capacity, move |line: CompletedLine| {
            match analysis::parse(&line.text) {
                Some(reading) => worker_display.reading(reading),
                None => Ok(()),
            }
        })
        .map_err(Error::Worker)?;

        Ok(Arc::new(Self {
            framer: LineFramer::new(config.framer),
            queue,
            display,
            source: Mutex::new(None),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }))
    }

    /// Attach and open a byte source. The pipeline releases it on teardown.
    pub fn start(self: &Arc<Self>, source: Box<dyn ByteSource>) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Queue(QueueError::Closed));
        }

        let mut guard = self.source.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_some() {
            return Err(Error::Source(SourceError::AlreadyOpen));
        }

        tlog!("{} Starting on {}", LOG_PREFIX, source.describe());
        let source = guard.insert(source);
        let listener: Arc<dyn SourceListener> = self.clone();
        if let Err(e) = source.open(listener) {
            tlog!("{} Failed to open source: {}", LOG_PREFIX, e);
            *guard = None;
            return Err(Error::Source(e));
        }
        Ok(())
    }

    /// Host-initiated teardown. `drain` decides whether queued lines are still analyzed.
    pub fn stop(&self, drain: bool) {
        self.teardown(TeardownReason::Stopped, drain);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            lines_framed: self.counters.lines_framed.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            lines_dropped: self.counters.lines_dropped.load(Ordering::Relaxed),
            queue: self.queue.stats(),
        }
    }

    fn dispatch(&self, framed: FramedLine) {
        match framed {
            Ok(line) => {
                self.counters.lines_framed.fetch_add(1, Ordering::Relaxed);
                let sequence = line.sequence;
                if let Err(e) = self.queue.submit(line) {
                    self.counters.lines_dropped.fetch_add(1, Ordering::Relaxed);
                    tlog!("{} Dropped line {}: {}", LOG_PREFIX, sequence, e);
                }
            }
            Err(e @ FramerError::Decode { .. }) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                tlog!("{} {}", LOG_PREFIX, e);
            }
        }
    }

    /// Shut everything down exactly once:
    /// recover the partial line, stop the worker, release the source, tell the sink.
    fn teardown(&self, reason: TeardownReason, drain: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tlog!("{} Tearing down ({})", LOG_PREFIX, reason);

        // Finish the framer before the queue closes so the trailing line is still
        // analyzed. A racing on_data either submitted its lines first or is refused.
        self.framer.finish(|framed| self.dispatch(framed));
        self.queue.shutdown(drain);

        let source = self.source.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut source) = source {
            source.close();
        }

        if matches!(reason, TeardownReason::Error(_)) {
            let _ = self.display.status(STATUS_DEVICE_OFF);
        }
        if self.display.closed(reason).is_err() {
            tlog!("{} Display went away before teardown", LOG_PREFIX);
        }

        let stats = self.stats();
        tlog!(
            "{} Closed: {} bytes, {} lines, {} decode errors, {} dropped",
            LOG_PREFIX,
            stats.bytes_received,
            stats.lines_framed,
            stats.decode_errors,
            stats.lines_dropped
        );
    }
}

impl SourceListener for Pipeline {
    fn on_open(&self, description: &str) {
        tlog!("{} Source open: {}", LOG_PREFIX, description);
        let _ = self.display.status(STATUS_OPENED);
    }

    fn on_data(&self, chunk: &[u8]) {
        if self.is_closed() {
            return;
        }
        // Submit under the framer lock so lines reach the queue in terminator order
        if self.framer.feed_with(chunk, |framed| self.dispatch(framed)) {
            self.counters
                .bytes_received
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
    }

    fn on_error(&self, error: SourceError) {
        tlog!("{} Stream error: {}", LOG_PREFIX, error);
        self.teardown(TeardownReason::Error(error.to_string()), true);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.teardown(TeardownReason::Stopped, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{display_channel, DisplayUpdate};
    use std::sync::mpsc;

    /// Source that records open/close and lets the test drive callbacks directly
    struct ManualSource {
        listener: Arc<Mutex<Option<Arc<dyn SourceListener>>>>,
        closes: Arc<AtomicU64>,
        fail_open: bool,
    }

    impl ByteSource for ManualSource {
        fn open(&mut self, listener: Arc<dyn SourceListener>) -> Result<(), SourceError> {
            if self.fail_open {
                return Err(SourceError::Open {
                    port: "manual".to_string(),
                    message: "no such device".to_string(),
                });
            }
            listener.on_open("manual");
            *self.listener.lock().unwrap() = Some(listener);
            Ok(())
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.listener.lock().unwrap().take();
        }
        fn describe(&self) -> String {
            "manual".to_string()
        }
    }

    fn manual_source() -> (ManualSource, Arc<AtomicU64>) {
        let closes = Arc::new(AtomicU64::new(0));
        (
            ManualSource {
                listener: Arc::new(Mutex::new(None)),
                closes: closes.clone(),
                fail_open: false,
            },
            closes,
        )
    }

    fn drain(rx: &mpsc::Receiver<DisplayUpdate>) -> Vec<DisplayUpdate> {
        rx.try_iter().collect()
    }

    fn values(updates: &[DisplayUpdate]) -> Vec<String> {
        updates
            .iter()
            .filter_map(|u| match u {
                DisplayUpdate::Reading(r) => Some(r.value.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_readings_flow_to_display_in_order() {
        let (display, rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();
        let (source, _closes) = manual_source();
        pipeline.start(Box::new(source)).unwrap();

        pipeline.on_data(b"CoreTemp v1\r\nseq1, 23.5 C, OK\r\nseq2, 23");
        pipeline.on_data(b".7 C, OK\r\nseq3, 99.9 C, FAIL\r\nseq4, 24.0 C, OK\n");
        pipeline.stop(true);

        let updates = drain(&rx);
        assert_eq!(updates.first(), Some(&DisplayUpdate::Status("serial opened".to_string())));
        assert_eq!(values(&updates), vec!["23.5", "23.7", "24.0"]);
        assert_eq!(
            updates.last(),
            Some(&DisplayUpdate::Closed(TeardownReason::Stopped))
        );

        let stats = pipeline.stats();
        assert_eq!(stats.lines_framed, 5);
        assert_eq!(stats.queue.completed, 5);
    }

    #[test]
    fn test_stream_error_flushes_partial_line_and_closes_source() {
        let (display, rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();
        let (source, closes) = manual_source();
        pipeline.start(Box::new(source)).unwrap();

        pipeline.on_data(b"seq1, 20.0 C, OK\nseq2, 21.0 C, OK");
        pipeline.on_error(SourceError::Disconnected);

        let updates = drain(&rx);
        assert_eq!(values(&updates), vec!["20.0", "21.0"]);
        let n = updates.len();
        assert_eq!(updates[n - 2], DisplayUpdate::Status("device off".to_string()));
        assert_eq!(
            updates[n - 1],
            DisplayUpdate::Closed(TeardownReason::Error("device disconnected".to_string()))
        );
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(pipeline.is_closed());
    }

    #[test]
    fn test_teardown_happens_once_and_late_data_is_ignored() {
        let (display, rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();
        let (source, closes) = manual_source();
        pipeline.start(Box::new(source)).unwrap();

        pipeline.on_error(SourceError::Disconnected);
        pipeline.on_error(SourceError::Disconnected);
        pipeline.stop(true);
        pipeline.on_data(b"seq9, 1.0 C, OK\n");

        let closed = drain(&rx)
            .into_iter()
            .filter(|u| matches!(u, DisplayUpdate::Closed(_)))
            .count();
        assert_eq!(closed, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.stats().bytes_received, 0);
    }

    #[test]
    fn test_decode_errors_are_counted_and_skipped() {
        let (display, rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();

        pipeline.on_data(b"seq1, \xff C, OK\nseq2, 22.0 C, OK\n");
        pipeline.stop(true);

        assert_eq!(values(&drain(&rx)), vec!["22.0"]);
        let stats = pipeline.stats();
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.lines_framed, 1);
    }

    #[test]
    fn test_failed_open_leaves_pipeline_usable() {
        let (display, _rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();
        let (mut source, _closes) = manual_source();
        source.fail_open = true;

        assert!(matches!(
            pipeline.start(Box::new(source)),
            Err(Error::Source(SourceError::Open { .. }))
        ));
        assert!(!pipeline.is_closed());

        let (source, _closes) = manual_source();
        pipeline.start(Box::new(source)).unwrap();
        pipeline.stop(false);
    }

    #[test]
    fn test_start_after_stop_is_rejected() {
        let (display, _rx) = display_channel();
        let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();
        pipeline.stop(true);
        let (source, _closes) = manual_source();
        assert!(pipeline.start(Box::new(source)).is_err());
    }

    #[test]
    fn test_stop_racing_data_keeps_lines_in_order_without_gaps() {
        for _ in 0..20 {
            let (display, rx) = display_channel();
            let pipeline = Pipeline::new(PipelineConfig::default(), display).unwrap();

            let feeder = {
                let pipeline = pipeline.clone();
                std::thread::spawn(move || {
                    for i in 0..2000u32 {
                        pipeline.on_data(format!("{}, 1 C, OK", i).as_bytes());
                        pipeline.on_data(b"\n");
                    }
                })
            };
            std::thread::yield_now();
            pipeline.stop(true);
            feeder.join().unwrap();

            let labels: Vec<u32> = drain(&rx)
                .iter()
                .filter_map(|u| match u {
                    DisplayUpdate::Reading(r) => r.label.parse().ok(),
                    _ => None,
                })
                .collect();
            let expected: Vec<u32> = (0..labels.len() as u32).collect();
            assert_eq!(labels, expected);

            let stats = pipeline.stats();
            assert_eq!(stats.lines_dropped, 0);
            assert_eq!(stats.lines_framed, labels.len() as u64);
            assert_eq!(stats.queue.completed, labels.len() as u64);
        }
    }
}
