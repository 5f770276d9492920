// End-to-end runs of the pipeline over in-memory byte streams.

use std::io::Cursor;

use coretemp_lib::{
    run_with_source, PipelineConfig, PresentationSink, QueueCapacity, ReadSource, TeardownReason,
};

#[derive(Default)]
struct RecordingSink {
    shown: Vec<String>,
    teardowns: Vec<TeardownReason>,
}

impl PresentationSink for RecordingSink {
    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }

    fn teardown(&mut self, reason: &TeardownReason) {
        self.teardowns.push(reason.clone());
    }
}

const CAPTURE: &[u8] = b"CoreTemp probe v2.1\r\n\
seq1, 23.5 C, OK\r\n\
seq2, 23.6 C, OK\r\n\
23.5 C, 23.5 C, OK\r\n\
seq3, 0.0 C, FAIL\r\n\
seq4, 23.8 C, OK\r\
seq5, 24.0 C, OK\n\
seq6, 24.1 C, OK";

fn run_capture(chunk_size: usize) -> RecordingSink {
    let source = ReadSource::new("capture", Box::new(Cursor::new(CAPTURE.to_vec())))
        .with_chunk_size(chunk_size);
    let mut sink = RecordingSink::default();
    let (reason, stats) =
        run_with_source(PipelineConfig::default(), Box::new(source), &mut sink).unwrap();

    assert_eq!(reason, TeardownReason::Error("device disconnected".to_string()));
    // Eight lines including the unterminated tail recovered at teardown
    assert_eq!(stats.lines_framed, 8);
    assert_eq!(stats.bytes_received, CAPTURE.len() as u64);
    assert_eq!(stats.queue.completed, 8);
    sink
}

#[test]
fn test_capture_replay_shows_readings_in_order() {
    let sink = run_capture(256);
    assert_eq!(
        sink.shown,
        vec!["serial opened", "23.5", "23.6", "23.8", "24.0", "24.1", "device off"]
    );
    assert_eq!(sink.teardowns.len(), 1);
}

#[test]
fn test_capture_replay_is_independent_of_chunking() {
    let whole = run_capture(CAPTURE.len());
    for chunk_size in [1, 2, 3, 7, 19] {
        assert_eq!(run_capture(chunk_size).shown, whole.shown, "chunk size {}", chunk_size);
    }
}

#[test]
fn test_bounded_queue_config_still_delivers_slow_stream() {
    let source = ReadSource::new("capture", Box::new(Cursor::new(b"a, 1 C, OK\nb, 2 C, OK\n".to_vec())));
    let config = PipelineConfig {
        queue_capacity: QueueCapacity::Bounded(16),
        ..Default::default()
    };
    let mut sink = RecordingSink::default();
    let (_, stats) = run_with_source(config, Box::new(source), &mut sink).unwrap();

    assert_eq!(stats.queue.rejected, 0);
    assert_eq!(sink.shown, vec!["serial opened", "1", "2", "device off"]);
}
