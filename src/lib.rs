//! Serial line framing and reading analysis for CoreTemp probes.
//!
//! Bytes from a serial device are reassembled into lines, each line is parsed
//! on a single analysis worker, and readings are handed to a presentation sink
//! running on the host's own thread:
//!
//! ```text
//! ByteSource --on_data--> LineFramer --submit--> AnalysisQueue --parse--> DisplayUpdate --> PresentationSink
//! ```

#[macro_use]
pub mod logging;

pub mod analysis;
pub mod display;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod settings;

pub use analysis::{parse, AnalysisQueue, QueueCapacity, Reading};
pub use display::{display_channel, drive_sink, DisplayUpdate, PresentationSink, TeardownReason};
pub use error::{Error, Result};
pub use io::serial::{CompletedLine, LineFramer, SerialConfig, SerialSource};
pub use io::{ByteSource, ReadSource, SourceListener};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use settings::Settings;

/// Run a pipeline over `source` and drive `sink` on the calling thread until
/// the stream ends or fails.
pub fn run_with_source(
    config: PipelineConfig,
    source: Box<dyn ByteSource>,
    sink: &mut dyn PresentationSink,
) -> Result<(TeardownReason, PipelineStats)> {
    let (display, updates) = display_channel();
    let pipeline = Pipeline::new(config, display)?;
    pipeline.start(source)?;

    let reason = drive_sink(&updates, sink);
    let stats = pipeline.stats();
    Ok((reason, stats))
}

/// Open the serial port described by `settings` and run until it disconnects.
pub fn run(settings: &Settings, sink: &mut dyn PresentationSink) -> Result<(TeardownReason, PipelineStats)> {
    if let Some(dir) = settings.reports_dir() {
        if let Err(e) = logging::init_file_logging(&dir) {
            tlog!("[setup] Failed to start file logging in {}: {}", dir.display(), e);
        }
    }

    let source = SerialSource::new(settings.serial.clone());
    let result = run_with_source(settings.pipeline_config(), Box::new(source), sink);

    logging::stop_file_logging();
    result
}
