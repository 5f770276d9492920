// tools/coretemp_cli/main.rs
//
// Command-line host for the CoreTemp pipeline.
// Reads a probe on a serial port (or replays a capture file) and prints each
// reading on its own line.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use coretemp_lib::io::serial::{DecodePolicy, Parity};
use coretemp_lib::settings::{default_settings_path, Settings};
use coretemp_lib::{PresentationSink, ReadSource, Reading, TeardownReason};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Value text only, one per line
    Plain,
    /// One JSON object per reading
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "coretemp", about = "Show CoreTemp probe readings from a serial port")]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3 (overrides the settings file)
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    #[arg(long, value_enum)]
    parity: Option<Parity>,

    /// Replay a captured byte stream instead of opening a port
    #[arg(long, conflicts_with = "port")]
    replay: Option<PathBuf>,

    /// Settings file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replace invalid UTF-8 instead of dropping the line
    #[arg(long)]
    lossy: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,
}

struct StdoutSink {
    format: OutputFormat,
}

impl PresentationSink for StdoutSink {
    fn show(&mut self, text: &str) {
        match self.format {
            OutputFormat::Plain => println!("{}", text),
            // Status text goes to stderr so stdout stays machine-readable
            OutputFormat::Json => eprintln!("{}", text),
        }
        let _ = std::io::stdout().flush();
    }

    fn show_reading(&mut self, reading: &Reading) {
        match self.format {
            OutputFormat::Plain => self.show(&reading.value),
            OutputFormat::Json => match serde_json::to_string(reading) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("failed to encode reading: {}", e),
            },
        }
    }

    fn teardown(&mut self, reason: &TeardownReason) {
        eprintln!("stream ended: {}", reason);
    }
}

fn load_settings(args: &Args) -> Result<Settings, String> {
    let mut settings = match args.config.clone().or_else(default_settings_path) {
        Some(path) => Settings::load(&path).map_err(|e| e.to_string())?,
        None => Settings::default(),
    };

    if let Some(port) = &args.port {
        settings.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.serial.baud_rate = baud;
    }
    if let Some(parity) = args.parity {
        settings.serial.parity = parity;
    }
    if args.lossy {
        settings.framing.decode_policy = DecodePolicy::Lossy;
    }
    Ok(settings)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("coretemp: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut sink = StdoutSink {
        format: args.format,
    };

    let result = match &args.replay {
        Some(path) => ReadSource::from_file(path)
            .map_err(coretemp_lib::Error::from)
            .and_then(|source| {
                coretemp_lib::run_with_source(settings.pipeline_config(), Box::new(source), &mut sink)
            }),
        None if settings.serial.port.is_empty() => {
            eprintln!("coretemp: no serial port given (use --port or set serial.port in the settings file)");
            return ExitCode::from(2);
        }
        None => coretemp_lib::run(&settings, &mut sink),
    };

    match result {
        Ok((_, stats)) => {
            eprintln!(
                "{} lines, {} analyzed, {} decode errors",
                stats.lines_framed, stats.queue.completed, stats.decode_errors
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("coretemp: {}", e);
            ExitCode::FAILURE
        }
    }
}
