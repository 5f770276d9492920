// src/io/serial/reader.rs
//
// Serial port byte source.
// Opens the port with the configured line settings and delivers raw chunks
// from a dedicated reader thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use super::utils::SerialConfig;
use crate::error::SourceError;
use crate::io::stream::{join_unless_current, run_read_loop};
use crate::io::{ByteSource, SourceListener};

const READ_CHUNK_SIZE: usize = 256;

/// Serial port source implementing `ByteSource`
pub struct SerialSource {
    config: SerialConfig,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl SerialSource {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
        }
    }

    fn open_port(&self) -> Result<Box<dyn serialport::SerialPort>, SourceError> {
        let config = &self.config;
        let (data_bits, stop_bits, parity) = config.line_settings()?;
        let mut port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(Duration::from_millis(config.read_timeout_ms.max(1)))
            .open()
            .map_err(|e| SourceError::Open {
                port: config.port.clone(),
                message: e.to_string(),
            })?;

        // Control lines are best effort: some adapters do not implement them
        if let Err(e) = port.write_data_terminal_ready(config.dtr) {
            tlog!("[serial:{}] Failed to set DTR: {}", config.port, e);
        }
        if let Err(e) = port.write_request_to_send(config.rts) {
            tlog!("[serial:{}] Failed to set RTS: {}", config.port, e);
        }

        Ok(port)
    }
}

impl ByteSource for SerialSource {
    fn open(&mut self, listener: Arc<dyn SourceListener>) -> Result<(), SourceError> {
        if self.task_handle.is_some() {
            return Err(SourceError::AlreadyOpen);
        }

        let mut port = self.open_port()?;
        self.cancel_flag.store(false, Ordering::Relaxed);

        let description = self.config.describe();
        let name = format!("serial:{}", self.config.port);
        let cancel_flag = self.cancel_flag.clone();

        tlog!("[{}] Opened {}", name, description);

        let handle = std::thread::Builder::new()
            .name("coretemp-serial".to_string())
            .spawn(move || {
                listener.on_open(&description);
                run_read_loop(&name, port.as_mut(), listener.as_ref(), &cancel_flag, READ_CHUNK_SIZE);
                // Port is released when the reader thread drops it
            })?;
        self.task_handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task_handle.take() {
            join_unless_current(&format!("serial:{}", self.config.port), handle);
            tlog!("[serial:{}] Closed", self.config.port);
        }
    }

    fn describe(&self) -> String {
        self.config.describe()
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        self.close();
    }
}
