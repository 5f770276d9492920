// src/io/stream.rs
//
// Blocking read loop shared by every source backed by `std::io::Read`.
// The loop runs on a dedicated thread, which is the source's I/O context.

use std::io::{ErrorKind, Read};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use super::{ByteSource, SourceListener};
use crate::error::SourceError;

const DEFAULT_CHUNK_SIZE: usize = 256;

/// Read from `reader` until cancelled, EOF or a hard error.
///
/// EOF is reported as `SourceError::Disconnected`. Timeouts and interrupts are
/// retried. Nothing is reported once `cancel_flag` is set.
pub(crate) fn run_read_loop<R: Read + ?Sized>(
    name: &str,
    reader: &mut R,
    listener: &dyn SourceListener,
    cancel_flag: &AtomicBool,
    chunk_size: usize,
) {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total_bytes_read: u64 = 0;

    loop {
        if cancel_flag.load(Ordering::Relaxed) {
            tlog!("[{}] Read loop stopped after {} bytes", name, total_bytes_read);
            return;
        }

        match reader.read(&mut buf) {
            Ok(0) => {
                if !cancel_flag.load(Ordering::Relaxed) {
                    tlog!("[{}] End of stream after {} bytes", name, total_bytes_read);
                    listener.on_error(SourceError::Disconnected);
                }
                return;
            }
            Ok(n) => {
                total_bytes_read += n as u64;
                listener.on_data(&buf[..n]);
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                // Expected for ports opened with a read timeout
            }
            Err(e) => {
                if !cancel_flag.load(Ordering::Relaxed) {
                    tlog!("[{}] Read error: {}", name, e);
                    listener.on_error(SourceError::Io(e));
                }
                return;
            }
        }
    }
}

/// Join a source thread unless we are that thread (close from inside a callback).
pub(crate) fn join_unless_current(name: &str, handle: JoinHandle<()>) {
    if handle.thread().id() == std::thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tlog!("[{}] Reader thread panicked", name);
    }
}

/// Byte source over any blocking reader: a replay file, a pipe, an in-memory buffer.
///
/// `close` joins the reader thread, so the reader must either reach EOF or
/// return periodically (a read timeout) for close to complete.
pub struct ReadSource {
    name: String,
    reader: Option<Box<dyn Read + Send>>,
    chunk_size: usize,
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<()>>,
}

impl ReadSource {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task_handle: None,
        }
    }

    /// Maximum bytes per delivered chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Open a file for replay
    pub fn from_file(path: &std::path::Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path).map_err(|e| SourceError::Open {
            port: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(path.display().to_string(), Box::new(file)))
    }
}

impl ByteSource for ReadSource {
    fn open(&mut self, listener: Arc<dyn SourceListener>) -> Result<(), SourceError> {
        let mut reader = self.reader.take().ok_or(SourceError::AlreadyOpen)?;
        self.cancel_flag.store(false, Ordering::Relaxed);

        let name = self.name.clone();
        let cancel_flag = self.cancel_flag.clone();
        let chunk_size = self.chunk_size;

        let handle = std::thread::Builder::new()
            .name("coretemp-io".to_string())
            .spawn(move || {
                listener.on_open(&name);
                run_read_loop(&name, reader.as_mut(), listener.as_ref(), &cancel_flag, chunk_size);
            })?;
        self.task_handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.task_handle.take() {
            join_unless_current(&self.name, handle);
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl Drop for ReadSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Mutex};

    #[derive(Debug, PartialEq)]
    enum Event {
        Open(String),
        Data(Vec<u8>),
        Error(String),
    }

    struct Recorder(Mutex<mpsc::Sender<Event>>);

    impl SourceListener for Recorder {
        fn on_open(&self, description: &str) {
            let _ = self.0.lock().unwrap().send(Event::Open(description.to_string()));
        }
        fn on_data(&self, chunk: &[u8]) {
            let _ = self.0.lock().unwrap().send(Event::Data(chunk.to_vec()));
        }
        fn on_error(&self, error: SourceError) {
            let _ = self.0.lock().unwrap().send(Event::Error(error.to_string()));
        }
    }

    #[test]
    fn test_read_source_delivers_chunks_then_disconnect() {
        let (tx, rx) = mpsc::channel();
        let mut source = ReadSource::new("mem", Box::new(std::io::Cursor::new(b"abcdefg".to_vec())))
            .with_chunk_size(3);
        source.open(Arc::new(Recorder(Mutex::new(tx)))).unwrap();

        let events: Vec<Event> = rx.iter().collect();
        source.close();

        assert_eq!(
            events,
            vec![
                Event::Open("mem".to_string()),
                Event::Data(b"abc".to_vec()),
                Event::Data(b"def".to_vec()),
                Event::Data(b"g".to_vec()),
                Event::Error("device disconnected".to_string()),
            ]
        );
    }

    #[test]
    fn test_open_twice_fails() {
        let (tx, _rx) = mpsc::channel();
        let listener: Arc<dyn SourceListener> = Arc::new(Recorder(Mutex::new(tx)));
        let mut source = ReadSource::new("mem", Box::new(std::io::empty()));
        source.open(listener.clone()).unwrap();
        assert!(matches!(source.open(listener), Err(SourceError::AlreadyOpen)));
        source.close();
        source.close();
    }

    struct TimeoutThenData {
        calls: usize,
    }

    impl Read for TimeoutThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 | 2 => Err(std::io::Error::new(ErrorKind::TimedOut, "timeout")),
                3 => {
                    buf[0] = b'x';
                    Ok(1)
                }
                _ => Err(std::io::Error::new(ErrorKind::BrokenPipe, "unplugged")),
            }
        }
    }

    #[test]
    fn test_timeouts_are_retried_and_errors_reported() {
        let (tx, rx) = mpsc::channel();
        let recorder = Recorder(Mutex::new(tx));
        let cancel = AtomicBool::new(false);
        let mut reader = TimeoutThenData { calls: 0 };

        run_read_loop("test", &mut reader, &recorder, &cancel, 8);
        drop(recorder);

        let events: Vec<Event> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Data(b"x".to_vec()));
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("unplugged")));
    }

    #[test]
    fn test_cancelled_loop_reports_nothing() {
        let (tx, rx) = mpsc::channel();
        let recorder = Recorder(Mutex::new(tx));
        let cancel = AtomicBool::new(true);
        let mut reader = std::io::Cursor::new(b"data".to_vec());

        run_read_loop("test", &mut reader, &recorder, &cancel, 8);
        drop(recorder);

        assert_eq!(rx.iter().count(), 0);
    }
}
