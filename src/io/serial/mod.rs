// src/io/serial/mod.rs
//
// Serial port source with line framing.
//
// Features:
// - Raw byte delivery from a dedicated reader thread
// - Line extraction for LF, CRLF and bare CR terminated text

pub mod framer;
pub mod reader;
pub(crate) mod utils;

pub use framer::{CompletedLine, DecodePolicy, FramedLine, LineFramer, LineFramerConfig};
pub use reader::SerialSource;
pub use utils::{Parity, SerialConfig};
