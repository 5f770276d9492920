// src/analysis/mod.rs
//
// Line analysis: reading extraction and the single-worker queue that runs it.

pub mod parser;
pub mod queue;

pub use parser::{parse, Reading, Status};
pub use queue::{AnalysisHandler, AnalysisQueue, QueueCapacity, QueueStats};
