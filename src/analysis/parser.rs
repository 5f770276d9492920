// src/analysis/parser.rs
//
// Reading extraction for probe status lines of the form `label, value unit, STATUS`.

use serde::Serialize;

/// Status token that marks a line as carrying a valid measurement
pub const STATUS_OK: &str = "OK";

const FIELD_SEPARATOR: char = ',';
const FIELD_COUNT: usize = 3;

/// Probe-reported status of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
}

/// A measurement extracted from one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// First field, usually a sequence number or channel name
    pub label: String,
    /// Measurement text exactly as the probe sent it, e.g. `23.5`
    pub value: String,
    /// Unit annotation following the value, e.g. `C`. Not validated
    pub unit: Option<String>,
    pub status: Status,
}

impl Reading {
    /// The value as a number, when it is one
    pub fn numeric(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// Parse one line into a reading.
///
/// Returns `None` for any line that is not exactly three comma-separated
/// fields ending in `OK`. That is the normal outcome for banners, blank lines
/// and failed measurements, not an error.
pub fn parse(line: &str) -> Option<Reading> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() != FIELD_COUNT || fields[2] != STATUS_OK {
        return None;
    }

    // Labels are single tokens. This rejects a measurement shifted into the label
    // by a stray comma (`23.5 C, 23.5 C, OK`), at the cost of also rejecting
    // multi-word labels such as `Probe 1, 23.5 C, OK`.
    let label = fields[0];
    if label.split_whitespace().nth(1).is_some() {
        return None;
    }

    let mut parts = fields[1].split_whitespace();
    let value = parts.next()?;
    let unit: Vec<&str> = parts.collect();

    Some(Reading {
        label: label.to_string(),
        value: value.to_string(),
        unit: if unit.is_empty() {
            None
        } else {
            Some(unit.join(" "))
        },
        status: Status::Ok,
    })
}
