// src/io/serial/utils.rs
//
// Serial port configuration types and conversions for the serialport crate.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};

use crate::error::SourceError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Single-letter form used in `8-N-1` style descriptions
    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Serial port configuration. Opaque to the framing core, interpreted only by `SerialSource`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Assert DTR after opening (many USB bridges only transmit with DTR set)
    pub dtr: bool,
    pub rts: bool,
    /// Read timeout; bounds how long `close` waits for the reader thread
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            dtr: true,
            rts: true,
            read_timeout_ms: 50,
        }
    }
}

impl SerialConfig {
    /// e.g. `/dev/ttyUSB0 @ 115200 (8-N-1)`
    pub fn describe(&self) -> String {
        format!(
            "{} @ {} ({}-{}-{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

// ============================================================================
// serialport Conversions
// ============================================================================

impl From<Parity> for SpParity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }
}

impl SerialConfig {
    /// Line settings in serialport's types. Counts the port cannot represent are
    /// refused rather than replaced, so a typo in the settings file is visible.
    pub fn line_settings(&self) -> Result<(DataBits, StopBits, SpParity), SourceError> {
        let data_bits = match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => return Err(self.invalid(format!("unsupported data bits {}", other))),
        };
        let stop_bits = match self.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => return Err(self.invalid(format!("unsupported stop bits {}", other))),
        };
        Ok((data_bits, stop_bits, self.parity.into()))
    }

    fn invalid(&self, message: String) -> SourceError {
        SourceError::Open {
            port: self.port.clone(),
            message,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
