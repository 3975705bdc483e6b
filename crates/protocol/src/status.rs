//! Status codec for `GET /inquiry` responses.
//!
//! The printer reports `T<hotend>/<target>P<bed>/<target>/<progress><flag>`,
//! e.g. `T205/210P60/60/42P`. Numbers have no fixed width. The trailing flag
//! is `I` (idle) or `P` (printing); any other non-digit flag decodes to
//! [`PrinterState::Unknown`], while a structurally different string is an
//! error.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BED_TEMPERATURE, MAX_HOTEND_TEMPERATURE, MAX_PROGRESS};

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^T([0-9]+)/([0-9]+)P([0-9]+)/([0-9]+)/([0-9]+)([^0-9])$")
        .unwrap_or_else(|e| unreachable!("status pattern is valid: {e}"))
});

/// Errors from decoding a status response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("response does not match the status grammar: {0:?}")]
    Malformed(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u64 },
}

/// Printer activity as reported by the status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterState {
    Idle,
    /// Printing or paused; the protocol does not tell them apart.
    Printing,
    Unknown,
}

impl PrinterState {
    fn from_flag(flag: char) -> Self {
        match flag {
            'I' => Self::Idle,
            'P' => Self::Printing,
            _ => Self::Unknown,
        }
    }

    /// Wire flag for this state. `Unknown` has no wire form and renders as `?`.
    pub fn flag(self) -> char {
        match self {
            Self::Idle => 'I',
            Self::Printing => 'P',
            Self::Unknown => '?',
        }
    }
}

/// Decoded printer status. All fields are present or decoding fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub hotend_temperature: u16,
    pub target_hotend_temperature: u16,
    pub bed_temperature: u16,
    pub target_bed_temperature: u16,
    pub progress: u8,
    pub state: PrinterState,
}

impl Default for PrinterStatus {
    fn default() -> Self {
        Self {
            hotend_temperature: 0,
            target_hotend_temperature: 0,
            bed_temperature: 0,
            target_bed_temperature: 0,
            progress: 0,
            state: PrinterState::Idle,
        }
    }
}

impl PrinterStatus {
    /// Decodes a raw `/inquiry` body.
    ///
    /// Trailing line breaks are tolerated; anything else outside the grammar
    /// is rejected.
    pub fn decode(raw: &str) -> Result<Self, StatusError> {
        let trimmed = raw.trim_end_matches(['\r', '\n']);
        let caps = STATUS_RE
            .captures(trimmed)
            .ok_or_else(|| StatusError::Malformed(raw.to_string()))?;

        let number = |index: usize, field: &'static str, max: u16| -> Result<u16, StatusError> {
            let digits = &caps[index];
            match digits.parse::<u64>() {
                Ok(value) if value <= u64::from(max) => Ok(value as u16),
                Ok(value) => Err(StatusError::OutOfRange { field, value }),
                Err(_) => Err(StatusError::OutOfRange {
                    field,
                    value: u64::MAX,
                }),
            }
        };

        // Measured temperatures can overshoot the settable range.
        let hotend_temperature = number(1, "hotend temperature", u16::MAX)?;
        let target_hotend_temperature =
            number(2, "target hotend temperature", MAX_HOTEND_TEMPERATURE)?;
        let bed_temperature = number(3, "bed temperature", u16::MAX)?;
        let target_bed_temperature = number(4, "target bed temperature", MAX_BED_TEMPERATURE)?;
        let progress = number(5, "progress", u16::from(MAX_PROGRESS))? as u8;
        let flag = caps[6].chars().next().unwrap_or('?');

        Ok(Self {
            hotend_temperature,
            target_hotend_temperature,
            bed_temperature,
            target_bed_temperature,
            progress,
            state: PrinterState::from_flag(flag),
        })
    }

    /// Renders the status in its wire form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn is_printing(&self) -> bool {
        self.state == PrinterState::Printing
    }
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T{}/{}P{}/{}/{}{}",
            self.hotend_temperature,
            self.target_hotend_temperature,
            self.bed_temperature,
            self.target_bed_temperature,
            self.progress,
            self.state.flag()
        )
    }
}

impl std::str::FromStr for PrinterStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
