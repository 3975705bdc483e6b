//! Command templates for the printer's `/set` endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    INCREASE_UPLOAD_SPEED_PATH, MAX_BED_TEMPERATURE, MAX_HOTEND_TEMPERATURE, OK_RESPONSE,
};

const CMD_PREFIX: &str = "/set?cmd=";

/// A temperature or print command was rejected before reaching the printer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{kind} temperature {value}°C outside 0..={max}")]
    TemperatureOutOfRange {
        kind: HeaterKind,
        value: i32,
        max: u16,
    },
}

/// Which heater a temperature command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaterKind {
    Hotend,
    Bed,
}

impl HeaterKind {
    pub fn max_temperature(self) -> u16 {
        match self {
            Self::Hotend => MAX_HOTEND_TEMPERATURE,
            Self::Bed => MAX_BED_TEMPERATURE,
        }
    }
}

impl fmt::Display for HeaterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hotend => write!(f, "hotend"),
            Self::Bed => write!(f, "bed"),
        }
    }
}

/// A validated target temperature. Construction fails outside the heater's
/// range, so every value of this type is safe to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetTemperature {
    kind: HeaterKind,
    celsius: u16,
}

impl TargetTemperature {
    pub fn new(kind: HeaterKind, celsius: i32) -> Result<Self, ValidationError> {
        let max = kind.max_temperature();
        if !(0..=i32::from(max)).contains(&celsius) {
            return Err(ValidationError::TemperatureOutOfRange {
                kind,
                value: celsius,
                max,
            });
        }
        Ok(Self {
            kind,
            celsius: celsius as u16,
        })
    }

    pub fn hotend(celsius: i32) -> Result<Self, ValidationError> {
        Self::new(HeaterKind::Hotend, celsius)
    }

    pub fn bed(celsius: i32) -> Result<Self, ValidationError> {
        Self::new(HeaterKind::Bed, celsius)
    }

    pub fn kind(&self) -> HeaterKind {
        self.kind
    }

    pub fn celsius(&self) -> u16 {
        self.celsius
    }
}

/// Every request the printer accepts on `/set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartPrint,
    ResumePrint,
    PausePrint,
    CancelPrint,
    SetTemperature(TargetTemperature),
    IncreaseUploadSpeed,
}

impl Command {
    /// Request path (with query) for this command.
    pub fn path(&self) -> String {
        match self {
            Self::StartPrint => format!("{CMD_PREFIX}{{P:M}}"),
            Self::ResumePrint => format!("{CMD_PREFIX}{{P:R}}"),
            Self::PausePrint => format!("{CMD_PREFIX}{{P:P}}"),
            Self::CancelPrint => format!("{CMD_PREFIX}{{P:X}}"),
            Self::SetTemperature(target) => match target.kind {
                HeaterKind::Hotend => format!("{CMD_PREFIX}{{C:T{:04}}}", target.celsius),
                HeaterKind::Bed => format!("{CMD_PREFIX}{{C:P{:03}}}", target.celsius),
            },
            Self::IncreaseUploadSpeed => INCREASE_UPLOAD_SPEED_PATH.to_string(),
        }
    }

    /// Parses a request path back into a command. Returns `None` for
    /// anything that is not one of the templates.
    pub fn parse_path(path: &str) -> Option<Self> {
        if path == INCREASE_UPLOAD_SPEED_PATH {
            return Some(Self::IncreaseUploadSpeed);
        }
        let body = path
            .strip_prefix(CMD_PREFIX)?
            .strip_prefix('{')?
            .strip_suffix('}')?;

        match body {
            "P:M" => return Some(Self::StartPrint),
            "P:R" => return Some(Self::ResumePrint),
            "P:P" => return Some(Self::PausePrint),
            "P:X" => return Some(Self::CancelPrint),
            _ => {}
        }

        let (kind, digits) = if let Some(digits) = body.strip_prefix("C:T") {
            (HeaterKind::Hotend, digits)
        } else if let Some(digits) = body.strip_prefix("C:P") {
            (HeaterKind::Bed, digits)
        } else {
            return None;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let celsius = digits.parse::<i32>().ok()?;
        TargetTemperature::new(kind, celsius)
            .ok()
            .map(Self::SetTemperature)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartPrint => write!(f, "start print"),
            Self::ResumePrint => write!(f, "resume print"),
            Self::PausePrint => write!(f, "pause print"),
            Self::CancelPrint => write!(f, "cancel print"),
            Self::SetTemperature(t) => write!(f, "set {} temperature to {}", t.kind, t.celsius),
            Self::IncreaseUploadSpeed => write!(f, "increase upload speed"),
        }
    }
}

/// True when a response body is the printer's acknowledgement.
pub fn is_ok_response(body: &str) -> bool {
    body.trim().eq_ignore_ascii_case(OK_RESPONSE)
}

/// Whether `input` is an acceptable hotend temperature entry.
pub fn is_valid_hotend_input(input: &str) -> bool {
    is_valid_input(input, HeaterKind::Hotend)
}

/// Whether `input` is an acceptable bed temperature entry.
pub fn is_valid_bed_input(input: &str) -> bool {
    is_valid_input(input, HeaterKind::Bed)
}

fn is_valid_input(input: &str, kind: HeaterKind) -> bool {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match input.parse::<u32>() {
        Ok(value) => value <= u32::from(kind.max_temperature()),
        Err(_) => false,
    }
}
