//! Wire protocol for the Monoprice Select Mini V2 HTTP interface.
//!
//! The printer answers `GET /inquiry` with a compact status string and
//! accepts commands as templated `GET /set?...` paths. This crate holds the
//! codec for both directions plus the small text formats that travel with
//! them (G-code preheat hints, the stored address list).

pub mod addresses;
pub mod command;
pub mod constants;
pub mod preheat;
pub mod status;

pub use addresses::{device_id_for, format_address_list, parse_address_list};
pub use command::{
    Command, HeaterKind, TargetTemperature, ValidationError, is_ok_response, is_valid_bed_input,
    is_valid_hotend_input,
};
pub use preheat::PreheatSettings;
pub use status::{PrinterState, PrinterStatus, StatusError};
