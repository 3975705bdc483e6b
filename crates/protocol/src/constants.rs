//! Protocol constants: endpoints, limits and printer identity.

/// Status query endpoint.
pub const INQUIRY_PATH: &str = "/inquiry";

/// Model upload endpoint (multipart/form-data).
pub const UPLOAD_PATH: &str = "/upload";

/// Name of the multipart field carrying the uploaded file.
pub const UPLOAD_FIELD_NAME: &str = "file";

/// Command endpoint prefix.
pub const SET_PATH: &str = "/set";

/// Raises the printer's transfer rate from level 2 (39 Kbps) to level 4
/// (91 Kbps).
pub const INCREASE_UPLOAD_SPEED_PATH: &str = "/set?code=M563%20S4";

/// Body returned by the printer when a command is accepted.
pub const OK_RESPONSE: &str = "OK";

/// Maximum hotend temperature, in degrees Celsius.
pub const MAX_HOTEND_TEMPERATURE: u16 = 260;

/// Maximum bed temperature, in degrees Celsius.
pub const MAX_BED_TEMPERATURE: u16 = 85;

/// Maximum print progress, in percent.
pub const MAX_PROGRESS: u8 = 100;

/// Prefix of the stable device identifier derived from an address.
pub const DEVICE_ID_PREFIX: &str = "manual:";

/// Printer type reported to machine-profile collaborators.
pub const PRINTER_TYPE: &str = "monoprice_select_mini_v2";

/// Human-readable model name.
pub const PRINTER_MODEL: &str = "MPSM V2";
