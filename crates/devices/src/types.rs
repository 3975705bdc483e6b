//! Public types for sessions and the registry.

use std::fmt;
use std::time::Duration;

use minilink_protocol::PrinterStatus;

/// Connectivity of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Known but not selected as an output device.
    Disconnected,
    Connected,
    /// Closed after the printer stopped answering.
    Closed,
}

/// Registry view of a printer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressState {
    Unknown,
    /// A status query is outstanding, or a stored address has not answered yet.
    Probing,
    Active,
    Unreachable,
}

impl fmt::Display for AddressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Probing => "probing",
            Self::Active => "active",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// A user request awaiting confirmation from an observed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Start or resume.
    Start,
    Pause,
    Cancel,
    HotendTemperature,
    BedTemperature,
    Upload,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start print",
            Self::Pause => "pause print",
            Self::Cancel => "cancel print",
            Self::HotendTemperature => "set hotend temperature",
            Self::BedTemperature => "set bed temperature",
            Self::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// Requests issued but not yet confirmed by the printer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRequests {
    pub start: bool,
    pub pause: bool,
    pub cancel: bool,
    pub hotend: Option<u16>,
    pub bed: Option<u16>,
}

impl PendingRequests {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn contains(&self, kind: RequestKind) -> bool {
        match kind {
            RequestKind::Start => self.start,
            RequestKind::Pause => self.pause,
            RequestKind::Cancel => self.cancel,
            RequestKind::HotendTemperature => self.hotend.is_some(),
            RequestKind::BedTemperature => self.bed.is_some(),
            RequestKind::Upload => false,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub id: String,
    pub address: String,
    pub name: String,
    pub connection: ConnectionState,
    pub status: Option<PrinterStatus>,
    pub uploading: bool,
    pub pending: PendingRequests,
    pub time_left: Option<Duration>,
}

/// Events emitted by sessions and the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    DeviceAdded {
        device_id: String,
        address: String,
        name: String,
    },
    DeviceRemoved {
        device_id: String,
    },
    /// The set of devices or their connectivity changed.
    DevicesChanged,
    AddressStateChanged {
        address: String,
        state: AddressState,
    },
    ConnectionChanged {
        device_id: String,
        state: ConnectionState,
    },
    StatusChanged {
        device_id: String,
        status: PrinterStatus,
        time_left: Option<Duration>,
    },
    PendingChanged {
        device_id: String,
        pending: PendingRequests,
    },
    RequestFulfilled {
        device_id: String,
        request: RequestKind,
    },
    RequestFailed {
        device_id: String,
        request: RequestKind,
        error: String,
    },
    UploadingChanged {
        device_id: String,
        uploading: bool,
    },
    UploadProgress {
        device_id: String,
        bytes_sent: u64,
        bytes_total: u64,
        /// Estimated time left, or a placeholder until enough data is in.
        message: String,
    },
    UploadFinished {
        device_id: String,
        file_name: String,
    },
    UploadCancelled {
        device_id: String,
    },
    Warning {
        device_id: String,
        message: String,
    },
}

impl DeviceEvent {
    /// Device the event refers to, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::DeviceAdded { device_id, .. }
            | Self::DeviceRemoved { device_id }
            | Self::ConnectionChanged { device_id, .. }
            | Self::StatusChanged { device_id, .. }
            | Self::PendingChanged { device_id, .. }
            | Self::RequestFulfilled { device_id, .. }
            | Self::RequestFailed { device_id, .. }
            | Self::UploadingChanged { device_id, .. }
            | Self::UploadProgress { device_id, .. }
            | Self::UploadFinished { device_id, .. }
            | Self::UploadCancelled { device_id }
            | Self::Warning { device_id, .. } => Some(device_id),
            Self::DevicesChanged | Self::AddressStateChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_contains() {
        let pending = PendingRequests {
            pause: true,
            bed: Some(60),
            ..Default::default()
        };
        assert!(pending.contains(RequestKind::Pause));
        assert!(pending.contains(RequestKind::BedTemperature));
        assert!(!pending.contains(RequestKind::Start));
        assert!(!pending.is_empty());
        assert!(PendingRequests::default().is_empty());
    }

    #[test]
    fn event_device_id() {
        let event = DeviceEvent::UploadCancelled {
            device_id: "manual:10.0.0.5".into(),
        };
        assert_eq!(event.device_id(), Some("manual:10.0.0.5"));
        assert_eq!(DeviceEvent::DevicesChanged.device_id(), None);
    }
}
