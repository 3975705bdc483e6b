//! Text rendering of statuses and device events.

use std::time::Duration;

use minilink_devices::{DeviceEvent, DeviceSnapshot};
use minilink_progress::human_readable_countdown;
use minilink_protocol::{PrinterState, PrinterStatus};

pub fn status_line(status: &PrinterStatus, time_left: Option<Duration>) -> String {
    let state = match status.state {
        PrinterState::Idle => "idle".to_string(),
        PrinterState::Printing => format!("printing {}%", status.progress),
        PrinterState::Unknown => "unknown state".to_string(),
    };
    let mut line = format!(
        "{state}, hotend {}/{} °C, bed {}/{} °C",
        status.hotend_temperature,
        status.target_hotend_temperature,
        status.bed_temperature,
        status.target_bed_temperature,
    );
    if let Some(left) = time_left {
        line.push_str(". ");
        line.push_str(&human_readable_countdown(left.as_secs()));
    }
    line
}

pub fn snapshot_line(device: &DeviceSnapshot) -> String {
    let status = device
        .status
        .map(|s| status_line(&s, device.time_left))
        .unwrap_or_else(|| "no status yet".to_string());
    format!("{} [{:?}] {}", device.name, device.connection, status)
}

/// One line per event worth showing; per-status noise is left to `status`.
pub fn event_line(event: &DeviceEvent) -> Option<String> {
    let line = match event {
        DeviceEvent::DeviceAdded { name, address, .. } => format!("found {name} at {address}"),
        DeviceEvent::DeviceRemoved { device_id } => format!("{device_id}: removed"),
        DeviceEvent::AddressStateChanged { address, state } => format!("{address}: {state}"),
        DeviceEvent::ConnectionChanged { device_id, state } => {
            format!("{device_id}: {state:?}")
        }
        DeviceEvent::StatusChanged {
            device_id,
            status,
            time_left,
        } => format!("{device_id}: {}", status_line(status, *time_left)),
        DeviceEvent::RequestFulfilled { device_id, request } => {
            format!("{device_id}: {request} confirmed")
        }
        DeviceEvent::RequestFailed {
            device_id,
            request,
            error,
        } => format!("{device_id}: {request} failed: {error}"),
        DeviceEvent::UploadProgress {
            device_id,
            bytes_sent,
            bytes_total,
            message,
        } => {
            let percent = if *bytes_total == 0 {
                100
            } else {
                bytes_sent.saturating_mul(100) / bytes_total
            };
            format!("{device_id}: uploading {percent}%. {message}")
        }
        DeviceEvent::UploadFinished {
            device_id,
            file_name,
        } => format!("{device_id}: {file_name} uploaded"),
        DeviceEvent::UploadCancelled { device_id } => format!("{device_id}: upload cancelled"),
        DeviceEvent::Warning { device_id, message } => format!("{device_id}: warning: {message}"),
        DeviceEvent::DevicesChanged
        | DeviceEvent::PendingChanged { .. }
        | DeviceEvent::UploadingChanged { .. } => return None,
    };
    Some(line)
}
