//! Simulated printer state driven by `/set` commands and clock ticks.

use minilink_protocol::constants::MAX_PROGRESS;
use minilink_protocol::{Command, HeaterKind, PrinterState, PrinterStatus};

/// Degrees the hotend moves toward its target per tick.
const HOTEND_STEP: u16 = 5;
/// Degrees the bed moves toward its target per tick.
const BED_STEP: u16 = 2;
/// Temperature both heaters cool down to.
pub const AMBIENT_TEMPERATURE: u16 = 20;

/// A file received on `/upload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedUpload {
    /// `filename` of the multipart part, when present.
    pub file_name: Option<String>,
    /// Bytes received across the multipart parts.
    pub body_len: usize,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    status: PrinterStatus,
    commands: Vec<Command>,
    uploads: Vec<ReceivedUpload>,
    upload_speed_boosted: bool,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            status: PrinterStatus {
                hotend_temperature: AMBIENT_TEMPERATURE,
                bed_temperature: AMBIENT_TEMPERATURE,
                ..Default::default()
            },
            commands: Vec::new(),
            uploads: Vec::new(),
            upload_speed_boosted: false,
        }
    }
}

impl Simulation {
    pub fn status(&self) -> PrinterStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PrinterStatus) {
        self.status = status;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn uploads(&self) -> &[ReceivedUpload] {
        &self.uploads
    }

    pub fn upload_speed_boosted(&self) -> bool {
        self.upload_speed_boosted
    }

    /// Applies a command the way the firmware does. Pausing keeps the
    /// `Printing` flag, which the firmware never distinguishes.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::StartPrint | Command::ResumePrint | Command::PausePrint => {
                self.status.state = PrinterState::Printing;
            }
            Command::CancelPrint => {
                self.status.state = PrinterState::Idle;
                self.status.progress = 0;
            }
            Command::SetTemperature(target) => match target.kind() {
                HeaterKind::Hotend => self.status.target_hotend_temperature = target.celsius(),
                HeaterKind::Bed => self.status.target_bed_temperature = target.celsius(),
            },
            Command::IncreaseUploadSpeed => self.upload_speed_boosted = true,
        }
        self.commands.push(command);
    }

    pub fn record_upload(&mut self, upload: ReceivedUpload) {
        self.uploads.push(upload);
    }

    /// Advances the simulation by one step: heaters approach their targets
    /// (or ambient when off) and a running job gains one percent. A job that
    /// reaches 100 % goes back to idle.
    pub fn tick(&mut self) {
        let status = &mut self.status;
        status.hotend_temperature = approach(
            status.hotend_temperature,
            heater_goal(status.target_hotend_temperature),
            HOTEND_STEP,
        );
        status.bed_temperature = approach(
            status.bed_temperature,
            heater_goal(status.target_bed_temperature),
            BED_STEP,
        );

        if status.state == PrinterState::Printing {
            if status.progress >= MAX_PROGRESS - 1 {
                status.state = PrinterState::Idle;
                status.progress = 0;
            } else {
                status.progress += 1;
            }
        }
    }
}

fn heater_goal(target: u16) -> u16 {
    if target == 0 {
        AMBIENT_TEMPERATURE
    } else {
        target
    }
}

fn approach(current: u16, goal: u16, step: u16) -> u16 {
    if current < goal {
        (current + step).min(goal)
    } else {
        current.saturating_sub(step).max(goal)
    }
}
