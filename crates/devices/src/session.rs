//! Per-printer session state machine.
//!
//! A session tracks connectivity, the last observed status, an in-flight
//! upload and the set of user requests that the printer has not confirmed
//! yet. Requests are optimistic: a pending flag is raised when the command is
//! issued and cleared only when a later status shows its effect, or when the
//! command itself fails.
//!
//! The printer does not distinguish paused from printing, so any `Printing`
//! observation confirms both start/resume and pause requests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minilink_client::{ApiError, PrinterApi, ProgressCallback, expect_ok};
use minilink_progress::{Clock, ProgressTracker, SystemClock, UploadEstimator};
use minilink_protocol::constants::PRINTER_MODEL;
use minilink_protocol::{
    Command, HeaterKind, PreheatSettings, PrinterState, PrinterStatus, StatusError,
    TargetTemperature, device_id_for,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::SessionError;
use crate::heartbeat::PollerControl;
use crate::types::{ConnectionState, DeviceEvent, DeviceSnapshot, PendingRequests, RequestKind};

/// Construction options for a [`DeviceSession`].
#[derive(Clone)]
pub struct SessionOptions {
    /// Send G-code preheat targets after a successful upload.
    pub apply_preheat: bool,
    /// Time source for the print and upload estimators.
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            apply_preheat: true,
            clock: Arc::new(SystemClock),
        }
    }
}

struct ActiveUpload {
    generation: u64,
    cancel: CancellationToken,
}

struct SessionState {
    connection: ConnectionState,
    status: Option<PrinterStatus>,
    upload: Option<ActiveUpload>,
    upload_generation: u64,
    pending: PendingRequests,
    tracker: ProgressTracker,
}

/// In-memory state of one printer.
pub struct DeviceSession {
    id: String,
    address: String,
    name: String,
    api: Arc<dyn PrinterApi>,
    events_tx: mpsc::Sender<DeviceEvent>,
    apply_preheat: bool,
    clock: Arc<dyn Clock>,
    poller: Mutex<Option<PollerControl>>,
    state: Mutex<SessionState>,
}

impl DeviceSession {
    /// Creates a disconnected session for `address`.
    pub fn new(
        address: &str,
        api: Arc<dyn PrinterApi>,
        events_tx: mpsc::Sender<DeviceEvent>,
        options: SessionOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: device_id_for(address),
            address: address.to_string(),
            name: format!("{PRINTER_MODEL} {address}"),
            api,
            events_tx,
            apply_preheat: options.apply_preheat,
            clock: options.clock.clone(),
            poller: Mutex::new(None),
            state: Mutex::new(SessionState {
                connection: ConnectionState::Disconnected,
                status: None,
                upload: None,
                upload_generation: 0,
                pending: PendingRequests::default(),
                tracker: ProgressTracker::with_clock(options.clock),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Links the heartbeat poller so uploads can pause it.
    pub fn attach_poller(&self, control: PollerControl) {
        *self.poller.lock().unwrap_or_else(PoisonError::into_inner) = Some(control);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DeviceEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(device = %self.id, ?event, "event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                trace!(device = %self.id, "event channel closed");
            }
        }
    }

    // -- connectivity --------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connect(&self) {
        self.set_connection(ConnectionState::Connected);
    }

    pub fn disconnect(&self) {
        self.set_connection(ConnectionState::Disconnected);
    }

    /// Marks the printer as gone.
    pub fn close(&self) {
        self.set_connection(ConnectionState::Closed);
    }

    fn set_connection(&self, new_state: ConnectionState) {
        let changed = {
            let mut state = self.lock();
            let changed = state.connection != new_state;
            state.connection = new_state;
            changed
        };
        if changed {
            debug!(device = %self.id, state = ?new_state, "connection state changed");
            self.emit(DeviceEvent::ConnectionChanged {
                device_id: self.id.clone(),
                state: new_state,
            });
        }
    }

    // -- observed state ------------------------------------------------------

    pub fn status(&self) -> Option<PrinterStatus> {
        self.lock().status
    }

    pub fn pending(&self) -> PendingRequests {
        self.lock().pending
    }

    pub fn is_uploading(&self) -> bool {
        self.lock().upload.is_some()
    }

    pub fn estimated_time_left(&self) -> Option<Duration> {
        self.lock().tracker.estimated_time_left()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let state = self.lock();
        DeviceSnapshot {
            id: self.id.clone(),
            address: self.address.clone(),
            name: self.name.clone(),
            connection: state.connection,
            status: state.status,
            uploading: state.upload.is_some(),
            pending: state.pending,
            time_left: state.tracker.estimated_time_left(),
        }
    }

    /// Applies a raw `/inquiry` body. Unparseable bodies leave the session
    /// untouched.
    pub fn observe_status(&self, raw: &str) -> Result<PrinterStatus, StatusError> {
        let status = match PrinterStatus::decode(raw) {
            Ok(status) => status,
            Err(e) => {
                warn!(device = %self.id, error = %e, "ignoring unparseable status");
                return Err(e);
            }
        };

        let mut fulfilled = Vec::new();
        let mut warning = None;
        let (time_left, pending, pending_changed) = {
            let mut state = self.lock();
            let before = state.pending;

            if state.pending.hotend == Some(status.target_hotend_temperature) {
                state.pending.hotend = None;
                fulfilled.push(RequestKind::HotendTemperature);
            }
            if state.pending.bed == Some(status.target_bed_temperature) {
                state.pending.bed = None;
                fulfilled.push(RequestKind::BedTemperature);
            }

            match status.state {
                PrinterState::Idle => {
                    state.tracker.reset();
                    if state.pending.cancel {
                        state.pending.cancel = false;
                        fulfilled.push(RequestKind::Cancel);
                    }
                }
                PrinterState::Printing => {
                    if let Err(e) = state.tracker.update(status.progress) {
                        warn!(device = %self.id, error = %e, "progress rejected");
                    }
                    if state.pending.start {
                        state.pending.start = false;
                        fulfilled.push(RequestKind::Start);
                    }
                    if state.pending.pause {
                        state.pending.pause = false;
                        fulfilled.push(RequestKind::Pause);
                    }
                }
                PrinterState::Unknown => {
                    warning = Some(format!("printer reported an unknown state: {raw:?}"));
                }
            }

            state.status = Some(status);
            (
                state.tracker.estimated_time_left(),
                state.pending,
                state.pending != before,
            )
        };

        trace!(device = %self.id, %status, "status observed");
        self.emit(DeviceEvent::StatusChanged {
            device_id: self.id.clone(),
            status,
            time_left,
        });
        if let Some(message) = warning {
            warn!(device = %self.id, "{message}");
            self.emit(DeviceEvent::Warning {
                device_id: self.id.clone(),
                message,
            });
        }
        for request in fulfilled {
            debug!(device = %self.id, %request, "request fulfilled");
            self.emit(DeviceEvent::RequestFulfilled {
                device_id: self.id.clone(),
                request,
            });
        }
        if pending_changed {
            self.emit(DeviceEvent::PendingChanged {
                device_id: self.id.clone(),
                pending,
            });
        }
        Ok(status)
    }

    // -- commands ------------------------------------------------------------

    /// Prints the file cached on the printer.
    pub async fn start_print(&self) -> Result<(), SessionError> {
        self.print_command(Command::StartPrint, RequestKind::Start)
            .await
    }

    pub async fn resume_print(&self) -> Result<(), SessionError> {
        self.print_command(Command::ResumePrint, RequestKind::Start)
            .await
    }

    pub async fn pause_print(&self) -> Result<(), SessionError> {
        self.print_command(Command::PausePrint, RequestKind::Pause)
            .await
    }

    pub async fn cancel_print(&self) -> Result<(), SessionError> {
        self.print_command(Command::CancelPrint, RequestKind::Cancel)
            .await
    }

    /// Requests a target temperature. Out-of-range values are rejected
    /// before anything is sent or marked pending.
    pub async fn set_target_temperature(
        &self,
        kind: HeaterKind,
        celsius: i32,
    ) -> Result<(), SessionError> {
        let target = TargetTemperature::new(kind, celsius).map_err(ApiError::from)?;
        let request = match kind {
            HeaterKind::Hotend => RequestKind::HotendTemperature,
            HeaterKind::Bed => RequestKind::BedTemperature,
        };
        info!(device = %self.id, %kind, celsius, "setting target temperature");
        self.mark_pending(request, Some(target.celsius()));
        let result = self
            .api
            .set_temperature(kind, celsius)
            .await
            .and_then(expect_ok);
        self.settle(request, result)
    }

    /// Raises the printer's transfer rate. A failure only produces a warning.
    pub async fn increase_upload_speed(&self) -> Result<(), SessionError> {
        match self.api.increase_upload_speed().await.and_then(expect_ok) {
            Ok(_) => {
                debug!(device = %self.id, "upload speed increased");
                Ok(())
            }
            Err(e) => {
                warn!(device = %self.id, error = %e, "could not increase upload speed");
                self.emit(DeviceEvent::Warning {
                    device_id: self.id.clone(),
                    message: format!("could not increase upload speed: {e}"),
                });
                Err(e.into())
            }
        }
    }

    async fn print_command(&self, command: Command, request: RequestKind) -> Result<(), SessionError> {
        info!(device = %self.id, %command, "sending command");
        self.mark_pending(request, None);
        let result = self.api.send_command(command).await.and_then(expect_ok);
        self.settle(request, result)
    }

    fn mark_pending(&self, request: RequestKind, target: Option<u16>) {
        let pending = {
            let mut state = self.lock();
            match request {
                RequestKind::Start => state.pending.start = true,
                RequestKind::Pause => state.pending.pause = true,
                RequestKind::Cancel => state.pending.cancel = true,
                RequestKind::HotendTemperature => state.pending.hotend = target,
                RequestKind::BedTemperature => state.pending.bed = target,
                RequestKind::Upload => {}
            }
            state.pending
        };
        self.emit(DeviceEvent::PendingChanged {
            device_id: self.id.clone(),
            pending,
        });
    }

    fn clear_pending(&self, request: RequestKind) {
        let pending = {
            let mut state = self.lock();
            match request {
                RequestKind::Start => state.pending.start = false,
                RequestKind::Pause => state.pending.pause = false,
                RequestKind::Cancel => state.pending.cancel = false,
                RequestKind::HotendTemperature => state.pending.hotend = None,
                RequestKind::BedTemperature => state.pending.bed = None,
                RequestKind::Upload => {}
            }
            state.pending
        };
        self.emit(DeviceEvent::PendingChanged {
            device_id: self.id.clone(),
            pending,
        });
    }

    fn settle(
        &self,
        request: RequestKind,
        result: Result<String, ApiError>,
    ) -> Result<(), SessionError> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(device = %self.id, %request, error = %e, "request failed");
                self.clear_pending(request);
                self.emit(DeviceEvent::RequestFailed {
                    device_id: self.id.clone(),
                    request,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    // -- uploads -------------------------------------------------------------

    /// Starts uploading a model in the background.
    ///
    /// Refused while another upload runs or the printer is printing. The
    /// heartbeat is suspended for the duration. On success the preheat
    /// targets found in the G-code are sent (when enabled) and printing is
    /// started.
    pub fn start_upload(
        self: &Arc<Self>,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<JoinHandle<()>, SessionError> {
        let file_name = file_name.into();
        let admitted = {
            let mut state = self.lock();
            if state.upload.is_some() {
                Err(SessionError::UploadInProgress)
            } else if state.status.is_some_and(|s| s.is_printing()) {
                Err(SessionError::Printing)
            } else {
                state.upload_generation += 1;
                let upload = ActiveUpload {
                    generation: state.upload_generation,
                    cancel: CancellationToken::new(),
                };
                let admitted = (upload.generation, upload.cancel.clone());
                state.upload = Some(upload);
                Ok(admitted)
            }
        };
        let (generation, cancel) = match admitted {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(device = %self.id, file = %file_name, error = %e, "upload refused");
                self.emit(DeviceEvent::RequestFailed {
                    device_id: self.id.clone(),
                    request: RequestKind::Upload,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        info!(device = %self.id, file = %file_name, bytes = data.len(), "starting upload");
        self.emit(DeviceEvent::UploadingChanged {
            device_id: self.id.clone(),
            uploading: true,
        });
        self.with_poller(PollerControl::suspend);

        let preheat = if self.apply_preheat {
            PreheatSettings::parse(&data)
        } else {
            PreheatSettings::default()
        };
        let on_progress = self.progress_callback();
        let session = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let result = session
                .api
                .upload_file(file_name.clone(), data, on_progress, cancel)
                .await;
            session
                .finish_upload(generation, &file_name, preheat, result)
                .await;
        }))
    }

    fn progress_callback(&self) -> ProgressCallback {
        let estimator = Mutex::new(UploadEstimator::start_with_clock(self.clock.clone()));
        let events_tx = self.events_tx.clone();
        let device_id = self.id.clone();
        Arc::new(move |bytes_sent, bytes_total| {
            let message = {
                let mut estimator = estimator.lock().unwrap_or_else(PoisonError::into_inner);
                estimator.update(bytes_sent, bytes_total);
                estimator.text().to_string()
            };
            let event = DeviceEvent::UploadProgress {
                device_id: device_id.clone(),
                bytes_sent,
                bytes_total,
                message,
            };
            if let Err(e) = events_tx.try_send(event) {
                trace!(device = %device_id, "upload progress not delivered: {e}");
            }
        })
    }

    async fn finish_upload(
        &self,
        generation: u64,
        file_name: &str,
        preheat: PreheatSettings,
        result: Result<String, ApiError>,
    ) {
        let current = {
            let mut state = self.lock();
            let current = state
                .upload
                .as_ref()
                .is_some_and(|u| u.generation == generation);
            if current {
                state.upload = None;
            }
            current
        };
        if !current {
            debug!(device = %self.id, generation, "ignoring result of a cancelled upload");
            return;
        }

        self.with_poller(PollerControl::resume);
        self.emit(DeviceEvent::UploadingChanged {
            device_id: self.id.clone(),
            uploading: false,
        });

        match result.and_then(expect_ok) {
            Ok(_) => {
                info!(device = %self.id, file = %file_name, "upload finished");
                self.emit(DeviceEvent::UploadFinished {
                    device_id: self.id.clone(),
                    file_name: file_name.to_string(),
                });
                if let Some(bed) = preheat.bed
                    && let Err(e) = self.set_target_temperature(HeaterKind::Bed, i32::from(bed)).await
                {
                    warn!(device = %self.id, error = %e, "could not apply bed preheat");
                }
                if let Some(hotend) = preheat.hotend
                    && let Err(e) = self
                        .set_target_temperature(HeaterKind::Hotend, i32::from(hotend))
                        .await
                {
                    warn!(device = %self.id, error = %e, "could not apply hotend preheat");
                }
                if let Err(e) = self.start_print().await {
                    warn!(device = %self.id, error = %e, "could not start print after upload");
                }
            }
            Err(ApiError::Cancelled) => {
                debug!(device = %self.id, "upload cancelled");
            }
            Err(e) => {
                warn!(device = %self.id, file = %file_name, error = %e, "upload failed");
                self.emit(DeviceEvent::RequestFailed {
                    device_id: self.id.clone(),
                    request: RequestKind::Upload,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Aborts the running upload and asks the printer to cancel. Returns
    /// false when nothing was uploading.
    pub async fn cancel_upload(&self) -> bool {
        let upload = self.lock().upload.take();
        let Some(upload) = upload else {
            return false;
        };

        upload.cancel.cancel();
        self.emit(DeviceEvent::UploadingChanged {
            device_id: self.id.clone(),
            uploading: false,
        });
        self.with_poller(|poller| {
            poller.suspend();
            poller.resume();
        });
        info!(device = %self.id, "upload cancelled by user");

        if let Err(e) = self
            .api
            .send_command(Command::CancelPrint)
            .await
            .and_then(expect_ok)
        {
            warn!(device = %self.id, error = %e, "cancel after aborted upload failed");
        }
        self.emit(DeviceEvent::UploadCancelled {
            device_id: self.id.clone(),
        });
        true
    }

    /// Drops any running upload without contacting the printer.
    pub(crate) fn abort_upload(&self) {
        if let Some(upload) = self.lock().upload.take() {
            upload.cancel.cancel();
        }
    }

    fn with_poller(&self, f: impl FnOnce(&PollerControl)) {
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(poller) = poller {
            f(&poller);
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
