//! Mock printer API shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minilink_client::{ApiError, ApiFactory, ApiFuture, PrinterApi, ProgressCallback};
use minilink_protocol::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::DeviceEvent;

pub(crate) const IDLE: &str = "T20/0P20/0/0I";

pub(crate) struct MockApi {
    address: String,
    status: Mutex<Result<String, ApiError>>,
    command_reply: Mutex<Result<String, ApiError>>,
    upload_reply: Mutex<Result<String, ApiError>>,
    hold_uploads: AtomicBool,
    status_queries: AtomicUsize,
    commands: Mutex<Vec<Command>>,
    uploads: Mutex<Vec<(String, usize)>>,
}

impl MockApi {
    pub(crate) fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            status: Mutex::new(Ok(IDLE.to_string())),
            command_reply: Mutex::new(Ok("OK".to_string())),
            upload_reply: Mutex::new(Ok("OK".to_string())),
            hold_uploads: AtomicBool::new(false),
            status_queries: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_status(&self, status: Result<&str, ApiError>) {
        *self.status.lock().unwrap() = status.map(str::to_string);
    }

    pub(crate) fn set_command_reply(&self, reply: Result<&str, ApiError>) {
        *self.command_reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub(crate) fn set_upload_reply(&self, reply: Result<&str, ApiError>) {
        *self.upload_reply.lock().unwrap() = reply.map(str::to_string);
    }

    /// Makes uploads block until their cancel token fires.
    pub(crate) fn hold_uploads(&self, hold: bool) {
        self.hold_uploads.store(hold, Ordering::SeqCst);
    }

    pub(crate) fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn uploads(&self) -> Vec<(String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl PrinterApi for MockApi {
    fn address(&self) -> &str {
        &self.address
    }

    fn query_status(&self) -> ApiFuture<'_, String> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let reply = self.status.lock().unwrap().clone();
        Box::pin(async move { reply })
    }

    fn send_command(&self, command: Command) -> ApiFuture<'_, String> {
        self.commands.lock().unwrap().push(command);
        let reply = self.command_reply.lock().unwrap().clone();
        Box::pin(async move { reply })
    }

    fn upload_file(
        &self,
        file_name: String,
        data: Vec<u8>,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ApiFuture<'_, String> {
        let total = data.len() as u64;
        self.uploads.lock().unwrap().push((file_name, data.len()));
        let hold = self.hold_uploads.load(Ordering::SeqCst);
        let reply = self.upload_reply.lock().unwrap().clone();
        Box::pin(async move {
            on_progress(0, total);
            if hold {
                cancel.cancelled().await;
                return Err(ApiError::Cancelled);
            }
            on_progress(total, total);
            reply
        })
    }
}

#[derive(Default)]
pub(crate) struct MockFactory {
    apis: Mutex<HashMap<String, Arc<MockApi>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn api(&self, address: &str) -> Arc<MockApi> {
        self.apis
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_insert_with(|| MockApi::new(address))
            .clone()
    }
}

impl ApiFactory for MockFactory {
    fn create(&self, address: &str) -> Arc<dyn PrinterApi> {
        self.api(address)
    }
}

/// Waits for the first event matching `pred`, discarding the rest.
pub(crate) async fn next_event(
    rx: &mut mpsc::Receiver<DeviceEvent>,
    pred: impl Fn(&DeviceEvent) -> bool,
) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drains everything currently queued.
pub(crate) fn drain(rx: &mut mpsc::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
