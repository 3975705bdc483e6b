//! Fake printer server.
//!
//! An axum router answering the printer's endpoints from a [`Simulation`],
//! served until the printer's cancellation token fires.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, RawQuery, State};
use axum::routing::{get, post};
use minilink_protocol::constants::{INQUIRY_PATH, OK_RESPONSE, SET_PATH, UPLOAD_PATH};
use minilink_protocol::{Command, PrinterStatus};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::FakePrinterError;
use crate::simulation::{ReceivedUpload, Simulation};

/// Upper bound of an upload request body.
pub const MAX_UPLOAD_LEN: usize = 64 * 1024 * 1024;

/// Simulation shared by the handlers and the [`FakePrinter`] handle.
pub type SharedSimulation = Arc<Mutex<Simulation>>;

/// A running fake printer. Dropping it stops the server.
pub struct FakePrinter {
    local_addr: SocketAddr,
    simulation: SharedSimulation,
    cancel: CancellationToken,
}

impl FakePrinter {
    /// Binds `addr` and starts serving in the background.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, FakePrinterError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let simulation = Arc::new(Mutex::new(Simulation::default()));
        let cancel = CancellationToken::new();

        info!("fake printer listening on http://{local_addr}");
        let app = router(simulation.clone());
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = server.await {
                warn!("fake printer server error: {e}");
            }
            debug!("fake printer shutting down");
        });

        Ok(Self {
            local_addr,
            simulation,
            cancel,
        })
    }

    /// Binds an OS-assigned port on localhost.
    pub async fn spawn() -> Result<Self, FakePrinterError> {
        Self::bind(("127.0.0.1", 0)).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `host:port` form accepted by the client and the registry.
    pub fn address(&self) -> String {
        self.local_addr.to_string()
    }

    fn simulation(&self) -> MutexGuard<'_, Simulation> {
        lock(&self.simulation)
    }

    pub fn status(&self) -> PrinterStatus {
        self.simulation().status()
    }

    pub fn set_status(&self, status: PrinterStatus) {
        self.simulation().set_status(status);
    }

    /// Commands received on `/set`, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.simulation().commands().to_vec()
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.simulation().uploads().to_vec()
    }

    pub fn upload_speed_boosted(&self) -> bool {
        self.simulation().upload_speed_boosted()
    }

    /// Advances the simulation by one step.
    pub fn tick(&self) {
        self.simulation().tick();
    }

    /// Ticks the simulation every `period` until the server stops.
    pub fn run_simulation(&self, period: Duration) {
        let simulation = self.simulation.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        lock(&simulation).tick();
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Resolves once [`shutdown`](Self::shutdown) was called.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }
}

impl Drop for FakePrinter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Routes of the printer's HTTP interface, served from `simulation`.
pub fn router(simulation: SharedSimulation) -> Router {
    Router::new()
        .route(INQUIRY_PATH, get(inquiry))
        .route(SET_PATH, get(set))
        .route(
            UPLOAD_PATH,
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_LEN)),
        )
        .with_state(simulation)
}

fn lock(simulation: &SharedSimulation) -> MutexGuard<'_, Simulation> {
    simulation.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn inquiry(State(simulation): State<SharedSimulation>) -> String {
    lock(&simulation).status().encode()
}

/// Applies the command in the query. Unknown commands are still answered.
async fn set(State(simulation): State<SharedSimulation>, RawQuery(query): RawQuery) -> &'static str {
    let path = match query {
        Some(query) => format!("{SET_PATH}?{query}"),
        None => SET_PATH.to_string(),
    };
    match Command::parse_path(&path) {
        Some(command) => {
            info!(%command, "command received");
            lock(&simulation).apply(command);
        }
        None => warn!(path, "unrecognized command"),
    }
    OK_RESPONSE
}

async fn upload(
    State(simulation): State<SharedSimulation>,
    mut multipart: Multipart,
) -> Result<&'static str, MultipartError> {
    let mut received = ReceivedUpload {
        file_name: None,
        body_len: 0,
    };
    while let Some(field) = multipart.next_field().await? {
        if let Some(name) = field.file_name() {
            received.file_name = Some(name.to_string());
        }
        received.body_len += field.bytes().await?.len();
    }
    info!(file = ?received.file_name, bytes = received.body_len, "upload received");
    lock(&simulation).record_upload(received);
    Ok(OK_RESPONSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use minilink_protocol::{PrinterState, TargetTemperature};
    use tower::ServiceExt;

    async fn call(simulation: &SharedSimulation, request: Request<Body>) -> (StatusCode, String) {
        let response = router(simulation.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get_path(simulation: &SharedSimulation, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        call(simulation, request).await
    }

    fn shared() -> SharedSimulation {
        Arc::new(Mutex::new(Simulation::default()))
    }

    #[tokio::test]
    async fn inquiry_reports_status() {
        let sim = shared();
        assert_eq!(get_path(&sim, "/inquiry").await, (StatusCode::OK, "T20/0P20/0/0I".into()));
    }

    #[tokio::test]
    async fn set_commands_apply_and_answer_ok() {
        let sim = shared();
        assert_eq!(get_path(&sim, "/set?cmd={P:M}").await, (StatusCode::OK, "OK".into()));
        assert_eq!(get_path(&sim, "/set?cmd={C:T0215}").await.1, "OK");
        assert_eq!(get_path(&sim, "/set?code=M563%20S4").await.1, "OK");

        let sim = lock(&sim);
        assert_eq!(sim.status().state, PrinterState::Printing);
        assert_eq!(sim.status().target_hotend_temperature, 215);
        assert!(sim.upload_speed_boosted());
        assert_eq!(
            sim.commands(),
            &[
                Command::StartPrint,
                Command::SetTemperature(TargetTemperature::hotend(215).unwrap()),
                Command::IncreaseUploadSpeed,
            ]
        );
    }

    #[tokio::test]
    async fn unknown_set_still_answers_ok() {
        let sim = shared();
        assert_eq!(get_path(&sim, "/set?cmd={Z:Z}").await.1, "OK");
        assert_eq!(get_path(&sim, "/set").await.1, "OK");
        assert!(lock(&sim).commands().is_empty());
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let sim = shared();
        assert_eq!(get_path(&sim, "/index.html").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_is_recorded() {
        let sim = shared();
        let body = "--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.gcode\"\r\n\r\nG28\r\n--b--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "multipart/form-data; boundary=b")
            .body(Body::from(body))
            .unwrap();
        assert_eq!(call(&sim, request).await, (StatusCode::OK, "OK".into()));

        let uploads = lock(&sim).uploads().to_vec();
        assert_eq!(
            uploads,
            vec![ReceivedUpload {
                file_name: Some("a.gcode".into()),
                body_len: 3,
            }]
        );
    }

    #[tokio::test]
    async fn upload_without_multipart_is_rejected() {
        let sim = shared();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from("G28"))
            .unwrap();
        assert_eq!(call(&sim, request).await.0, StatusCode::BAD_REQUEST);
        assert!(lock(&sim).uploads().is_empty());
    }
}
