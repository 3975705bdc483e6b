//! The printer API seam.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use minilink_protocol::{Command, HeaterKind, PrinterStatus, TargetTemperature, is_ok_response};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Boxed future returned by [`PrinterApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Upload progress callback, invoked with `(bytes_sent, bytes_total)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Requests a single printer understands.
///
/// Every method resolves exactly once, with the raw response body on
/// success. The device layer holds this as `Arc<dyn PrinterApi>` so tests can
/// substitute a mock.
pub trait PrinterApi: Send + Sync {
    /// Address this client talks to (`host` or `host:port`).
    fn address(&self) -> &str;

    /// `GET /inquiry`. Never retried.
    fn query_status(&self) -> ApiFuture<'_, String>;

    /// Issues a `/set` command and returns the body as-is.
    fn send_command(&self, command: Command) -> ApiFuture<'_, String>;

    /// Validates locally, then sends the temperature command. Out-of-range
    /// values fail without touching the network.
    fn set_temperature(&self, kind: HeaterKind, celsius: i32) -> ApiFuture<'_, String> {
        match TargetTemperature::new(kind, celsius) {
            Ok(target) => self.send_command(Command::SetTemperature(target)),
            Err(e) => Box::pin(async move { Err(ApiError::from(e)) }),
        }
    }

    /// Raises the printer's transfer rate.
    fn increase_upload_speed(&self) -> ApiFuture<'_, String> {
        self.send_command(Command::IncreaseUploadSpeed)
    }

    /// Uploads a model as multipart/form-data. `on_progress` sees at least
    /// `(0, total)` and `(total, total)`; cancelling `cancel` aborts the
    /// transfer and resolves with [`ApiError::Cancelled`].
    fn upload_file(
        &self,
        file_name: String,
        data: Vec<u8>,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ApiFuture<'_, String>;
}

/// Queries and decodes the printer status.
pub async fn fetch_status(api: &dyn PrinterApi) -> Result<PrinterStatus, ApiError> {
    let raw = api.query_status().await?;
    Ok(PrinterStatus::decode(&raw)?)
}

/// Turns a non-`OK` body into [`ApiError::Rejected`].
pub fn expect_ok(body: String) -> Result<String, ApiError> {
    if is_ok_response(&body) {
        Ok(body)
    } else {
        Err(ApiError::Rejected(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        sent: Mutex<Vec<Command>>,
        status: String,
    }

    impl PrinterApi for RecordingApi {
        fn address(&self) -> &str {
            "10.0.0.9"
        }

        fn query_status(&self) -> ApiFuture<'_, String> {
            let status = self.status.clone();
            Box::pin(async move { Ok(status) })
        }

        fn send_command(&self, command: Command) -> ApiFuture<'_, String> {
            self.sent.lock().unwrap().push(command);
            Box::pin(async { Ok("OK".to_string()) })
        }

        fn upload_file(
            &self,
            _file_name: String,
            _data: Vec<u8>,
            _on_progress: ProgressCallback,
            _cancel: CancellationToken,
        ) -> ApiFuture<'_, String> {
            Box::pin(async { Ok("OK".to_string()) })
        }
    }

    #[tokio::test]
    async fn out_of_range_temperature_is_never_sent() {
        let api = RecordingApi::default();

        let err = api.set_temperature(HeaterKind::Hotend, 261).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = api.set_temperature(HeaterKind::Bed, 86).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(api.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_temperature_is_sent() {
        let api = RecordingApi::default();
        api.set_temperature(HeaterKind::Bed, 60).await.unwrap();

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path(), "/set?cmd={C:P060}");
    }

    #[tokio::test]
    async fn increase_upload_speed_uses_speed_command() {
        let api = RecordingApi::default();
        api.increase_upload_speed().await.unwrap();
        assert_eq!(*api.sent.lock().unwrap(), vec![Command::IncreaseUploadSpeed]);
    }

    #[tokio::test]
    async fn fetch_status_decodes() {
        let api = RecordingApi {
            status: "T200/210P60/60/10P".into(),
            ..Default::default()
        };
        let status = fetch_status(&api).await.unwrap();
        assert_eq!(status.progress, 10);

        let api = RecordingApi {
            status: "other format".into(),
            ..Default::default()
        };
        assert!(matches!(
            fetch_status(&api).await,
            Err(ApiError::Malformed(_))
        ));
    }

    #[test]
    fn expect_ok_rejects_other_bodies() {
        assert_eq!(expect_ok("ok\n".into()), Ok("ok\n".to_string()));
        assert_eq!(
            expect_ok("ERROR".into()),
            Err(ApiError::Rejected("ERROR".into()))
        );
    }
}
