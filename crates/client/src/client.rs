//! `reqwest` implementation of [`PrinterApi`].

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use minilink_protocol::Command;
use minilink_protocol::constants::{INQUIRY_PATH, UPLOAD_FIELD_NAME, UPLOAD_PATH};
use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::api::{ApiFuture, PrinterApi, ProgressCallback};
use crate::error::ApiError;

/// Bytes handed to the request body per progress notification.
const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

const UPLOAD_MIME: &str = "application/octet-stream";

/// HTTP client for one printer address.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    address: String,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl ApiClient {
    /// Creates a client for `address` on a shared `reqwest::Client`.
    pub fn new(http: reqwest::Client, address: impl Into<String>) -> Self {
        let address = address.into();
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{address}")
        };
        Self {
            http,
            address,
            base_url,
            request_timeout: None,
        }
    }

    /// Applies a timeout to status queries and commands. Uploads are not
    /// bounded by it.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<String, ApiError> {
        let mut request = self.http.get(self.url(path));
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let resp = request.send().await?;
        read_body(resp).await
    }

    async fn upload(
        &self,
        file_name: String,
        data: Vec<u8>,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<String, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let total = data.len() as u64;
        on_progress(0, total);

        let chunks = upload_chunks(Bytes::from(data), UPLOAD_CHUNK_SIZE);
        let progress = on_progress.clone();
        let mut sent = 0u64;
        let stream = futures_util::stream::iter(chunks).map(move |chunk: Bytes| {
            sent += chunk.len() as u64;
            if sent < total {
                progress(sent, total);
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file_name.clone())
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new().part(UPLOAD_FIELD_NAME, part);

        debug!(address = %self.address, file = %file_name, bytes = total, "uploading model");

        let request = self.http.post(self.url(UPLOAD_PATH)).multipart(form).send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            resp = request => resp?,
        };
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            body = read_body(resp) => body?,
        };

        on_progress(total, total);
        Ok(body)
    }
}

/// Splits the upload into views of one shared buffer.
fn upload_chunks(data: Bytes, chunk_size: usize) -> impl Iterator<Item = Bytes> {
    let len = data.len();
    (0..len)
        .step_by(chunk_size)
        .map(move |start| data.slice(start..(start + chunk_size).min(len)))
}

async fn read_body(resp: reqwest::Response) -> Result<String, ApiError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body = String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::Malformed("response body is not UTF-8".to_string()))?;

    if !status.is_success() {
        return Err(ApiError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

impl PrinterApi for ApiClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn query_status(&self) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let body = self.get(INQUIRY_PATH).await?;
            trace!(address = %self.address, status = %body.trim(), "status");
            Ok(body)
        })
    }

    fn send_command(&self, command: Command) -> ApiFuture<'_, String> {
        Box::pin(async move {
            debug!(address = %self.address, %command, "sending command");
            self.get(&command.path()).await
        })
    }

    fn upload_file(
        &self,
        file_name: String,
        data: Vec<u8>,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ApiFuture<'_, String> {
        Box::pin(self.upload(file_name, data, on_progress, cancel))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("address", &self.address)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
