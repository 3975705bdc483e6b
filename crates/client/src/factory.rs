//! Client construction shared across sessions and pollers.

use std::sync::Arc;
use std::time::Duration;

use crate::api::PrinterApi;
use crate::client::ApiClient;
use crate::error::ApiError;

/// Creates a [`PrinterApi`] for an address.
pub trait ApiFactory: Send + Sync {
    fn create(&self, address: &str) -> Arc<dyn PrinterApi>;
}

/// Hands out [`ApiClient`]s backed by one `reqwest::Client`.
#[derive(Clone)]
pub struct HttpApiFactory {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpApiFactory {
    pub fn new(request_timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            request_timeout,
        })
    }

    pub fn client(&self, address: &str) -> ApiClient {
        ApiClient::new(self.http.clone(), address).with_request_timeout(self.request_timeout)
    }
}

impl ApiFactory for HttpApiFactory {
    fn create(&self, address: &str) -> Arc<dyn PrinterApi> {
        Arc::new(self.client(address))
    }
}
