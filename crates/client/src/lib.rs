//! Async HTTP client for the printer's status and command endpoints.
//!
//! [`PrinterApi`] is the seam the device layer talks to; [`ApiClient`] is
//! the `reqwest` implementation and [`HttpApiFactory`] hands out clients that
//! share one connection pool.

pub mod api;
pub mod client;
pub mod error;
pub mod factory;

pub use api::{ApiFuture, PrinterApi, ProgressCallback, expect_ok, fetch_status};
pub use client::ApiClient;
pub use error::ApiError;
pub use factory::{ApiFactory, HttpApiFactory};
