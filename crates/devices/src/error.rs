//! Device layer error types.

use minilink_client::ApiError;

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("an upload is already in progress")]
    UploadInProgress,

    #[error("printer is busy printing")]
    Printing,
}

/// Errors from the address preference store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("preference backend error: {0}")]
    Backend(String),
}

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("printer at {address} did not answer: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: ApiError,
    },

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("no machine profiles configured")]
    NoMachineProfiles,

    #[error("could not create machine {0:?}")]
    MachineCreation(String),

    #[error("preference store error: {0}")]
    Store(#[from] StoreError),
}
