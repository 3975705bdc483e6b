//! A fake Select Mini V2 for tests and manual runs.
//!
//! Answers `/inquiry` with a simulated status, applies every `/set` command
//! to that status and accepts `/upload`.

pub mod server;
pub mod simulation;

pub use server::{FakePrinter, MAX_UPLOAD_LEN, SharedSimulation, router};
pub use simulation::{AMBIENT_TEMPERATURE, ReceivedUpload, Simulation};

#[derive(Debug, thiserror::Error)]
pub enum FakePrinterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
