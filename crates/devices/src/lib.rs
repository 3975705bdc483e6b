//! Printer sessions, heartbeat polling and the device registry.

pub mod address_book;
pub mod config;
pub mod error;
pub mod heartbeat;
mod liveness;
pub mod machines;
pub mod registry;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

pub use address_book::{
    AddressBook, FilePreferences, MANUAL_INSTANCES_KEY, MemoryPreferences, PreferenceStore,
};
pub use config::{HeartbeatConfig, RegistryConfig};
pub use error::{RegistryError, SessionError, StoreError};
pub use heartbeat::{Heartbeat, HeartbeatEvent, HeartbeatPoller, PollerControl, PollerMode};
pub use machines::{InMemoryMachines, Machine, MachineProfiles};
pub use registry::DeviceRegistry;
pub use session::{DeviceSession, SessionOptions};
pub use types::{
    AddressState, ConnectionState, DeviceEvent, DeviceSnapshot, PendingRequests, RequestKind,
};
