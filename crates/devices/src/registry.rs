//! Device registry orchestrating sessions and heartbeat pollers.
//!
//! Owns one [`DeviceSession`] per answering printer and one
//! [`HeartbeatPoller`] per known address, persists manually added addresses,
//! and reconnects printers that come back after a timeout.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use minilink_client::{ApiError, ApiFactory};
use minilink_protocol::constants::{DEVICE_ID_PREFIX, PRINTER_TYPE};
use minilink_protocol::{PrinterStatus, device_id_for};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address_book::{AddressBook, PreferenceStore};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::heartbeat::HeartbeatPoller;
use crate::liveness::RegistryContext;
use crate::machines::{Machine, MachineProfiles};
use crate::session::DeviceSession;
use crate::types::{AddressState, ConnectionState, DeviceEvent, DeviceSnapshot};

/// Registry of printers reachable by address.
pub struct DeviceRegistry {
    ctx: RegistryContext,
    events_rx: Mutex<Option<mpsc::Receiver<DeviceEvent>>>,
}

/// Marks an address as being added manually until dropped.
struct AddInProgress<'a> {
    adds: &'a StdMutex<HashSet<String>>,
    address: String,
}

impl<'a> AddInProgress<'a> {
    fn begin(adds: &'a StdMutex<HashSet<String>>, address: &str) -> Self {
        adds.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string());
        Self {
            adds,
            address: address.to_string(),
        }
    }
}

impl Drop for AddInProgress<'_> {
    fn drop(&mut self) {
        self.adds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.address);
    }
}

impl DeviceRegistry {
    /// Creates an idle registry. Nothing is polled until [`start`](Self::start)
    /// or [`add_device`](Self::add_device).
    pub fn new(
        config: RegistryConfig,
        api_factory: Arc<dyn ApiFactory>,
        store: Arc<dyn PreferenceStore>,
        machines: Option<Arc<dyn MachineProfiles>>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(config.event_capacity);

        let ctx = RegistryContext {
            config,
            api_factory,
            address_book: Arc::new(AddressBook::new(store)),
            machines,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pollers: Arc::new(RwLock::new(HashMap::new())),
            address_states: Arc::new(RwLock::new(HashMap::new())),
            adds_in_progress: Arc::new(StdMutex::new(HashSet::new())),
            created_machines: Arc::new(StdMutex::new(HashMap::new())),
            events_tx,
            heartbeat_tx,
            heartbeat_rx: Arc::new(StdMutex::new(Some(heartbeat_rx))),
            ops: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        };

        Self {
            ctx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<DeviceEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Replays the stored addresses: each one is probed by its own poller and
    /// gets a session once it answers.
    pub async fn start(&self) -> Result<(), RegistryError> {
        let _ops = self.ctx.ops.lock().await;
        let addresses = self.ctx.address_book.addresses()?;
        info!(count = addresses.len(), "starting device registry");
        for address in addresses {
            self.ctx
                .set_address_state(&address, AddressState::Probing)
                .await;
            self.ctx.ensure_poller(&address).await;
        }
        Ok(())
    }

    /// Stops every poller and drops every session. The stored address list
    /// is kept.
    pub async fn stop(&self) {
        debug!("stopping device registry");
        let _ops = self.ctx.ops.lock().await;
        let pollers: Vec<HeartbeatPoller> = self
            .ctx
            .pollers
            .write()
            .await
            .drain()
            .map(|(_, poller)| poller)
            .collect();
        for poller in &pollers {
            poller.stop();
        }

        let sessions: Vec<Arc<DeviceSession>> = self
            .ctx
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        for session in &sessions {
            session.abort_upload();
            session.close();
            self.ctx.emit(DeviceEvent::DeviceRemoved {
                device_id: session.id().to_string(),
            });
        }
        if !sessions.is_empty() {
            self.ctx.emit(DeviceEvent::DevicesChanged);
        }

        let addresses: Vec<String> = self.ctx.address_states.read().await.keys().cloned().collect();
        for address in addresses {
            self.ctx
                .set_address_state(&address, AddressState::Unknown)
                .await;
        }
    }

    /// Restarts discovery from the stored address list.
    pub async fn start_discovery(&self) -> Result<(), RegistryError> {
        info!("restarting discovery");
        self.stop().await;
        self.start().await
    }

    /// Adds a printer by address after a successful status probe.
    ///
    /// On success the address is persisted, a session exists and a poller is
    /// running. On failure nothing is stored.
    pub async fn add_device(&self, address: &str) -> Result<Arc<DeviceSession>, RegistryError> {
        let address = address.trim();
        if address.is_empty()
            || address.contains(',')
            || address.chars().any(char::is_whitespace)
        {
            return Err(RegistryError::InvalidAddress(address.to_string()));
        }

        let _guard = AddInProgress::begin(&self.ctx.adds_in_progress, address);
        let previous = self.ctx.address_state(address).await;
        info!(address, "adding printer");
        self.ctx
            .set_address_state(address, AddressState::Probing)
            .await;

        let api = self.ctx.api_factory.create(address);
        let probe = tokio::time::timeout(self.ctx.config.command_timeout, api.query_status()).await;
        let raw = match probe {
            Ok(Ok(raw)) => PrinterStatus::decode(&raw).map(|_| raw).map_err(ApiError::from),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ApiError::Timeout),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(source) => {
                warn!(address, error = %source, "printer did not answer");
                let fallback = if self.ctx.session_by_address(address).await.is_some() {
                    previous
                } else {
                    AddressState::Unknown
                };
                self.ctx.set_address_state(address, fallback).await;
                return Err(RegistryError::Unreachable {
                    address: address.to_string(),
                    source,
                });
            }
        };

        let _ops = self.ctx.ops.lock().await;
        self.ctx.address_book.add(address)?;
        let session = self
            .ctx
            .register_session(address, &raw)
            .await
            .map_err(|e| RegistryError::Unreachable {
                address: address.to_string(),
                source: e.into(),
            })?;
        self.ctx.ensure_poller(address).await;
        if session.connection_state() == ConnectionState::Closed {
            self.ctx.reconnect(&session).await;
        } else {
            self.ctx
                .set_address_state(address, AddressState::Active)
                .await;
        }
        Ok(session)
    }

    /// Removes a printer by device id (`manual:<address>`) or by address:
    /// stops its poller, drops its session and forgets the stored address.
    /// Returns false when nothing was known about it.
    pub async fn remove_device(&self, id_or_address: &str) -> Result<bool, RegistryError> {
        let address = id_or_address
            .strip_prefix(DEVICE_ID_PREFIX)
            .unwrap_or(id_or_address)
            .to_string();
        let device_id = device_id_for(&address);
        info!(device = %device_id, "removing printer");
        let _ops = self.ctx.ops.lock().await;

        let poller = self.ctx.pollers.write().await.remove(&address);
        if let Some(poller) = &poller {
            poller.stop();
        }
        let session = self.ctx.sessions.write().await.remove(&device_id);
        if let Some(session) = &session {
            session.abort_upload();
            session.close();
            self.ctx.emit(DeviceEvent::DeviceRemoved {
                device_id: device_id.clone(),
            });
            self.ctx.emit(DeviceEvent::DevicesChanged);
        }
        self.ctx
            .created_machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device_id);
        self.ctx
            .set_address_state(&address, AddressState::Unknown)
            .await;

        let stored = self.ctx.address_book.remove(&address)?;
        Ok(poller.is_some() || session.is_some() || stored)
    }

    /// Creates a machine profile for a known device, makes it active and
    /// connects to it. A device already bound to a created machine returns
    /// that machine's id.
    pub async fn create_machine(&self, device_id: &str) -> Result<String, RegistryError> {
        let machines = self
            .ctx
            .machines
            .clone()
            .ok_or(RegistryError::NoMachineProfiles)?;
        let session = self
            .session(device_id)
            .await
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.to_string()))?;
        let _ops = self.ctx.ops.lock().await;

        let name = {
            let created = self
                .ctx
                .created_machines
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = created.get(device_id) {
                return Ok(existing.clone());
            }
            if created.is_empty() {
                session.name().to_string()
            } else {
                format!("{}#{}", session.name(), created.len() + 1)
            }
        };

        let machine_id = machines
            .create_machine(&name, PRINTER_TYPE, device_id)
            .ok_or_else(|| RegistryError::MachineCreation(name.clone()))?;
        machines.set_active_machine(&machine_id);
        self.ctx
            .created_machines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.to_string(), machine_id.clone());
        info!(device = %device_id, machine = %machine_id, name = %name, "machine created");

        session.connect();
        self.ctx.ensure_poller(session.address()).await;
        self.ctx.connect_to_active_machine().await;
        Ok(machine_id)
    }

    /// Host hook for a deleted machine: forgets the device the machine was
    /// bound to. Machines of other printers are ignored.
    pub async fn machine_removed(&self, machine: &Machine) -> Result<bool, RegistryError> {
        if machine.printer_type != PRINTER_TYPE || self.session(&machine.device_id).await.is_none() {
            debug!(machine = %machine.id, "removed machine is not one of ours");
            return Ok(false);
        }
        info!(machine = %machine.id, device = %machine.device_id, "machine deleted by host");
        self.remove_device(&machine.device_id).await
    }

    /// Re-runs the reconnection sweep, e.g. after the host switched machines.
    pub async fn connect_to_active_machine(&self) {
        self.ctx.connect_to_active_machine().await;
    }

    pub async fn session(&self, device_id: &str) -> Option<Arc<DeviceSession>> {
        self.ctx.sessions.read().await.get(device_id).cloned()
    }

    pub async fn session_by_address(&self, address: &str) -> Option<Arc<DeviceSession>> {
        self.ctx.session_by_address(address).await
    }

    pub async fn sessions(&self) -> Vec<Arc<DeviceSession>> {
        let mut sessions: Vec<_> = self.ctx.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.address().cmp(b.address()));
        sessions
    }

    /// Snapshots of every session, ordered by address.
    pub async fn devices(&self) -> Vec<DeviceSnapshot> {
        self.sessions()
            .await
            .iter()
            .map(|session| session.snapshot())
            .collect()
    }

    pub async fn address_state(&self, address: &str) -> AddressState {
        self.ctx.address_state(address).await
    }

    /// Addresses currently persisted.
    pub fn stored_addresses(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.ctx.address_book.addresses()?)
    }

    /// Stops everything, including the heartbeat pump.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.ctx.shutdown.cancel();
        info!("device registry shut down");
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.ctx.shutdown.cancel();
    }
}
