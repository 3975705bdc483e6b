//! Heartbeat handling and the active-machine reconnection sweep.
//!
//! Holds the shared [`RegistryContext`] plus the free functions that react to
//! poll results. Every poller of the registry feeds one channel, drained by a
//! single pump task. Heartbeat handling and the registry's mutating operations
//! run under one operation lock, so a removal can never interleave with the
//! registration of the same address.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use minilink_client::ApiFactory;
use minilink_protocol::{PrinterStatus, StatusError, device_id_for};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::address_book::AddressBook;
use crate::config::RegistryConfig;
use crate::heartbeat::{Heartbeat, HeartbeatEvent, HeartbeatPoller};
use crate::machines::MachineProfiles;
use crate::session::{DeviceSession, SessionOptions};
use crate::types::{AddressState, ConnectionState, DeviceEvent};

/// Shared registry state handed to the pump task and free functions.
#[derive(Clone)]
pub(crate) struct RegistryContext {
    pub(crate) config: RegistryConfig,
    pub(crate) api_factory: Arc<dyn ApiFactory>,
    pub(crate) address_book: Arc<AddressBook>,
    pub(crate) machines: Option<Arc<dyn MachineProfiles>>,
    /// Sessions keyed by device id.
    pub(crate) sessions: Arc<RwLock<HashMap<String, Arc<DeviceSession>>>>,
    /// Pollers keyed by address.
    pub(crate) pollers: Arc<RwLock<HashMap<String, HeartbeatPoller>>>,
    pub(crate) address_states: Arc<RwLock<HashMap<String, AddressState>>>,
    /// Addresses with a manual add awaiting its probe.
    pub(crate) adds_in_progress: Arc<StdMutex<HashSet<String>>>,
    /// Machine ids created through the registry, keyed by device id.
    pub(crate) created_machines: Arc<StdMutex<HashMap<String, String>>>,
    pub(crate) events_tx: mpsc::Sender<DeviceEvent>,
    pub(crate) heartbeat_tx: mpsc::Sender<HeartbeatEvent>,
    /// Taken by the pump when the first poller starts.
    pub(crate) heartbeat_rx: Arc<StdMutex<Option<mpsc::Receiver<HeartbeatEvent>>>>,
    /// Held for every heartbeat and every add / remove / stop.
    pub(crate) ops: Arc<Mutex<()>>,
    pub(crate) shutdown: CancellationToken,
}

impl RegistryContext {
    pub(crate) fn emit(&self, event: DeviceEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("event channel closed");
            }
        }
    }

    pub(crate) fn session_options(&self) -> SessionOptions {
        SessionOptions {
            apply_preheat: self.config.apply_preheat,
            ..Default::default()
        }
    }

    pub(crate) async fn address_state(&self, address: &str) -> AddressState {
        self.address_states
            .read()
            .await
            .get(address)
            .copied()
            .unwrap_or(AddressState::Unknown)
    }

    /// Records the state of `address`, emitting an event when it changes.
    pub(crate) async fn set_address_state(&self, address: &str, state: AddressState) {
        let previous = {
            let mut states = self.address_states.write().await;
            if state == AddressState::Unknown {
                states.remove(address)
            } else {
                states.insert(address.to_string(), state)
            }
        };
        if previous.unwrap_or(AddressState::Unknown) != state {
            debug!(address, %state, "address state changed");
            self.emit(DeviceEvent::AddressStateChanged {
                address: address.to_string(),
                state,
            });
        }
    }

    pub(crate) fn is_add_in_progress(&self, address: &str) -> bool {
        self.adds_in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }

    pub(crate) async fn session_by_address(&self, address: &str) -> Option<Arc<DeviceSession>> {
        self.sessions
            .read()
            .await
            .get(&device_id_for(address))
            .cloned()
    }

    /// Creates the session for `address` from its first status, or feeds the
    /// status to the existing one. Fails without side effects when the status
    /// does not decode.
    pub(crate) async fn register_session(
        &self,
        address: &str,
        raw_status: &str,
    ) -> Result<Arc<DeviceSession>, StatusError> {
        PrinterStatus::decode(raw_status)?;
        let id = device_id_for(address);

        let (session, created) = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let api = self.api_factory.create(address);
                    let session = DeviceSession::new(
                        address,
                        api,
                        self.events_tx.clone(),
                        self.session_options(),
                    );
                    sessions.insert(id.clone(), Arc::clone(&session));
                    (session, true)
                }
            }
        };

        if created {
            if let Some(poller) = self.pollers.read().await.get(address) {
                session.attach_poller(poller.control());
            }
            info!(address, device = %id, "printer registered");
            self.emit(DeviceEvent::DeviceAdded {
                device_id: id,
                address: address.to_string(),
                name: session.name().to_string(),
            });

            let boost = Arc::clone(&session);
            tokio::spawn(async move {
                // Failures are reported as warning events by the session.
                let _ = boost.increase_upload_speed().await;
            });
        }

        session.observe_status(raw_status)?;
        if created {
            self.emit(DeviceEvent::DevicesChanged);
            self.connect_to_active_machine().await;
        }
        Ok(session)
    }

    /// Starts a poller for `address` unless one is running, and links it to
    /// the address's session.
    pub(crate) async fn ensure_poller(&self, address: &str) {
        self.start_heartbeat_pump();

        let control = {
            let mut pollers = self.pollers.write().await;
            let running = pollers
                .get(address)
                .filter(|poller| !poller.is_finished())
                .map(HeartbeatPoller::control);
            match running {
                Some(control) => control,
                None => {
                    let api = self.api_factory.create(address);
                    let poller =
                        HeartbeatPoller::spawn(api, self.config.heartbeat, self.heartbeat_tx.clone());
                    let control = poller.control();
                    pollers.insert(address.to_string(), poller);
                    control
                }
            }
        };

        if let Some(session) = self.session_by_address(address).await {
            session.attach_poller(control);
        }
    }

    fn start_heartbeat_pump(&self) {
        let rx = self
            .heartbeat_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(rx) = rx {
            tokio::spawn(heartbeat_pump(self.clone(), rx));
        }
    }

    /// Marks a closed session's address as answering again and re-runs the
    /// reconnection sweep.
    pub(crate) async fn reconnect(&self, session: &DeviceSession) {
        info!(address = %session.address(), "printer is up again, reconnecting");
        self.set_address_state(session.address(), AddressState::Active)
            .await;
        self.connect_to_active_machine().await;
        self.emit(DeviceEvent::DevicesChanged);
    }

    /// Connects the session bound to the active machine and disconnects the
    /// rest. Without an active machine every reachable session is connected.
    /// Closed sessions that are not selected become disconnected.
    pub(crate) async fn connect_to_active_machine(&self) {
        let active = self.machines.as_ref().and_then(|m| m.active_device_id());
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let states = self.address_states.read().await.clone();

        for session in sessions {
            let selected = active.as_deref().is_none_or(|id| id == session.id());
            let unreachable = states.get(session.address()) == Some(&AddressState::Unreachable);
            if selected {
                if !unreachable {
                    session.connect();
                }
            } else if session.connection_state() != ConnectionState::Disconnected {
                debug!(device = %session.id(), "not the active machine, disconnecting");
                session.disconnect();
            }
        }
    }
}

async fn heartbeat_pump(ctx: RegistryContext, mut rx: mpsc::Receiver<HeartbeatEvent>) {
    debug!("heartbeat pump started");
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => handle_heartbeat(&ctx, event).await,
                None => break,
            },
        }
    }
    debug!("heartbeat pump stopped");
}

/// Applies one poll result to the registry.
pub(crate) async fn handle_heartbeat(ctx: &RegistryContext, event: HeartbeatEvent) {
    let HeartbeatEvent { address, beat } = event;
    let _ops = ctx.ops.lock().await;
    if !ctx.pollers.read().await.contains_key(&address) {
        trace!(address = %address, "heartbeat for a removed address");
        return;
    }
    let session = ctx.session_by_address(&address).await;

    match (beat, session) {
        (Heartbeat::Timeout, None) => {
            trace!(address = %address, "stored printer still not answering");
        }
        (Heartbeat::Timeout, Some(session)) => {
            // Timeouts are expected while the printer receives a file.
            if session.is_connected()
                && !session.is_uploading()
                && !ctx.is_add_in_progress(&address)
            {
                info!(address = %address, device = %session.id(), "printer stopped answering, closing session");
                session.close();
                ctx.set_address_state(&address, AddressState::Unreachable).await;
                ctx.emit(DeviceEvent::DevicesChanged);
            }
        }
        (Heartbeat::Response(raw), None) => {
            if let Err(e) = PrinterStatus::decode(&raw) {
                debug!(address = %address, error = %e, "ignoring heartbeat with unparseable status");
                return;
            }
            if let Err(e) = ctx.address_book.add(&address) {
                warn!(address = %address, error = %e, "could not store printer address");
            }
            match ctx.register_session(&address, &raw).await {
                Ok(_) => ctx.set_address_state(&address, AddressState::Active).await,
                Err(e) => warn!(address = %address, error = %e, "could not register printer"),
            }
        }
        (Heartbeat::Response(raw), Some(session)) => {
            if session.connection_state() == ConnectionState::Closed
                || ctx.address_state(&address).await == AddressState::Unreachable
            {
                ctx.reconnect(&session).await;
            }
            // Unparseable bodies still prove the printer is alive.
            let _ = session.observe_status(&raw);
        }
    }
}
