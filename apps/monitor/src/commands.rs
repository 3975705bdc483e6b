//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use minilink_client::{ApiFactory, HttpApiFactory, PrinterApi, fetch_status};
use minilink_devices::{
    DeviceEvent, DeviceRegistry, DeviceSession, InMemoryMachines, MachineProfiles, SessionOptions,
};
use minilink_protocol::{HeaterKind, is_valid_bed_input, is_valid_hotend_input};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{ConfigPreferences, MonitorConfig};
use crate::render::{event_line, snapshot_line, status_line};

/// Print action sent to a single printer.
#[derive(Debug, Clone, Copy)]
pub enum PrintAction {
    Start,
    Pause,
    Resume,
    Cancel,
}

pub struct Monitor {
    config: MonitorConfig,
    config_path: PathBuf,
    factory: Arc<HttpApiFactory>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, config_path: &Path) -> Result<Self> {
        let factory = HttpApiFactory::new(config.request_timeout())
            .context("failed to build HTTP client")?;
        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            factory: Arc::new(factory),
        })
    }

    fn registry(&self, machines: Option<Arc<dyn MachineProfiles>>) -> DeviceRegistry {
        DeviceRegistry::new(
            self.config.registry_config(),
            self.factory.clone(),
            Arc::new(ConfigPreferences::new(self.config_path.clone())),
            machines,
        )
    }

    /// Standalone session for one-shot commands; nothing is polled.
    fn session(&self, address: &str) -> (Arc<DeviceSession>, mpsc::Receiver<DeviceEvent>) {
        let (events_tx, events_rx) = mpsc::channel(self.config.registry_config().event_capacity);
        let options = SessionOptions {
            apply_preheat: self.config.apply_preheat,
            ..Default::default()
        };
        let session = DeviceSession::new(address, self.factory.create(address), events_tx, options);
        (session, events_rx)
    }

    /// Follows the stored printers (plus `extra`) until interrupted.
    pub async fn watch(&self, extra: &[String], select: bool) -> Result<()> {
        let machines: Option<Arc<dyn MachineProfiles>> = if select {
            Some(Arc::new(InMemoryMachines::new()))
        } else {
            None
        };
        let registry = self.registry(machines.clone());
        let mut events = registry
            .take_events()
            .await
            .context("event stream already taken")?;
        registry.start().await?;

        for address in extra {
            match registry.add_device(address).await {
                Ok(session) => {
                    if machines.is_some() {
                        registry.create_machine(session.id()).await?;
                    }
                }
                Err(e) => warn!(address = %address, "could not add printer: {e}"),
            }
        }

        info!("watching printers, press Ctrl-C to stop");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(line) = event_line(&event) {
                            println!("{line}");
                        }
                    }
                    None => break,
                },
            }
        }

        registry.shutdown().await;
        Ok(())
    }

    /// Probes and stores a printer address.
    pub async fn add(&self, address: &str) -> Result<()> {
        let registry = self.registry(None);
        let session = registry.add_device(address).await?;
        println!("{}", snapshot_line(&session.snapshot()));
        registry.shutdown().await;
        Ok(())
    }

    /// Forgets a stored printer by address or device id.
    pub async fn remove(&self, id_or_address: &str) -> Result<()> {
        let registry = self.registry(None);
        let removed = registry.remove_device(id_or_address).await?;
        registry.shutdown().await;
        if removed {
            println!("removed {id_or_address}");
        } else {
            println!("{id_or_address} is not stored");
        }
        Ok(())
    }

    /// Queries each address once. Without arguments the stored list is used.
    pub async fn status(&self, addresses: &[String]) -> Result<()> {
        let addresses = if addresses.is_empty() {
            self.registry(None).stored_addresses()?
        } else {
            addresses.to_vec()
        };
        if addresses.is_empty() {
            println!("no printers stored; use `add <address>` first");
            return Ok(());
        }

        for address in &addresses {
            let api = self.factory.create(address);
            match fetch_status(api.as_ref()).await {
                Ok(status) => println!("{address}: {}", status_line(&status, None)),
                Err(e) => println!("{address}: unreachable ({e})"),
            }
        }
        Ok(())
    }

    pub async fn print_action(&self, address: &str, action: PrintAction) -> Result<()> {
        let (session, _events) = self.session(address);
        match action {
            PrintAction::Start => session.start_print().await?,
            PrintAction::Pause => session.pause_print().await?,
            PrintAction::Resume => session.resume_print().await?,
            PrintAction::Cancel => session.cancel_print().await?,
        }
        println!("{address}: {action:?} accepted");
        Ok(())
    }

    pub async fn set_temperature(&self, address: &str, kind: HeaterKind, input: &str) -> Result<()> {
        let valid = match kind {
            HeaterKind::Hotend => is_valid_hotend_input(input),
            HeaterKind::Bed => is_valid_bed_input(input),
        };
        if !valid {
            bail!(
                "{kind} temperature must be a whole number from 0 to {}",
                kind.max_temperature()
            );
        }
        let celsius: i32 = input.parse()?;

        let (session, _events) = self.session(address);
        session.set_target_temperature(kind, celsius).await?;
        println!("{address}: {kind} target set to {celsius} °C");
        Ok(())
    }

    /// Uploads `file` and starts printing it. Ctrl-C cancels the transfer.
    pub async fn upload(&self, address: &str, file: &Path) -> Result<()> {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("upload path has no file name")?;

        let (session, mut events) = self.session(address);
        let api = self.factory.create(address);
        let raw = api.query_status().await?;
        session.observe_status(&raw)?;

        let mut upload = session.start_upload(file_name, data)?;
        let mut cancelled = false;
        loop {
            tokio::select! {
                result = &mut upload => {
                    result.context("upload task failed")?;
                    break;
                }
                Some(event) = events.recv() => {
                    if let Some(line) = event_line(&event) {
                        println!("{line}");
                    }
                }
                _ = tokio::signal::ctrl_c(), if !cancelled => {
                    cancelled = session.cancel_upload().await;
                }
            }
        }

        while let Ok(event) = events.try_recv() {
            if let Some(line) = event_line(&event) {
                println!("{line}");
            }
        }
        Ok(())
    }
}
