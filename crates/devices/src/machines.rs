//! Machine-profile collaborator.
//!
//! A host keeps its own notion of configured machines. The registry only
//! needs to create one for a device, make it active, and learn which device
//! the active machine points at.

use std::sync::{Mutex, PoisonError};

/// Logical machine entry bound to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub printer_type: String,
    pub device_id: String,
}

pub trait MachineProfiles: Send + Sync {
    /// Creates a machine. Returns its id, or `None` when the host refuses.
    fn create_machine(&self, name: &str, printer_type: &str, device_id: &str) -> Option<String>;

    fn set_active_machine(&self, machine_id: &str);

    /// Device id stored on the active machine, if a machine is active.
    fn active_device_id(&self) -> Option<String>;
}

/// Machine list kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryMachines {
    inner: Mutex<MachinesInner>,
}

#[derive(Debug, Default)]
struct MachinesInner {
    machines: Vec<Machine>,
    active: Option<String>,
    created: usize,
}

impl InMemoryMachines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machines(&self) -> Vec<Machine> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .machines
            .clone()
    }

    pub fn active_machine(&self) -> Option<Machine> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let active = inner.active.as_ref()?;
        inner.machines.iter().find(|m| &m.id == active).cloned()
    }

    /// Deletes a machine, clearing the active selection if it pointed there.
    /// Hand the result to `DeviceRegistry::machine_removed`.
    pub fn remove_machine(&self, machine_id: &str) -> Option<Machine> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let index = inner.machines.iter().position(|m| m.id == machine_id)?;
        if inner.active.as_deref() == Some(machine_id) {
            inner.active = None;
        }
        Some(inner.machines.remove(index))
    }
}

impl MachineProfiles for InMemoryMachines {
    fn create_machine(&self, name: &str, printer_type: &str, device_id: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.created += 1;
        let id = format!("machine-{}", inner.created);
        inner.machines.push(Machine {
            id: id.clone(),
            name: name.to_string(),
            printer_type: printer_type.to_string(),
            device_id: device_id.to_string(),
        });
        Some(id)
    }

    fn set_active_machine(&self, machine_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.machines.iter().any(|m| m.id == machine_id) {
            inner.active = Some(machine_id.to_string());
        }
    }

    fn active_device_id(&self) -> Option<String> {
        self.active_machine().map(|m| m.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_activate() {
        let machines = InMemoryMachines::new();
        assert_eq!(machines.active_device_id(), None);

        let id = machines
            .create_machine("MPSM V2 10.0.0.5", "monoprice_select_mini_v2", "manual:10.0.0.5")
            .unwrap();
        machines.set_active_machine(&id);
        assert_eq!(machines.active_device_id().as_deref(), Some("manual:10.0.0.5"));
        assert_eq!(machines.machines().len(), 1);
    }

    #[test]
    fn remove_clears_active() {
        let machines = InMemoryMachines::new();
        let id = machines
            .create_machine("MPSM V2 10.0.0.5", "monoprice_select_mini_v2", "manual:10.0.0.5")
            .unwrap();
        machines.set_active_machine(&id);

        let removed = machines.remove_machine(&id).unwrap();
        assert_eq!(removed.device_id, "manual:10.0.0.5");
        assert!(machines.active_machine().is_none());
        assert!(machines.remove_machine(&id).is_none());
    }

    #[test]
    fn unknown_machine_is_not_activated() {
        let machines = InMemoryMachines::new();
        machines.set_active_machine("machine-9");
        assert!(machines.active_machine().is_none());
    }
}
