//! Persisted list of manually added printer addresses.
//!
//! The list is stored as one comma-separated value through a
//! [`PreferenceStore`]. Updates are read-modify-write under a lock so an
//! address is never stored twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use minilink_protocol::{format_address_list, parse_address_list};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Preference key the address list is stored under.
pub const MANUAL_INSTANCES_KEY: &str = "manual_instances";

/// Backend holding the raw comma-separated address list.
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored value, or an empty string when nothing is stored.
    fn load(&self) -> Result<String, StoreError>;

    fn save(&self, value: &str) -> Result<(), StoreError>;
}

/// In-memory store, for tests and throwaway registries.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    value: Mutex<String>,
}

impl MemoryPreferences {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(value.into()),
        }
    }
}

impl PreferenceStore for MemoryPreferences {
    fn load(&self) -> Result<String, StoreError> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, value: &str) -> Result<(), StoreError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = value.to_string();
        Ok(())
    }
}

/// JSON file store. Other keys in the file are preserved.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl PreferenceStore for FilePreferences {
    fn load(&self) -> Result<String, StoreError> {
        Ok(self
            .read_map()?
            .remove(MANUAL_INSTANCES_KEY)
            .unwrap_or_default())
    }

    fn save(&self, value: &str) -> Result<(), StoreError> {
        let mut map = self.read_map()?;
        map.insert(MANUAL_INSTANCES_KEY.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted address list to {:?}", self.path);
        Ok(())
    }
}

/// Address list with duplicate-free updates.
pub struct AddressBook {
    store: Arc<dyn PreferenceStore>,
    lock: Mutex<()>,
}

impl AddressBook {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn addresses(&self) -> Result<Vec<String>, StoreError> {
        Ok(parse_address_list(&self.store.load()?))
    }

    pub fn contains(&self, address: &str) -> Result<bool, StoreError> {
        Ok(self.addresses()?.iter().any(|a| a == address))
    }

    /// Appends `address` unless already present. Returns whether it was added.
    pub fn add(&self, address: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut addresses = self.addresses()?;
        if addresses.iter().any(|a| a == address) {
            return Ok(false);
        }
        addresses.push(address.to_string());
        self.store.save(&format_address_list(&addresses))?;
        debug!(address, "stored printer address");
        Ok(true)
    }

    /// Removes `address`. Returns whether it was present.
    pub fn remove(&self, address: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut addresses = self.addresses()?;
        let before = addresses.len();
        addresses.retain(|a| a != address);
        if addresses.len() == before {
            warn!(address, "address was not stored");
            return Ok(false);
        }
        self.store.save(&format_address_list(&addresses))?;
        debug!(address, "removed stored printer address");
        Ok(true)
    }
}

impl std::fmt::Debug for AddressBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressBook").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_book(value: &str) -> (AddressBook, Arc<MemoryPreferences>) {
        let store = Arc::new(MemoryPreferences::new(value));
        (AddressBook::new(store.clone()), store)
    }

    #[test]
    fn empty_store_is_empty_list() {
        let (book, _) = memory_book("");
        assert!(book.addresses().unwrap().is_empty());
    }

    #[test]
    fn first_add_has_no_stray_separator() {
        let (book, store) = memory_book("");
        assert!(book.add("10.0.0.5").unwrap());
        assert_eq!(store.load().unwrap(), "10.0.0.5");

        assert!(book.add("10.0.0.6").unwrap());
        assert_eq!(store.load().unwrap(), "10.0.0.5,10.0.0.6");
    }

    #[test]
    fn add_never_duplicates() {
        let (book, store) = memory_book("10.0.0.5");
        assert!(!book.add("10.0.0.5").unwrap());
        assert_eq!(store.load().unwrap(), "10.0.0.5");
    }

    #[test]
    fn remove_address() {
        let (book, store) = memory_book("10.0.0.5,10.0.0.6");
        assert!(book.remove("10.0.0.5").unwrap());
        assert_eq!(store.load().unwrap(), "10.0.0.6");
        assert!(!book.remove("10.0.0.9").unwrap());

        assert!(book.remove("10.0.0.6").unwrap());
        assert_eq!(store.load().unwrap(), "");
        assert!(book.addresses().unwrap().is_empty());
    }

    #[test]
    fn concurrent_adds_store_each_once() {
        let (book, _) = memory_book("");
        let book = Arc::new(book);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let book = Arc::clone(&book);
                std::thread::spawn(move || {
                    book.add(&format!("10.0.0.{}", i % 4)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut addresses = book.addresses().unwrap();
        addresses.sort();
        assert_eq!(addresses, vec!["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let store = Arc::new(FilePreferences::new(path.clone()));
        assert_eq!(store.load().unwrap(), "");

        let book = AddressBook::new(store.clone());
        book.add("10.0.0.5").unwrap();
        book.add("printer.local").unwrap();

        let reopened = FilePreferences::new(path);
        assert_eq!(reopened.load().unwrap(), "10.0.0.5,printer.local");
    }

    #[test]
    fn file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = FilePreferences::new(path.clone());
        store.save("10.0.0.5").unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains("theme"));
        assert_eq!(store.load().unwrap(), "10.0.0.5");
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FilePreferences::new(path);
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }
}
