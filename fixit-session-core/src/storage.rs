//! Durable key/value storage shared across tabs
//!
//! A [`StorageArea`] plays the role of a browser's local storage: every tab
//! of one browser context reads and writes the same area, and every mutation
//! is broadcast as a [`StorageEvent`] tagged with the tab that caused it.
//! Tabs access the area through a [`TabStorage`] handle, which stamps their
//! [`TabId`] on each write.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{Error, Result};

/// Capacity of the storage event channel before slow listeners lag
const EVENT_CAPACITY: usize = 64;

/// Identifier of one tab within a browser context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mutation of the storage area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// Tab that performed the write
    pub origin: TabId,
}

/// Trait for the persistence layer behind a storage area
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`
    fn delete(&self, key: &str) -> Result<()>;
}

/// Allow using Box<dyn StorageBackend> as a StorageBackend
impl StorageBackend for Box<dyn StorageBackend> {
    fn load(&self, key: &str) -> Result<Option<String>> {
        (**self).load(key)
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        (**self).store(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

/// In-memory backend (lost when the process exits)
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Backend persisting all keys as one JSON object in a file
///
/// The file is re-read on every access so that writes by other processes
/// are picked up, and replaced atomically on every write.
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Open (or lazily create) the storage file at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                Error::Storage(format!("corrupt storage file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Storage shared by all tabs of a browser context
pub struct StorageArea {
    backend: Box<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    /// Held across write and publish so events arrive in write order
    writes: Mutex<()>,
}

impl StorageArea {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend: Box::new(backend),
            events,
            writes: Mutex::new(()),
        }
    }

    /// Storage area backed by memory only
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.load(key)
    }

    /// Write a value; broadcasts an event only if the value changed
    pub fn set(&self, key: &str, value: &str, origin: TabId) -> Result<()> {
        let _writes = self.writes.lock();
        let old_value = self.backend.load(key)?;
        if old_value.as_deref() == Some(value) {
            return Ok(());
        }
        self.backend.store(key, value)?;
        self.publish(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: Some(value.to_string()),
            origin,
        });
        Ok(())
    }

    /// Remove a key; broadcasts an event only if the key existed
    pub fn remove(&self, key: &str, origin: TabId) -> Result<()> {
        let _writes = self.writes.lock();
        let old_value = self.backend.load(key)?;
        if old_value.is_none() {
            return Ok(());
        }
        self.backend.delete(key)?;
        self.publish(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: None,
            origin,
        });
        Ok(())
    }

    /// Subscribe to mutations made from now on
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StorageEvent) {
        tracing::trace!(key = %event.key, origin = %event.origin, "Storage mutated");
        // No receivers simply means no other tab is listening
        let _ = self.events.send(event);
    }
}

/// A tab's handle on the shared storage area
#[derive(Clone)]
pub struct TabStorage {
    area: Arc<StorageArea>,
    tab: TabId,
}

impl TabStorage {
    pub fn new(area: Arc<StorageArea>, tab: TabId) -> Self {
        Self { area, tab }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.area.get(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.area.set(key, value, self.tab)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.area.remove(key, self.tab)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.area.subscribe()
    }
}
