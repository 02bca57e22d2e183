//! Fault-tolerant key-value storage shared between endpoint contexts.
//!
//! A [`KeyValueStore`] is the only shared resource between a customer
//! endpoint and a driver endpoint. Values are JSON documents stored under
//! string keys. Reads never fail: a missing key, an unreadable backend or a
//! document that no longer parses all come back as `None` (or the type's
//! empty default). Writes report success as a `bool`.
//!
//! Each handle belongs to a *context*, the analogue of one browser tab.
//! Successful writes publish a [`StorageEvent`] tagged with the writing
//! context, so other contexts in the same process can react without waiting
//! for their next poll.

mod embedded;
mod file;
mod memory;

pub use embedded::SledBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::config::Config;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the change-notification bus.
const EVENT_CAPACITY: usize = 64;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Raw byte storage under string keys.
pub trait KvBackend: Send + Sync {
    /// Read the bytes stored under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`.
    fn write(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Short backend name for status output.
    fn name(&self) -> &'static str;

    /// Push buffered writes to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Which backend a [`Config`] opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// One JSON file per key; safe to share between processes.
    #[default]
    File,
    /// Sled embedded database; one process at a time.
    Sled,
    /// Process-local map, gone on exit.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Sled => "sled",
            BackendKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "sled" => Ok(BackendKind::Sled),
            "memory" => Ok(BackendKind::Memory),
            other => Err(Error::Config(format!("unknown store backend: {}", other))),
        }
    }
}

/// Identifies one execution context (one endpoint "tab").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A key changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that was written or removed.
    pub key: String,
    /// Context that made the change.
    pub origin: ContextId,
}

/// Handle to the shared store, bound to one context.
///
/// Cloning keeps the context; use [`KeyValueStore::attach`] for a new one.
#[derive(Clone)]
pub struct KeyValueStore {
    backend: Arc<dyn KvBackend>,
    events: broadcast::Sender<StorageEvent>,
    context: ContextId,
}

impl KeyValueStore {
    /// Wrap a backend in a fresh context.
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend: Arc::new(backend),
            events,
            context: ContextId::next(),
        }
    }

    /// Process-local store, mainly for tests.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open the backend selected by the configuration.
    pub fn open(config: &Config) -> Result<Self> {
        let store = match config.backend {
            BackendKind::File => Self::new(FileBackend::open(&config.store_dir)?),
            BackendKind::Sled => Self::new(SledBackend::open(&config.store_dir.join("chat.db"))?),
            BackendKind::Memory => Self::in_memory(),
        };
        debug!(
            "Opened {} store at {:?} as {}",
            store.backend_name(),
            config.store_dir,
            store.context
        );
        Ok(store)
    }

    /// New context over the same backend and notification bus.
    pub fn attach(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
            context: ContextId::next(),
        }
    }

    /// The context this handle writes as.
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Read and deserialize `key`, or `None` on any failure.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.read(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read '{}' from {} store: {}", key, self.backend.name(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unparseable value under '{}': {}", key, e);
                None
            }
        }
    }

    /// Read `key`, falling back to the empty default (`{}` for maps, `[]` for lists).
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key).unwrap_or_default()
    }

    /// Serialize and write `value`. Returns `false` if nothing was stored.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize value for '{}': {}", key, e);
                return false;
            }
        };

        if let Err(e) = self.backend.write(key, &bytes) {
            warn!("Failed to write '{}' to {} store: {}", key, self.backend.name(), e);
            return false;
        }

        self.notify(key);
        true
    }

    /// Best-effort delete.
    pub fn remove(&self, key: &str) {
        match self.backend.delete(key) {
            Ok(()) => self.notify(key),
            Err(e) => warn!("Failed to remove '{}' from {} store: {}", key, self.backend.name(), e),
        }
    }

    /// Flush buffered writes. Failures are logged and ignored.
    pub fn flush(&self) {
        if let Err(e) = self.backend.flush() {
            warn!("Failed to flush {} store: {}", self.backend.name(), e);
        }
    }

    /// Subscribe to changes made through any context of this store.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn notify(&self, key: &str) {
        // No receivers is fine
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            origin: self.context,
        });
    }
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("backend", &self.backend.name())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_get_missing_key() {
        let store = KeyValueStore::in_memory();
        assert_eq!(store.get::<u32>("missing"), None);

        let map: BTreeMap<String, u32> = store.get_or_default("missing");
        assert!(map.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let store = KeyValueStore::in_memory();
        assert!(store.set("counts", &BTreeMap::from([("a".to_string(), 3u32)])));

        let map: BTreeMap<String, u32> = store.get_or_default("counts");
        assert_eq!(map.get("a"), Some(&3));

        store.remove("counts");
        assert_eq!(store.get::<BTreeMap<String, u32>>("counts"), None);
    }

    #[test]
    fn test_unparseable_value_reads_as_default() {
        let backend = MemoryBackend::new();
        backend.write("list", b"{not json").unwrap();
        let store = KeyValueStore::new(backend);

        assert_eq!(store.get::<Vec<String>>("list"), None);
        assert!(store.get_or_default::<Vec<String>>("list").is_empty());
    }

    #[test]
    fn test_type_mismatch_reads_as_none() {
        let store = KeyValueStore::in_memory();
        store.set("value", "text");
        assert_eq!(store.get::<u64>("value"), None);
    }

    #[test]
    fn test_quota_exceeded_returns_false() {
        let store = KeyValueStore::new(MemoryBackend::with_quota(8));
        assert!(!store.set("big", &"x".repeat(64)));
        assert_eq!(store.get::<String>("big"), None);
        assert!(store.set("small", &1u8));
    }

    #[test]
    fn test_attach_creates_new_context() {
        let store = KeyValueStore::in_memory();
        let other = store.attach();
        assert_ne!(store.context(), other.context());
        assert_eq!(store.clone().context(), store.context());

        store.set("shared", &42u32);
        assert_eq!(other.get::<u32>("shared"), Some(42));
    }

    #[test]
    fn test_events_carry_origin() {
        let store = KeyValueStore::in_memory();
        let other = store.attach();
        let mut rx = other.subscribe();

        store.set("k", &1u8);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "k");
        assert_eq!(event.origin, store.context());

        other.remove("k");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.origin, other.context());
    }

    #[test]
    fn test_failed_write_publishes_nothing() {
        let store = KeyValueStore::new(MemoryBackend::with_quota(4));
        let mut rx = store.subscribe();
        assert!(!store.set("big", &"too large"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("FILE".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!(" sled ".parse::<BackendKind>().unwrap(), BackendKind::Sled);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("redis".parse::<BackendKind>().is_err());
    }
}
