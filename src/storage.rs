//! Persisted reactive cells.
//!
//! Every stateful plugin keeps its state in a [`PersistedCell`]: an in-memory
//! value with change subscribers that optionally mirrors itself into a
//! [`Storage`] backend so it survives a reload.
//!
//! # Backends
//!
//! - [`MemoryStorage`]: process-local map, the default
//! - [`FileStorage`]: one file per key inside a directory
//!
//! Backends are chosen once when the cell is created. The cell code has no
//! branch on "sync vs async" storage: every backend is driven through the
//! same async [`Storage`] interface, and synchronous backends simply resolve
//! immediately.
//!
//! # Hydration
//!
//! A cell starts at its initial value. [`PersistedCell::hydrate`] reads the
//! stored value back. If the session already wrote to the cell before
//! hydration finished, the caller-supplied merge function combines the
//! stored value with the session value instead of discarding either.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::storage::{MemoryStorage, PersistedCell, Storage};
//! use std::rc::Rc;
//!
//! let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
//!
//! pollster::block_on(async {
//!     let counter = PersistedCell::persisted("app:counter", 0u32, storage.clone());
//!     counter.set(3).await;
//!
//!     let restored = PersistedCell::persisted("app:counter", 0u32, storage);
//!     restored.hydrate(|stored, _session| stored).await;
//!     assert_eq!(restored.get(), 3);
//! });
//! ```

use crate::error::StorageError;
use crate::{debug_log, trace_log, warn_log};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;

// ============================================================================
// Storage backends
// ============================================================================

/// Key-value string store backing persisted cells.
pub trait Storage {
    /// Read a value.
    fn get<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<Option<String>, StorageError>>;

    /// Write a value.
    fn set<'a>(&'a self, key: &'a str, value: String) -> LocalBoxFuture<'a, Result<(), StorageError>>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>>;
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored value, bypassing the async interface.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<Option<String>, StorageError>> {
        let value = self.entries.borrow().get(key).cloned();
        async move { Ok(value) }.boxed_local()
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        async { Ok(()) }.boxed_local()
    }

    fn remove<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        self.entries.borrow_mut().remove(key);
        async { Ok(()) }.boxed_local()
    }
}

/// Directory-backed storage, one file per key.
///
/// Keys are mapped to file names by replacing every character outside
/// `[A-Za-z0-9._-]` with `_`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` as the storage directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl Storage for FileStorage {
    fn get<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<Option<String>, StorageError>> {
        async move {
            match std::fs::read_to_string(self.file_for(key)) {
                Ok(raw) => Ok(Some(raw)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
        .boxed_local()
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        async move {
            std::fs::write(self.file_for(key), value)?;
            Ok(())
        }
        .boxed_local()
    }

    fn remove<'a>(&'a self, key: &'a str) -> LocalBoxFuture<'a, Result<(), StorageError>> {
        async move {
            match std::fs::remove_file(self.file_for(key)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
        .boxed_local()
    }
}

// ============================================================================
// Codecs
// ============================================================================

/// Converts cell values to and from their stored string form.
pub trait Codec<T> {
    /// Encode a value.
    fn encode(&self, value: &T) -> Result<String, StorageError>;
    /// Decode a stored value.
    fn decode(&self, raw: &str) -> Result<T, StorageError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<String, StorageError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, raw: &str) -> Result<T, StorageError> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ============================================================================
// PersistedCell
// ============================================================================

/// Handle returned by [`PersistedCell::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(usize);

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct Backend<T> {
    storage: Rc<dyn Storage>,
    codec: Rc<dyn Codec<T>>,
}

struct CellInner<T> {
    key: String,
    initial: T,
    value: RefCell<T>,
    backend: Option<Backend<T>>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber<T>)>>,
    next_subscription: Cell<usize>,
    written: Cell<bool>,
    hydrated: Cell<bool>,
}

/// Reactive value that optionally mirrors itself into a [`Storage`] backend.
///
/// Clones share the same value.
pub struct PersistedCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for PersistedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PersistedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedCell")
            .field("key", &self.inner.key)
            .field("value", &*self.inner.value.borrow())
            .field("persisted", &self.inner.backend.is_some())
            .finish()
    }
}

impl<T: Clone + 'static> PersistedCell<T> {
    /// In-memory cell that is never persisted.
    pub fn new(key: impl Into<String>, initial: T) -> Self {
        Self::build(key.into(), initial, None)
    }

    /// Cell persisted through `storage` with a custom codec.
    pub fn persisted_with_codec(
        key: impl Into<String>,
        initial: T,
        storage: Rc<dyn Storage>,
        codec: Rc<dyn Codec<T>>,
    ) -> Self {
        Self::build(key.into(), initial, Some(Backend { storage, codec }))
    }

    fn build(key: String, initial: T, backend: Option<Backend<T>>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                key,
                value: RefCell::new(initial.clone()),
                initial,
                backend,
                subscribers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                written: Cell::new(false),
                hydrated: Cell::new(false),
            }),
        }
    }

    /// Storage key.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Whether the cell mirrors itself into storage.
    pub fn is_persisted(&self) -> bool {
        self.inner.backend.is_some()
    }

    /// Whether [`hydrate`](Self::hydrate) completed.
    pub fn is_hydrated(&self) -> bool {
        self.inner.hydrated.get()
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value.
    ///
    /// The closure must not write to the same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value, notify subscribers, then persist.
    pub async fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.changed().await;
    }

    /// Mutate the value in place, notify subscribers, then persist.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.changed().await;
        result
    }

    /// Register a change subscriber.
    ///
    /// Subscribers run synchronously after every change with a snapshot of
    /// the new value; they may write to the cell again.
    pub fn subscribe(&self, f: impl Fn(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.get());
        self.inner.next_subscription.set(id.0 + 1);
        self.inner.subscribers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    /// Remove a subscriber; returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Read the stored value back into the cell.
    ///
    /// When the cell was written before hydration finished, the stored value
    /// and the session value are combined with `merge(stored, session)` and
    /// the result is persisted. A missing or undecodable stored value leaves
    /// the session value untouched.
    pub async fn hydrate(&self, merge: impl FnOnce(T, T) -> T) {
        let Some(backend) = &self.inner.backend else {
            self.inner.hydrated.set(true);
            return;
        };

        let raw = match backend.storage.get(&self.inner.key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn_log!("Failed to read '{}' from storage: {}", self.inner.key, e);
                None
            }
        };
        self.inner.hydrated.set(true);

        let Some(raw) = raw else {
            trace_log!("Nothing stored under '{}'", self.inner.key);
            return;
        };

        let stored = match backend.codec.decode(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn_log!("Discarding stored '{}': {}", self.inner.key, e);
                return;
            }
        };

        if self.inner.written.get() {
            debug_log!("Merging stored '{}' with session value", self.inner.key);
            let session = self.get();
            self.set(merge(stored, session)).await;
        } else {
            *self.inner.value.borrow_mut() = stored;
            self.notify();
        }
    }

    /// Reset to the initial value and delete the stored copy.
    pub async fn clear(&self) {
        *self.inner.value.borrow_mut() = self.inner.initial.clone();
        self.notify();
        if let Some(backend) = &self.inner.backend {
            if let Err(e) = backend.storage.remove(&self.inner.key).await {
                warn_log!("Failed to remove '{}' from storage: {}", self.inner.key, e);
            }
        }
    }

    async fn changed(&self) {
        self.inner.written.set(true);
        self.notify();
        self.persist().await;
    }

    fn notify(&self) {
        let subscribers: Vec<Subscriber<T>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        if subscribers.is_empty() {
            return;
        }
        let snapshot = self.get();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
    }

    async fn persist(&self) {
        let Some(backend) = &self.inner.backend else {
            return;
        };
        let encoded = {
            let value = self.inner.value.borrow();
            backend.codec.encode(&value)
        };
        let result = match encoded {
            Ok(raw) => backend.storage.set(&self.inner.key, raw).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn_log!("Failed to persist '{}': {}", self.inner.key, e);
        }
    }
}

impl<T> PersistedCell<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Cell persisted through `storage` as JSON.
    pub fn persisted(key: impl Into<String>, initial: T, storage: Rc<dyn Storage>) -> Self {
        Self::persisted_with_codec(key, initial, storage, Rc::new(JsonCodec))
    }
}

/// Codec marker for types that are stored as their `Display`/`FromStr` text.
#[derive(Debug, Default)]
pub struct TextCodec<T>(PhantomData<T>);

impl<T> TextCodec<T> {
    /// Create the codec.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Codec<T> for TextCodec<T>
where
    T: std::fmt::Display + std::str::FromStr,
    T::Err: std::fmt::Display,
{
    fn encode(&self, value: &T) -> Result<String, StorageError> {
        Ok(value.to_string())
    }

    fn decode(&self, raw: &str) -> Result<T, StorageError> {
        raw.parse().map_err(|e: T::Err| StorageError::Codec(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Rc<MemoryStorage> {
        Rc::new(MemoryStorage::new())
    }

    #[test]
    fn test_set_persists_json() {
        let storage = memory();
        let cell = PersistedCell::persisted("k", vec![1u8], storage.clone());
        pollster::block_on(cell.set(vec![1, 2]));
        assert_eq!(storage.raw("k").as_deref(), Some("[1,2]"));
    }

    #[test]
    fn test_subscribers_and_unsubscribe() {
        let cell = PersistedCell::new("k", 0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let id = {
            let seen = seen.clone();
            cell.subscribe(move |v| seen.borrow_mut().push(*v))
        };

        pollster::block_on(cell.set(1));
        pollster::block_on(cell.update(|v| *v += 1));
        assert!(cell.unsubscribe(id));
        pollster::block_on(cell.set(10));

        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_subscriber_may_write_back() {
        let cell = PersistedCell::new("k", 0);
        {
            let inner = cell.clone();
            cell.subscribe(move |v| {
                if *v == 1 {
                    pollster::block_on(inner.set(2));
                }
            });
        }
        pollster::block_on(cell.set(1));
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn test_hydrate_reads_back() {
        let storage = memory();
        pollster::block_on(async {
            let first = PersistedCell::persisted("tabs", vec!["a".to_string()], storage.clone());
            first.set(vec!["b".to_string()]).await;

            let second = PersistedCell::persisted("tabs", Vec::<String>::new(), storage.clone());
            second.hydrate(|stored, _| stored).await;
            assert!(second.is_hydrated());
            assert_eq!(second.get(), vec!["b".to_string()]);
        });
    }

    #[test]
    fn test_hydrate_merges_session_writes() {
        let storage = memory();
        pollster::block_on(async {
            PersistedCell::persisted("list", vec![1], storage.clone())
                .set(vec![1, 2])
                .await;

            let cell = PersistedCell::persisted("list", Vec::<i32>::new(), storage.clone());
            cell.set(vec![3]).await;
            cell.hydrate(|mut stored, session| {
                stored.extend(session);
                stored
            })
            .await;

            assert_eq!(cell.get(), vec![1, 2, 3]);
            assert_eq!(storage.raw("list").as_deref(), Some("[1,2,3]"));
        });
    }

    #[test]
    fn test_undecodable_value_is_ignored() {
        let storage = memory();
        pollster::block_on(async {
            storage.set("n", "not json".to_string()).await.unwrap();
            let cell = PersistedCell::persisted("n", 5u32, storage.clone());
            cell.hydrate(|stored, _| stored).await;
            assert_eq!(cell.get(), 5);
        });
    }

    #[test]
    fn test_clear_resets_and_removes() {
        let storage = memory();
        pollster::block_on(async {
            let cell = PersistedCell::persisted("c", 1, storage.clone());
            cell.set(9).await;
            cell.clear().await;
            assert_eq!(cell.get(), 1);
            assert!(!storage.contains_key("c"));
        });
    }

    #[test]
    fn test_text_codec() {
        let storage = memory();
        let codec: Rc<dyn Codec<u64>> = Rc::new(TextCodec::new());
        pollster::block_on(async {
            let cell = PersistedCell::persisted_with_codec("t", 0u64, storage.clone(), codec);
            cell.set(42).await;
            assert_eq!(storage.raw("t").as_deref(), Some("42"));
        });
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = std::env::temp_dir().join(format!("navigator-plugins-{}", std::process::id()));
        let storage = FileStorage::new(&dir).unwrap();

        pollster::block_on(async {
            storage.set("nav:tabs", "[]".to_string()).await.unwrap();
            assert_eq!(storage.get("nav:tabs").await.unwrap().as_deref(), Some("[]"));
            storage.remove("nav:tabs").await.unwrap();
            assert_eq!(storage.get("nav:tabs").await.unwrap(), None);
            storage.remove("nav:tabs").await.unwrap();
        });

        let _ = std::fs::remove_dir_all(dir);
    }
}
