use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use stubby_core::store::Result;
use stubby_core::{ConsistencyLevel, Destination, ShortCode, StorageError, UrlMapping, UrlStore};
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    destination: Destination,
    owner: Option<String>,
}

/// Process-local implementation of [`UrlStore`] using DashMap.
///
/// Reads go straight to the sharded maps. Writes take a single mutex so the
/// forward and reverse maps always change together, which makes this
/// backend [`ConsistencyLevel::Atomic`]. Nothing survives a restart.
#[derive(Debug)]
pub struct InMemoryStore {
    codes: DashMap<ShortCode, Entry>,
    destinations: DashMap<Destination, ShortCode>,
    write_lock: Mutex<()>,
    open: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new, already open, in-memory store.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new in-memory store with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            codes: DashMap::with_capacity(capacity),
            destinations: DashMap::with_capacity(capacity),
            write_lock: Mutex::new(()),
            open: AtomicBool::new(true),
        }
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Owner recorded for `code`, if the mapping exists and has one.
    pub fn owner(&self, code: &ShortCode) -> Option<String> {
        self.codes.get(code).and_then(|entry| entry.owner.clone())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(
                "in-memory store is closed".to_string(),
            ))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn consistency(&self) -> ConsistencyLevel {
        ConsistencyLevel::Atomic
    }

    async fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn health(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn get_destination(&self, code: &ShortCode) -> Result<Destination> {
        self.ensure_open()?;
        self.codes
            .get(code)
            .map(|entry| entry.destination.clone())
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn get_short_code(&self, destination: &Destination) -> Result<ShortCode> {
        self.ensure_open()?;
        self.destinations
            .get(destination)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(destination.to_string()))
    }

    async fn put(&self, mapping: &UrlMapping) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        if self.codes.contains_key(&mapping.short_code) {
            return Err(StorageError::Conflict(mapping.short_code.to_string()));
        }
        if self.destinations.contains_key(&mapping.destination) {
            return Err(StorageError::Conflict(mapping.destination.to_string()));
        }

        self.codes.insert(
            mapping.short_code.clone(),
            Entry {
                destination: mapping.destination.clone(),
                owner: mapping.owner.clone(),
            },
        );
        self.destinations
            .insert(mapping.destination.clone(), mapping.short_code.clone());
        trace!(code = %mapping.short_code, destination = %mapping.destination, "stored mapping in memory");
        Ok(())
    }

    async fn delete(&self, code: &ShortCode) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();

        let (_, entry) = self
            .codes
            .remove(code)
            .ok_or_else(|| StorageError::NotFound(code.to_string()))?;
        self.destinations.remove(&entry.destination);
        trace!(code = %code, "removed mapping from memory");
        Ok(())
    }
}
