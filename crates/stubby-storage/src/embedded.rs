use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stubby_core::store::Result;
use stubby_core::{ConsistencyLevel, Destination, ShortCode, StorageError, UrlMapping, UrlStore};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// Forward index: short code -> destination.
const CODES: TableDefinition<&str, &str> = TableDefinition::new("codes");
/// Reverse index: destination -> short code.
const DESTINATIONS: TableDefinition<&str, &str> = TableDefinition::new("destinations");
/// Optional owner attribute, keyed by short code.
const OWNERS: TableDefinition<&str, &str> = TableDefinition::new("owners");

/// Embedded, file-backed implementation of [`UrlStore`] on top of redb.
///
/// Both directions of a mapping are written and removed inside one redb
/// write transaction, so this backend is [`ConsistencyLevel::Atomic`].
/// redb admits a single writer at a time, which serializes concurrent
/// writes. All database work runs on the blocking thread pool.
pub struct RedbStore {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
    open_gate: Mutex<()>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .field("open", &self.db.read().is_some())
            .finish()
    }
}

impl RedbStore {
    /// Creates a store for the database file at `path`. Call
    /// [`UrlStore::open`] before use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: RwLock::new(None),
            open_gate: Mutex::new(()),
        }
    }

    /// Returns the path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self) -> Result<Arc<Database>> {
        self.db.read().clone().ok_or_else(|| {
            StorageError::Unavailable(format!("redb store {} is not open", self.path.display()))
        })
    }
}

fn map_redb_error(err: impl Into<redb::Error>) -> StorageError {
    StorageError::Operation(err.into().to_string())
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Operation(format!("blocking task failed: {e}")))?
}

fn create_database(path: &Path) -> Result<Database> {
    let unavailable = |e: redb::Error| {
        StorageError::Unavailable(format!("failed to open redb file {}: {e}", path.display()))
    };

    let db = Database::create(path).map_err(|e| unavailable(e.into()))?;

    // Create the tables up front so read transactions never see them missing.
    let txn = db.begin_write().map_err(|e| unavailable(e.into()))?;
    {
        txn.open_table(CODES).map_err(|e| unavailable(e.into()))?;
        txn.open_table(DESTINATIONS)
            .map_err(|e| unavailable(e.into()))?;
        txn.open_table(OWNERS).map_err(|e| unavailable(e.into()))?;
    }
    txn.commit().map_err(|e| unavailable(e.into()))?;

    Ok(db)
}

fn read_value(
    db: &Database,
    table: TableDefinition<'static, &'static str, &'static str>,
    key: &str,
) -> Result<Option<String>> {
    let txn = db.begin_read().map_err(map_redb_error)?;
    let table = txn.open_table(table).map_err(map_redb_error)?;
    let value = table
        .get(key)
        .map_err(map_redb_error)?
        .map(|guard| guard.value().to_string());
    Ok(value)
}

#[async_trait]
impl UrlStore for RedbStore {
    fn backend(&self) -> &'static str {
        "redb"
    }

    fn consistency(&self) -> ConsistencyLevel {
        ConsistencyLevel::Atomic
    }

    async fn open(&self) -> Result<()> {
        let _gate = self.open_gate.lock().await;
        if self.db.read().is_some() {
            return Ok(());
        }

        let path = self.path.clone();
        let db = run_blocking(move || create_database(&path)).await?;
        *self.db.write() = Some(Arc::new(db));

        info!(path = %self.path.display(), "opened redb store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _gate = self.open_gate.lock().await;
        // In-flight operations keep their own handle; the file is released
        // once the last of them finishes.
        if self.db.write().take().is_some() {
            info!(path = %self.path.display(), "closed redb store");
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        self.path.exists() && self.db.read().is_some()
    }

    async fn get_destination(&self, code: &ShortCode) -> Result<Destination> {
        let db = self.handle()?;
        let key = code.as_str().to_owned();
        trace!(code = %code, "reading forward index");

        let value = run_blocking(move || read_value(&db, CODES, &key)).await?;
        value
            .map(Destination::new_unchecked)
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn get_short_code(&self, destination: &Destination) -> Result<ShortCode> {
        let db = self.handle()?;
        let key = destination.as_str().to_owned();
        trace!(destination = %destination, "reading reverse index");

        let value = run_blocking(move || read_value(&db, DESTINATIONS, &key)).await?;
        value
            .map(ShortCode::new_unchecked)
            .ok_or_else(|| StorageError::NotFound(destination.to_string()))
    }

    async fn put(&self, mapping: &UrlMapping) -> Result<()> {
        let db = self.handle()?;
        let code = mapping.short_code.as_str().to_owned();
        let destination = mapping.destination.as_str().to_owned();
        let owner = mapping.owner.clone();

        run_blocking(move || {
            let txn = db.begin_write().map_err(map_redb_error)?;
            {
                let mut codes = txn.open_table(CODES).map_err(map_redb_error)?;
                let mut destinations = txn.open_table(DESTINATIONS).map_err(map_redb_error)?;

                if codes.get(code.as_str()).map_err(map_redb_error)?.is_some() {
                    return Err(StorageError::Conflict(code.clone()));
                }
                if destinations
                    .get(destination.as_str())
                    .map_err(map_redb_error)?
                    .is_some()
                {
                    return Err(StorageError::Conflict(destination.clone()));
                }

                codes
                    .insert(code.as_str(), destination.as_str())
                    .map_err(map_redb_error)?;
                destinations
                    .insert(destination.as_str(), code.as_str())
                    .map_err(map_redb_error)?;

                if let Some(owner) = owner.as_deref() {
                    let mut owners = txn.open_table(OWNERS).map_err(map_redb_error)?;
                    owners
                        .insert(code.as_str(), owner)
                        .map_err(map_redb_error)?;
                }
            }
            txn.commit().map_err(map_redb_error)
        })
        .await?;

        debug!(code = %mapping.short_code, destination = %mapping.destination, "stored mapping in redb");
        Ok(())
    }

    async fn delete(&self, code: &ShortCode) -> Result<()> {
        let db = self.handle()?;
        let key = code.as_str().to_owned();

        run_blocking(move || {
            let txn = db.begin_write().map_err(map_redb_error)?;
            {
                let mut codes = txn.open_table(CODES).map_err(map_redb_error)?;
                let mut destinations = txn.open_table(DESTINATIONS).map_err(map_redb_error)?;
                let mut owners = txn.open_table(OWNERS).map_err(map_redb_error)?;

                let destination = match codes.remove(key.as_str()).map_err(map_redb_error)? {
                    Some(guard) => guard.value().to_string(),
                    None => return Err(StorageError::NotFound(key.clone())),
                };
                destinations
                    .remove(destination.as_str())
                    .map_err(map_redb_error)?;
                owners.remove(key.as_str()).map_err(map_redb_error)?;
            }
            txn.commit().map_err(map_redb_error)
        })
        .await?;

        debug!(code = %code, "removed mapping from redb");
        Ok(())
    }
}
