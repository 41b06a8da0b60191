use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use parking_lot::RwLock;
use std::time::Duration;
use stubby_core::store::Result;
use stubby_core::{ConsistencyLevel, Destination, ShortCode, StorageError, UrlMapping, UrlStore};
use tracing::{debug, info, trace, warn};

/// Default prefix for every key this store writes.
pub const DEFAULT_KEY_PREFIX: &str = "stubby:";

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 80;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Removes a code's forward and owner keys, and its reverse key only while
/// that key still names this code. A forward key left behind by a partial
/// write shares its destination with another, live code.
///
/// KEYS: forward key, owner key. ARGV: reverse key prefix, code.
/// Returns 0 when the code is not bound.
const DELETE_SCRIPT: &str = r#"
local destination = redis.call('GET', KEYS[1])
if not destination then
    return 0
end
local reverse_key = ARGV[1] .. destination
if redis.call('GET', reverse_key) == ARGV[2] then
    redis.call('DEL', reverse_key)
end
redis.call('DEL', KEYS[1], KEYS[2])
return 1
"#;

/// Redis implementation of [`UrlStore`].
///
/// Each direction is its own key:
///
/// * `{prefix}code:{code}` holds the destination
/// * `{prefix}dest:{destination}` holds the code
///
/// The two keys are written by separate `SET NX` commands, so this backend
/// is [`ConsistencyLevel::PerKey`]: a failure between them leaves the
/// forward key behind and is reported as [`StorageError::PartialWrite`].
#[derive(Debug)]
pub struct RedisStore {
    url: String,
    key_prefix: String,
    pool_size: usize,
    pool: RwLock<Option<Pool>>,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> StorageError {
    let message = format!("{operation}: {err}");
    if message.to_ascii_lowercase().contains("timed out") {
        StorageError::Timeout(message)
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        StorageError::Unavailable(message)
    } else {
        StorageError::Operation(message)
    }
}

fn map_pool_error(operation: &str, err: impl std::fmt::Display) -> StorageError {
    let message = format!("{operation}: {err}");
    if message.to_ascii_lowercase().contains("timed out") {
        StorageError::Timeout(message)
    } else {
        StorageError::Unavailable(message)
    }
}

impl RedisStore {
    /// Creates a store for the Redis server at `url`
    /// (e.g. `redis://localhost:6379`). Call [`UrlStore::open`] before use.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_prefix(url, DEFAULT_KEY_PREFIX)
    }

    /// Creates a store with a custom key prefix (e.g. `"myapp:"`).
    pub fn with_prefix(url: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: key_prefix.into(),
            pool_size: DEFAULT_POOL_SIZE,
            pool: RwLock::new(None),
        }
    }

    /// Sets the maximum number of pooled connections.
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    fn code_key(&self, code: &str) -> String {
        format!("{}code:{}", self.key_prefix, code)
    }

    fn destination_key(&self, destination: &str) -> String {
        format!("{}dest:{}", self.key_prefix, destination)
    }

    fn owner_key(&self, code: &str) -> String {
        format!("{}owner:{}", self.key_prefix, code)
    }

    async fn connection(&self) -> Result<Connection> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| StorageError::Unavailable("redis store is not open".to_string()))?;
        pool.get()
            .await
            .map_err(|e| map_pool_error("failed to get redis connection", e))
    }
}

async fn ping(conn: &mut Connection) -> redis::RedisResult<String> {
    redis::cmd("PING").query_async::<String>(conn).await
}

#[async_trait]
impl UrlStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn consistency(&self) -> ConsistencyLevel {
        ConsistencyLevel::PerKey
    }

    async fn open(&self) -> Result<()> {
        if self.pool.read().is_some() {
            return Ok(());
        }

        let mut config = Config::from_url(self.url.clone());
        config.pool = Some(PoolConfig::new(self.pool_size));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StorageError::Unavailable(format!("failed to create redis pool: {e}")))?;

        // The pool connects lazily; check the server is reachable now.
        let mut conn = pool
            .get()
            .await
            .map_err(|e| map_pool_error("failed to connect to redis", e))?;
        ping(&mut conn).await.map_err(|e| {
            StorageError::Unavailable(format!("redis did not answer PING: {e}"))
        })?;

        *self.pool.write() = Some(pool);
        info!(url = %self.url, pool_size = self.pool_size, "opened redis store");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.write().take() {
            pool.close();
            info!(url = %self.url, "closed redis store");
        }
        Ok(())
    }

    async fn health(&self) -> bool {
        let check = async {
            let mut conn = self.connection().await.ok()?;
            ping(&mut conn).await.ok()
        };
        matches!(tokio::time::timeout(HEALTH_TIMEOUT, check).await, Ok(Some(_)))
    }

    async fn get_destination(&self, code: &ShortCode) -> Result<Destination> {
        let key = self.code_key(code.as_str());
        trace!(code = %code, "reading forward key");

        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(destination)) => Ok(Destination::new_unchecked(destination)),
            Ok(None) => Err(StorageError::NotFound(code.to_string())),
            Err(e) => {
                warn!(code = %code, error = %e, "redis error on forward lookup");
                Err(map_redis_error("failed to read forward key", e))
            }
        }
    }

    async fn get_short_code(&self, destination: &Destination) -> Result<ShortCode> {
        let key = self.destination_key(destination.as_str());
        trace!(destination = %destination, "reading reverse key");

        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(code)) => Ok(ShortCode::new_unchecked(code)),
            Ok(None) => Err(StorageError::NotFound(destination.to_string())),
            Err(e) => {
                warn!(destination = %destination, error = %e, "redis error on reverse lookup");
                Err(map_redis_error("failed to read reverse key", e))
            }
        }
    }

    async fn put(&self, mapping: &UrlMapping) -> Result<()> {
        let code = &mapping.short_code;
        let destination = &mapping.destination;
        let forward_key = self.code_key(code.as_str());
        let reverse_key = self.destination_key(destination.as_str());

        let mut conn = self.connection().await?;

        let written = conn
            .set_nx::<_, _, bool>(&forward_key, destination.as_str())
            .await
            .map_err(|e| map_redis_error("failed to write forward key", e))?;
        if !written {
            return Err(StorageError::Conflict(code.to_string()));
        }

        // From here on the forward key exists and is not rolled back.
        match conn
            .set_nx::<_, _, bool>(&reverse_key, code.as_str())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(code = %code, destination = %destination, "reverse key already bound, forward key left behind");
                return Err(StorageError::PartialWrite(format!(
                    "forward key for '{code}' written but destination '{destination}' is already bound"
                )));
            }
            Err(e) => {
                warn!(code = %code, destination = %destination, error = %e, "reverse write failed, forward key left behind");
                return Err(StorageError::PartialWrite(format!(
                    "forward key for '{code}' written but reverse write failed: {e}"
                )));
            }
        }

        if let Some(owner) = mapping.owner.as_deref() {
            conn.set::<_, _, ()>(self.owner_key(code.as_str()), owner)
                .await
                .map_err(|e| {
                    StorageError::PartialWrite(format!(
                        "mapping for '{code}' written but owner write failed: {e}"
                    ))
                })?;
        }

        debug!(code = %code, destination = %destination, "stored mapping in redis");
        Ok(())
    }

    async fn delete(&self, code: &ShortCode) -> Result<()> {
        let mut conn = self.connection().await?;

        let removed = redis::cmd("EVAL")
            .arg(DELETE_SCRIPT)
            .arg(2)
            .arg(self.code_key(code.as_str()))
            .arg(self.owner_key(code.as_str()))
            .arg(self.destination_key(""))
            .arg(code.as_str())
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to delete mapping keys", e))?;
        if removed == 0 {
            return Err(StorageError::NotFound(code.to_string()));
        }

        debug!(code = %code, "removed mapping from redis");
        Ok(())
    }
}
