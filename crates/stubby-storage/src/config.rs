use crate::cache::{RedisStore, DEFAULT_KEY_PREFIX, DEFAULT_POOL_SIZE};
use crate::embedded::RedbStore;
use crate::memory::InMemoryStore;
use crate::relational::{MySqlStore, DEFAULT_MAX_CONNECTIONS};
use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;
use std::path::PathBuf;
use std::sync::Arc;
use stubby_core::store::Result;
use stubby_core::UrlStore;
use tracing::info;

/// Backend selection plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Redb {
        #[serde(default = "default_redb_path")]
        path: PathBuf,
    },
    Redis {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default = "default_redis_port")]
        port: u16,
        #[serde(default = "default_pool_size")]
        pool_size: usize,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
    #[serde(rename = "mysql")]
    MySql {
        #[serde(default = "default_host")]
        host: String,
        #[serde(default = "default_mysql_port")]
        port: u16,
        #[serde(default = "default_mysql_name")]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default = "default_mysql_name")]
        database: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Memory,
}

fn default_redb_path() -> PathBuf {
    PathBuf::from("./stubby.redb")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_name() -> String {
    "stubby".to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl StoreConfig {
    /// Backend name as used by the `backend` tag.
    pub fn backend(&self) -> &'static str {
        match self {
            StoreConfig::Redb { .. } => "redb",
            StoreConfig::Redis { .. } => "redis",
            StoreConfig::MySql { .. } => "mysql",
            StoreConfig::Memory => "memory",
        }
    }

    fn build(&self) -> Arc<dyn UrlStore> {
        match self {
            StoreConfig::Redb { path } => Arc::new(RedbStore::new(path.clone())),
            StoreConfig::Redis {
                host,
                port,
                pool_size,
                key_prefix,
            } => Arc::new(
                RedisStore::with_prefix(format!("redis://{host}:{port}"), key_prefix.clone())
                    .pool_size(*pool_size),
            ),
            StoreConfig::MySql {
                host,
                port,
                username,
                password,
                database,
                max_connections,
            } => {
                let options = MySqlConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(username)
                    .password(password)
                    .database(database);
                Arc::new(MySqlStore::new(options).max_connections(*max_connections))
            }
            StoreConfig::Memory => Arc::new(InMemoryStore::new()),
        }
    }
}

/// Builds the configured backend and opens it.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn UrlStore>> {
    let store = config.build();
    store.open().await?;
    info!(backend = store.backend(), consistency = %store.consistency(), "store ready");
    Ok(store)
}
