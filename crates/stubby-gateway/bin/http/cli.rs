use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use stubby_storage::StoreConfig;

pub const LISTEN_ADDR_ENV: &str = "STUBBY_LISTEN_ADDR";
pub const PUBLIC_BASE_URL_ENV: &str = "STUBBY_PUBLIC_BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "STUBBY_STORAGE";
pub const REDB_PATH_ENV: &str = "STUBBY_REDB_PATH";
pub const REDIS_HOST_ENV: &str = "STUBBY_REDIS_HOST";
pub const REDIS_PORT_ENV: &str = "STUBBY_REDIS_PORT";
pub const REDIS_POOL_SIZE_ENV: &str = "STUBBY_REDIS_POOL_SIZE";
pub const MYSQL_HOST_ENV: &str = "STUBBY_MYSQL_HOST";
pub const MYSQL_PORT_ENV: &str = "STUBBY_MYSQL_PORT";
pub const MYSQL_USER_ENV: &str = "STUBBY_MYSQL_USER";
pub const MYSQL_PASSWORD_ENV: &str = "STUBBY_MYSQL_PASSWORD";
pub const MYSQL_DATABASE_ENV: &str = "STUBBY_MYSQL_DATABASE";
pub const MAX_ATTEMPTS_ENV: &str = "STUBBY_MAX_ATTEMPTS";
pub const OPERATION_TIMEOUT_MS_ENV: &str = "STUBBY_OPERATION_TIMEOUT_MS";
pub const SERIALIZE_CREATES_ENV: &str = "STUBBY_SERIALIZE_CREATES";
pub const SEED_ENV: &str = "STUBBY_SEED";
pub const LOG_FORMAT_ENV: &str = "STUBBY_LOG_FORMAT";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDB_PATH: &str = "./stubby.redb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "redb")]
    Redb,
    #[value(name = "redis")]
    Redis,
    #[value(name = "mysql")]
    Mysql,
    #[value(name = "memory")]
    Memory,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::Redb => write!(f, "redb"),
            StorageBackendArg::Redis => write!(f, "redis"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
            StorageBackendArg::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stubby", version, about = "URL shortener HTTP server")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Base of the short urls handed out. Defaults to `http://<listen_addr>`.
    #[arg(long, env = PUBLIC_BASE_URL_ENV)]
    pub public_base_url: Option<String>,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::Redb
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = REDB_PATH_ENV, default_value = DEFAULT_REDB_PATH)]
    pub redb_path: PathBuf,

    #[arg(long, env = REDIS_HOST_ENV, default_value = "localhost")]
    pub redis_host: String,

    #[arg(long, env = REDIS_PORT_ENV, default_value_t = 6379)]
    pub redis_port: u16,

    #[arg(long, env = REDIS_POOL_SIZE_ENV, default_value_t = 80)]
    pub redis_pool_size: usize,

    #[arg(long, env = MYSQL_HOST_ENV, default_value = "localhost")]
    pub mysql_host: String,

    #[arg(long, env = MYSQL_PORT_ENV, default_value_t = 3306)]
    pub mysql_port: u16,

    #[arg(long, env = MYSQL_USER_ENV, default_value = "stubby")]
    pub mysql_user: String,

    #[arg(long, env = MYSQL_PASSWORD_ENV, default_value = "", hide_env_values = true)]
    pub mysql_password: String,

    #[arg(long, env = MYSQL_DATABASE_ENV, default_value = "stubby")]
    pub mysql_database: String,

    /// Candidate codes tried per create request.
    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = 3)]
    pub max_attempts: u32,

    /// Deadline for each storage call, in milliseconds.
    #[arg(long, env = OPERATION_TIMEOUT_MS_ENV)]
    pub operation_timeout_ms: Option<u64>,

    /// Run concurrent creates for the same destination one at a time.
    #[arg(long, env = SERIALIZE_CREATES_ENV)]
    pub serialize_creates: bool,

    /// Fixed seed for the code generator.
    #[arg(long, env = SEED_ENV)]
    pub seed: Option<u64>,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl CLI {
    pub fn store_config(&self) -> StoreConfig {
        match self.storage {
            StorageBackendArg::Redb => StoreConfig::Redb {
                path: self.redb_path.clone(),
            },
            StorageBackendArg::Redis => StoreConfig::Redis {
                host: self.redis_host.clone(),
                port: self.redis_port,
                pool_size: self.redis_pool_size,
                key_prefix: stubby_storage::cache::DEFAULT_KEY_PREFIX.to_string(),
            },
            StorageBackendArg::Mysql => StoreConfig::MySql {
                host: self.mysql_host.clone(),
                port: self.mysql_port,
                username: self.mysql_user.clone(),
                password: self.mysql_password.clone(),
                database: self.mysql_database.clone(),
                max_connections: stubby_storage::relational::DEFAULT_MAX_CONNECTIONS,
            },
            StorageBackendArg::Memory => StoreConfig::Memory,
        }
    }

    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}
