pub mod cache;
pub mod config;
pub mod embedded;
pub mod memory;
pub mod relational;

pub use cache::RedisStore;
pub use config::{connect, StoreConfig};
pub use embedded::RedbStore;
pub use memory::InMemoryStore;
pub use relational::MySqlStore;
pub use stubby_core::{ConsistencyLevel, StorageError, UrlMapping, UrlStore};
