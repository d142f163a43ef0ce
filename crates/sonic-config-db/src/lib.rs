//! CONFIG_DB store abstractions for SONiC configuration tools.
//!
//! - [`ConfigReader`] / [`ConfigStore`]: read and read-write capabilities
//!   over a table-oriented key/value store
//! - [`MemoryConfigStore`]: in-memory store with a mutation journal
//! - [`RedisConfigStore`]: CONFIG_DB over Redis (feature `redis`)
//! - [`ConfigRow`], [`RowRef`], [`FieldValues`]: row types
//!
//! # Example
//!
//! ```ignore
//! use sonic_config_db::{ConfigStore, RedisConfig, RedisConfigStore, CONFIG_DB_ID};
//!
//! let store = RedisConfigStore::connect(RedisConfig::new("127.0.0.1", 6379, CONFIG_DB_ID)).await?;
//! store.set_field("PORT", "Ethernet0", "admin_status", "down").await?;
//! ```

pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod row;
pub mod store;

pub use error::{ConfigDbError, ConfigDbResult};
pub use memory::{MemoryConfigStore, StoreOp};
#[cfg(feature = "redis")]
pub use redis_backend::{RedisConfig, RedisConfigStore};
pub use row::{
    base_field_name, key_parts, split_list, ConfigRow, FieldValue, FieldValues,
    FieldValuesExt, RowRef, CONFIG_DB_ID, KEY_SEPARATOR, LIST_FIELD_SUFFIX,
};
pub use store::{ConfigReader, ConfigStore};
