//! 持久化层：键值存储抽象与 Identity Store

pub mod identity;
pub mod kv;

pub use identity::{parse_alarm_map, IdentityStore, ALARM_MAP_STORAGE_KEY};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StoreError};
