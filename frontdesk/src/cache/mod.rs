//! Local cache (redb)

pub mod storage;

pub use storage::{
    CACHE_SCHEMA_VERSION, CacheError, CacheLoad, CacheResult, LocalCache, decode_snapshot,
};
