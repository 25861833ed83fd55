//! Versioned response cache for offline support.
//!
//! This module provides the worker's Cache Storage:
//! - Named caches of request -> response entries, persisted in SQLite
//! - Cache-first lookups with network fallback and write-through
//! - Whole-cache deletion, used to drop previous versions

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheInfo, CacheStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource};
