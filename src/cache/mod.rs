//! Local cache adapter: best-effort synchronous key-value persistence.
//!
//! The cache is never the source of truth. Reads of missing or malformed slots
//! come back as `None`, and storage failures are logged and swallowed so that
//! callers never see an error from this layer.

mod memory;
mod storage;
mod traits;

pub use memory::{CacheOp, MemoryCache};
pub use storage::{SlotInfo, SqliteCache};
pub use traits::LocalCache;
