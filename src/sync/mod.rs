//! Sync orchestrator: local-first reads and writes over a cache and a remote store.
//!
//! Reads go to the remote store first and fall back to the local cache.
//! Writes commit to the local cache first, then try the remote store. The
//! local cache is allowed to run ahead of the remote while it is unreachable.

mod layer;
mod types;

pub use layer::SyncLayer;
pub use types::SaveOutcome;
