//! Result types for sync operations.

use serde::Serialize;

/// Outcome of a write through the sync layer.
///
/// The local commit always happens before the remote write is attempted, so
/// `local_committed` is true for every outcome the layer produces. A `false`
/// `remote_committed` means the value only lives in the local cache for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
  pub local_committed: bool,
  pub remote_committed: bool,
}

impl SaveOutcome {
  /// Committed locally, and remotely if `remote_committed`.
  pub fn local_then(remote_committed: bool) -> Self {
    Self {
      local_committed: true,
      remote_committed,
    }
  }

  /// Whether the remote store confirmed the write.
  pub fn is_synced(&self) -> bool {
    self.remote_committed
  }
}
