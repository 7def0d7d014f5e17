//! The local cache contract.

use serde_json::Value;

/// Synchronous key-value storage for serialized data records.
///
/// Implementations must not surface failures: an unreadable slot reads as
/// `None`, and a failed write or remove is a no-op from the caller's side.
pub trait LocalCache: Send + Sync {
  /// Read and deserialize the slot, `None` if missing or malformed.
  fn read(&self, name: &str) -> Option<Value>;

  /// Serialize and overwrite the slot.
  fn write(&self, name: &str, value: &Value);

  /// Remove the slot if present.
  fn remove(&self, name: &str);

  /// Names of every slot currently held.
  fn names(&self) -> Vec<String>;
}

impl<C: LocalCache + ?Sized> LocalCache for std::sync::Arc<C> {
  fn read(&self, name: &str) -> Option<Value> {
    (**self).read(name)
  }

  fn write(&self, name: &str, value: &Value) {
    (**self).write(name, value)
  }

  fn remove(&self, name: &str) {
    (**self).remove(name)
  }

  fn names(&self) -> Vec<String> {
    (**self).names()
  }
}
