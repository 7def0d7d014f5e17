//! In-process local cache with an operation log.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::traits::LocalCache;

/// One call made against a [`MemoryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
  Read(String),
  Write(String),
  Remove(String),
}

#[derive(Default)]
struct Inner {
  slots: BTreeMap<String, String>,
  ops: Vec<CacheOp>,
}

/// Local cache held in memory.
///
/// Values are stored as serialized text, the same as the persistent cache, so
/// malformed slots can be seeded with [`MemoryCache::insert_raw`].
#[derive(Default)]
pub struct MemoryCache {
  inner: Mutex<Inner>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a slot with raw text. Not recorded in the operation log.
  pub fn insert_raw(&self, name: &str, data: &str) {
    if let Ok(mut inner) = self.inner.lock() {
      inner.slots.insert(name.to_string(), data.to_string());
    }
  }

  /// Raw text of a slot. Not recorded in the operation log.
  pub fn get_raw(&self, name: &str) -> Option<String> {
    self
      .inner
      .lock()
      .ok()
      .and_then(|inner| inner.slots.get(name).cloned())
  }

  /// Calls made so far, oldest first.
  pub fn ops(&self) -> Vec<CacheOp> {
    self
      .inner
      .lock()
      .map(|inner| inner.ops.clone())
      .unwrap_or_default()
  }

  /// Forget the operation log, keeping the slots.
  pub fn clear_ops(&self) {
    if let Ok(mut inner) = self.inner.lock() {
      inner.ops.clear();
    }
  }
}

impl LocalCache for MemoryCache {
  fn read(&self, name: &str) -> Option<Value> {
    let mut inner = self.inner.lock().ok()?;
    inner.ops.push(CacheOp::Read(name.to_string()));
    let raw = inner.slots.get(name)?;
    serde_json::from_str(raw).ok()
  }

  fn write(&self, name: &str, value: &Value) {
    if let Ok(mut inner) = self.inner.lock() {
      inner.ops.push(CacheOp::Write(name.to_string()));
      inner.slots.insert(name.to_string(), value.to_string());
    }
  }

  fn remove(&self, name: &str) {
    if let Ok(mut inner) = self.inner.lock() {
      inner.ops.push(CacheOp::Remove(name.to_string()));
      inner.slots.remove(name);
    }
  }

  fn names(&self) -> Vec<String> {
    self
      .inner
      .lock()
      .map(|inner| inner.slots.keys().cloned().collect())
      .unwrap_or_default()
  }
}
