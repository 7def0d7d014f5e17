//! The sync layer that every feature module reads and writes through.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::SaveOutcome;
use crate::cache::LocalCache;
use crate::keys::DataKey;
use crate::remote::RemoteStore;

/// Local-first sync layer over a local cache and a remote store.
///
/// Nothing here returns an error for storage or network trouble: reads fall
/// back to the cache and then to the caller's default, writes report whether
/// the remote store accepted them.
///
/// There is no locking. Two concurrent saves of the same key race twice: the
/// last local write wins the cache and, independently, the last remote
/// response wins the server. The two winners can differ.
pub struct SyncLayer<L: LocalCache, R: RemoteStore> {
  local: Arc<L>,
  remote: Arc<R>,
}

impl<L: LocalCache, R: RemoteStore> SyncLayer<L, R> {
  pub fn new(local: L, remote: R) -> Self {
    Self {
      local: Arc::new(local),
      remote: Arc::new(remote),
    }
  }

  /// The local cache this layer writes through.
  pub fn local(&self) -> &L {
    &self.local
  }

  /// The remote store this layer talks to.
  pub fn remote(&self) -> &R {
    &self.remote
  }

  /// Read a value: remote first, then local cache, then `default`.
  ///
  /// A remote value is written through to the local cache before it is
  /// returned. Once the read has fallen back to the cache there is no telling
  /// whether the server had no value or could not be reached.
  pub async fn get_data(&self, key: impl Into<DataKey>, default: Value) -> Value {
    self.lookup(&key.into()).await.unwrap_or(default)
  }

  /// Like [`SyncLayer::get_data`], converting into `T`.
  ///
  /// A stored value that does not fit `T` yields `default`.
  pub async fn get_typed<T: DeserializeOwned>(&self, key: impl Into<DataKey>, default: T) -> T {
    let key = key.into();
    match self.lookup(&key).await {
      Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
        debug!(key = %key, error = %e, "stored value has the wrong shape, using default");
        default
      }),
      None => default,
    }
  }

  async fn lookup(&self, key: &DataKey) -> Option<Value> {
    match self.remote.fetch_one(key.remote_name()).await {
      Ok(Some(value)) if !value.is_null() => {
        self.local.write(&key.local_name(), &value);
        return Some(value);
      }
      Ok(_) => debug!(key = %key, "no remote value, reading local cache"),
      Err(e) => warn!(key = %key, error = %e, "remote fetch failed, reading local cache"),
    }

    self.local.read(&key.local_name())
  }

  /// Write a value locally, then to the remote store.
  ///
  /// The local write always completes before the remote write starts and is
  /// never rolled back.
  pub async fn save_data(&self, key: impl Into<DataKey>, value: Value) -> SaveOutcome {
    let key = key.into();
    self.local.write(&key.local_name(), &value);

    match self.remote.put_one(key.remote_name(), &value).await {
      Ok(()) => SaveOutcome::local_then(true),
      Err(e) => {
        warn!(key = %key, error = %e, "remote save failed, value kept locally");
        SaveOutcome::local_then(false)
      }
    }
  }

  /// Like [`SyncLayer::save_data`], converting from `T`.
  ///
  /// Fails only when `value` cannot be represented as JSON, in which case
  /// nothing is written.
  pub async fn save_typed<T: Serialize>(
    &self,
    key: impl Into<DataKey>,
    value: &T,
  ) -> Result<SaveOutcome> {
    let key = key.into();
    let value = serde_json::to_value(value)
      .map_err(|e| eyre!("Failed to serialize value for {}: {}", key, e))?;
    Ok(self.save_data(key, value).await)
  }

  /// Read every value the remote store holds, refreshing the local cache.
  ///
  /// A `null` remote entry counts as not created, the same as for
  /// [`SyncLayer::get_data`], and leaves the local slot alone.
  ///
  /// When the remote store is unreachable, returns whatever the local cache
  /// holds. Keys missing on both sides are left out of the map.
  pub async fn get_all_data(&self) -> BTreeMap<DataKey, Value> {
    match self.remote.fetch_all().await {
      Ok(records) => records
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
          let key = DataKey::from_remote_name(&name);
          self.local.write(&key.local_name(), &value);
          (key, value)
        })
        .collect(),
      Err(e) => {
        warn!(error = %e, "remote fetch-all failed, reading local cache");
        self.read_local_entries().into_iter().collect()
      }
    }
  }

  /// Write a batch locally, then to the remote store in one request.
  ///
  /// The outcome covers the whole batch. An empty batch makes no request.
  pub async fn bulk_save<K, I>(&self, items: I) -> SaveOutcome
  where
    K: Into<DataKey>,
    I: IntoIterator<Item = (K, Value)>,
  {
    let items: Vec<(String, Value)> = items
      .into_iter()
      .map(|(key, value)| {
        let key = key.into();
        self.local.write(&key.local_name(), &value);
        (key.remote_name().to_string(), value)
      })
      .collect();

    if items.is_empty() {
      return SaveOutcome::local_then(true);
    }

    match self.remote.put_many(&items).await {
      Ok(()) => SaveOutcome::local_then(true),
      Err(e) => {
        warn!(count = items.len(), error = %e, "remote bulk save failed, values kept locally");
        SaveOutcome::local_then(false)
      }
    }
  }

  /// Push everything in the local cache up to the remote store.
  ///
  /// Covers every known key plus any ad-hoc key with a local slot. Keys
  /// without a local value are skipped. Never pulls remote values down.
  pub async fn sync_to_backend(&self) -> SaveOutcome {
    let items = self.read_local_entries();
    info!(count = items.len(), "pushing local data to remote");
    self.bulk_save(items).await
  }

  /// Remove a value locally, then from the remote store.
  ///
  /// Returns true only if the remote delete succeeded. The local slot is
  /// removed either way.
  pub async fn delete_data(&self, key: impl Into<DataKey>) -> bool {
    let key = key.into();
    self.local.remove(&key.local_name());

    match self.remote.delete_one(key.remote_name()).await {
      Ok(()) => true,
      Err(e) => {
        warn!(key = %key, error = %e, "remote delete failed");
        false
      }
    }
  }

  /// Every key worth looking at locally: the known ones and any ad-hoc key
  /// that has a slot.
  fn local_keys(&self) -> BTreeSet<DataKey> {
    DataKey::known()
      .chain(
        self
          .local
          .names()
          .into_iter()
          .filter_map(|name| DataKey::from_local_name(&name)),
      )
      .collect()
  }

  fn read_local_entries(&self) -> Vec<(DataKey, Value)> {
    self
      .local_keys()
      .into_iter()
      .filter_map(|key| {
        let value = self.local.read(&key.local_name())?;
        Some((key, value))
      })
      .collect()
  }
}

impl<L: LocalCache, R: RemoteStore> Clone for SyncLayer<L, R> {
  fn clone(&self) -> Self {
    Self {
      local: Arc::clone(&self.local),
      remote: Arc::clone(&self.remote),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheOp, MemoryCache};
  use crate::keys::KnownKey;
  use async_trait::async_trait;
  use serde::Deserialize;
  use serde_json::json;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// In-memory remote store that can be switched offline.
  #[derive(Default)]
  struct FakeRemote {
    records: Mutex<BTreeMap<String, Value>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    /// Cache to inspect at write time, for ordering checks
    watched: Option<Arc<MemoryCache>>,
    /// Whether the local slot already held the value when each put arrived
    seen_locally: Mutex<Vec<bool>>,
  }

  impl FakeRemote {
    fn watching(cache: Arc<MemoryCache>) -> Self {
      Self {
        watched: Some(cache),
        ..Self::default()
      }
    }

    fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    fn insert(&self, name: &str, value: Value) {
      self.records.lock().unwrap().insert(name.to_string(), value);
    }

    fn snapshot(&self) -> BTreeMap<String, Value> {
      self.records.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        Err(eyre!("connection refused"))
      } else {
        Ok(())
      }
    }
  }

  #[async_trait]
  impl RemoteStore for FakeRemote {
    async fn fetch_one(&self, remote_name: &str) -> Result<Option<Value>> {
      self.check()?;
      Ok(self.records.lock().unwrap().get(remote_name).cloned())
    }

    async fn fetch_all(&self) -> Result<BTreeMap<String, Value>> {
      self.check()?;
      Ok(self.snapshot())
    }

    async fn put_one(&self, remote_name: &str, value: &Value) -> Result<()> {
      if let Some(cache) = &self.watched {
        let local = DataKey::from_remote_name(remote_name).local_name();
        let seen = cache.get_raw(&local) == Some(value.to_string());
        self.seen_locally.lock().unwrap().push(seen);
      }
      self.check()?;
      self.insert(remote_name, value.clone());
      Ok(())
    }

    async fn put_many(&self, items: &[(String, Value)]) -> Result<()> {
      self.check()?;
      let mut records = self.records.lock().unwrap();
      for (name, value) in items {
        records.insert(name.clone(), value.clone());
      }
      Ok(())
    }

    async fn delete_one(&self, remote_name: &str) -> Result<()> {
      self.check()?;
      self.records.lock().unwrap().remove(remote_name);
      Ok(())
    }
  }

  fn setup() -> (SyncLayer<Arc<MemoryCache>, Arc<FakeRemote>>, Arc<MemoryCache>, Arc<FakeRemote>) {
    let cache = Arc::new(MemoryCache::new());
    let remote = Arc::new(FakeRemote::watching(Arc::clone(&cache)));
    let layer = SyncLayer::new(Arc::clone(&cache), Arc::clone(&remote));
    (layer, cache, remote)
  }

  #[tokio::test]
  async fn test_round_trip_online() {
    let (layer, _cache, _remote) = setup();

    let outcome = layer.save_data(KnownKey::Progress, json!({"chapters": 3})).await;
    assert!(outcome.local_committed);
    assert!(outcome.is_synced());

    let value = layer.get_data(KnownKey::Progress, json!(null)).await;
    assert_eq!(value, json!({"chapters": 3}));
  }

  #[tokio::test]
  async fn test_round_trip_offline() {
    let (layer, _cache, remote) = setup();
    remote.set_offline(true);

    let outcome = layer.save_data("timetable", json!([{"day": "mon"}])).await;
    assert!(outcome.local_committed);
    assert!(!outcome.remote_committed);

    let value = layer.get_data("timetable", json!([])).await;
    assert_eq!(value, json!([{"day": "mon"}]));
  }

  #[tokio::test]
  async fn test_default_when_nothing_stored() {
    let (layer, _cache, remote) = setup();
    assert_eq!(layer.get_data("favorites", json!(["x"])).await, json!(["x"]));

    remote.set_offline(true);
    assert_eq!(layer.get_data("favorites", json!(["x"])).await, json!(["x"]));
  }

  #[tokio::test]
  async fn test_read_through_refreshes_cache() {
    let (layer, cache, remote) = setup();
    remote.insert("study-streak", json!({"days": 12}));

    assert_eq!(layer.get_data("study-streak", json!(0)).await, json!({"days": 12}));
    // A remote hit writes through without reading the cache
    assert_eq!(
      cache.ops(),
      vec![CacheOp::Write("studysync_study-streak".into())]
    );

    remote.set_offline(true);
    assert_eq!(layer.get_data("study-streak", json!(0)).await, json!({"days": 12}));
  }

  #[tokio::test]
  async fn test_remote_absent_falls_back_to_cache() {
    let (layer, cache, _remote) = setup();
    cache.write("studysync_dashboard", &json!({"layout": "grid"}));
    cache.clear_ops();

    // The server has nothing, the cached value is still served
    assert_eq!(
      layer.get_data("dashboard", json!({})).await,
      json!({"layout": "grid"})
    );
    assert_eq!(cache.ops(), vec![CacheOp::Read("studysync_dashboard".into())]);
  }

  #[tokio::test]
  async fn test_malformed_cache_yields_default() {
    let (layer, cache, remote) = setup();
    remote.set_offline(true);
    cache.insert_raw("studysync_exam-session", "{\"started\":");

    assert_eq!(
      layer.get_data(KnownKey::ExamSession, json!("none")).await,
      json!("none")
    );
  }

  #[tokio::test]
  async fn test_local_write_precedes_remote_write() {
    let (layer, cache, remote) = setup();

    layer.save_data("preferences", json!({"theme": "light"})).await;
    remote.set_offline(true);
    layer.save_data("preferences", json!({"theme": "dark"})).await;

    assert_eq!(*remote.seen_locally.lock().unwrap(), vec![true, true]);
    assert_eq!(
      cache.ops(),
      vec![
        CacheOp::Write("studysync_preferences".into()),
        CacheOp::Write("studysync_preferences".into()),
      ]
    );
  }

  #[tokio::test]
  async fn test_preferences_scenario() {
    let (layer, cache, remote) = setup();

    let outcome = layer.save_data("preferences", json!({"theme": "dark"})).await;
    assert!(outcome.remote_committed);
    assert_eq!(
      cache.read("studysync_preferences"),
      Some(json!({"theme": "dark"}))
    );

    remote.set_offline(true);
    assert_eq!(
      layer.get_data("preferences", json!({})).await,
      json!({"theme": "dark"})
    );
  }

  #[tokio::test]
  async fn test_bulk_save_offline_keeps_local() {
    let (layer, cache, remote) = setup();
    remote.set_offline(true);

    let outcome = layer
      .bulk_save(vec![("a", json!(1)), ("b", json!(2))])
      .await;

    assert!(!outcome.remote_committed);
    assert_eq!(cache.read("studysync_a"), Some(json!(1)));
    assert_eq!(cache.read("studysync_b"), Some(json!(2)));
  }

  #[tokio::test]
  async fn test_bulk_save_online_is_one_request() {
    let (layer, _cache, remote) = setup();

    let outcome = layer
      .bulk_save(vec![("a", json!(1)), ("b", json!(2))])
      .await;

    assert!(outcome.is_synced());
    assert_eq!(remote.calls(), 1);
    assert_eq!(remote.snapshot()["b"], json!(2));
  }

  #[tokio::test]
  async fn test_empty_bulk_save_makes_no_request() {
    let (layer, _cache, remote) = setup();
    remote.set_offline(true);

    let outcome = layer.bulk_save(Vec::<(DataKey, Value)>::new()).await;
    assert!(outcome.is_synced());
    assert_eq!(remote.calls(), 0);
  }

  #[tokio::test]
  async fn test_sync_to_backend_pushes_local_entries() {
    let (layer, cache, remote) = setup();
    cache.write("studysync_progress", &json!({"done": 1}));
    cache.write("studysync_flashcards", &json!(["q1"]));
    cache.write("unrelated", &json!(true));
    remote.insert("favorites", json!(["remote only"]));

    let outcome = layer.sync_to_backend().await;
    assert!(outcome.is_synced());

    let records = remote.snapshot();
    assert_eq!(records["progress"], json!({"done": 1}));
    assert_eq!(records["flashcards"], json!(["q1"]));
    assert!(!records.contains_key("unrelated"));
    // Push only: the remote-only key is not pulled down
    assert_eq!(cache.read("studysync_favorites"), None);
  }

  #[tokio::test]
  async fn test_sync_to_backend_is_idempotent() {
    let (layer, cache, remote) = setup();
    cache.write("studysync_timetable", &json!({"mon": ["math"]}));
    cache.write("studysync_custom-subjects", &json!(["latin"]));

    assert!(layer.sync_to_backend().await.is_synced());
    let once = remote.snapshot();
    assert!(layer.sync_to_backend().await.is_synced());
    assert_eq!(remote.snapshot(), once);
  }

  #[tokio::test]
  async fn test_sync_to_backend_offline_reports_failure() {
    let (layer, cache, remote) = setup();
    cache.write("studysync_progress", &json!(1));
    remote.set_offline(true);

    assert!(!layer.sync_to_backend().await.is_synced());
    assert_eq!(cache.read("studysync_progress"), Some(json!(1)));
  }

  #[tokio::test]
  async fn test_delete_then_offline_read_returns_default() {
    let (layer, _cache, remote) = setup();
    layer.save_data("favorites", json!(["a"])).await;

    assert!(layer.delete_data("favorites").await);
    assert!(!remote.snapshot().contains_key("favorites"));

    remote.set_offline(true);
    assert_eq!(layer.get_data("favorites", json!([])).await, json!([]));
  }

  #[tokio::test]
  async fn test_delete_offline_still_removes_local() {
    let (layer, cache, remote) = setup();
    layer.save_data("favorites", json!(["a"])).await;
    remote.set_offline(true);

    assert!(!layer.delete_data("favorites").await);
    assert_eq!(cache.read("studysync_favorites"), None);
    assert_eq!(layer.get_data("favorites", json!([])).await, json!([]));
  }

  #[tokio::test]
  async fn test_get_all_online_refreshes_cache() {
    let (layer, cache, remote) = setup();
    remote.insert("progress", json!({"done": 2}));
    remote.insert("notes", json!(["n1"]));

    let all = layer.get_all_data().await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[&DataKey::Known(KnownKey::Progress)], json!({"done": 2}));
    assert_eq!(all[&DataKey::from("notes")], json!(["n1"]));
    assert_eq!(cache.read("studysync_notes"), Some(json!(["n1"])));
  }

  #[tokio::test]
  async fn test_get_all_null_entry_is_not_cached() {
    let (layer, cache, remote) = setup();
    remote.insert("progress", json!(null));
    remote.insert("favorites", json!(["f1"]));

    let all = layer.get_all_data().await;
    assert_eq!(all.len(), 1);
    assert!(!all.contains_key(&DataKey::Known(KnownKey::Progress)));
    assert_eq!(cache.get_raw("studysync_progress"), None);

    remote.set_offline(true);
    assert_eq!(
      layer.get_data("progress", json!({"fallback": true})).await,
      json!({"fallback": true})
    );
  }

  #[tokio::test]
  async fn test_get_all_offline_returns_partial_local_map() {
    let (layer, cache, remote) = setup();
    cache.write("studysync_preferences", &json!({"theme": "dark"}));
    cache.insert_raw("studysync_dashboard", "not json");
    remote.set_offline(true);

    let all = layer.get_all_data().await;
    assert_eq!(all.len(), 1);
    assert_eq!(
      all[&DataKey::Known(KnownKey::Preferences)],
      json!({"theme": "dark"})
    );
  }

  #[derive(Debug, PartialEq, Serialize, Deserialize)]
  struct Streak {
    days: u32,
  }

  #[tokio::test]
  async fn test_typed_helpers() {
    let (layer, _cache, remote) = setup();

    let outcome = layer
      .save_typed(KnownKey::StudyStreak, &Streak { days: 5 })
      .await
      .unwrap();
    assert!(outcome.is_synced());

    remote.set_offline(true);
    let streak = layer
      .get_typed(KnownKey::StudyStreak, Streak { days: 0 })
      .await;
    assert_eq!(streak, Streak { days: 5 });
  }

  #[tokio::test]
  async fn test_typed_wrong_shape_yields_default() {
    let (layer, _cache, remote) = setup();
    remote.insert("study-streak", json!("seven"));

    let streak = layer
      .get_typed(KnownKey::StudyStreak, Streak { days: 0 })
      .await;
    assert_eq!(streak, Streak { days: 0 });
  }

  #[tokio::test]
  async fn test_clones_share_state() {
    let (layer, _cache, remote) = setup();
    let other = layer.clone();
    remote.set_offline(true);

    layer.save_data("progress", json!(7)).await;
    assert_eq!(other.get_data("progress", json!(0)).await, json!(7));
  }
}
