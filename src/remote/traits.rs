//! The remote store contract.

use async_trait::async_trait;
use color_eyre::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// Asynchronous access to the remote key-value resource.
///
/// `Ok(None)` from [`RemoteStore::fetch_one`] means the server has no value
/// for the key. Every `Err` is a transport, authentication or server failure.
/// Implementations do not retry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
  /// Fetch one value by remote name.
  async fn fetch_one(&self, remote_name: &str) -> Result<Option<Value>>;

  /// Fetch every value held for the current user, keyed by remote name.
  async fn fetch_all(&self) -> Result<BTreeMap<String, Value>>;

  /// Store one value, overwriting whatever the server holds.
  async fn put_one(&self, remote_name: &str, value: &Value) -> Result<()>;

  /// Store a batch. Any failure counts for the whole batch.
  async fn put_many(&self, items: &[(String, Value)]) -> Result<()>;

  /// Delete one value.
  async fn delete_one(&self, remote_name: &str) -> Result<()>;
}

#[async_trait]
impl<R: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<R> {
  async fn fetch_one(&self, remote_name: &str) -> Result<Option<Value>> {
    (**self).fetch_one(remote_name).await
  }

  async fn fetch_all(&self) -> Result<BTreeMap<String, Value>> {
    (**self).fetch_all().await
  }

  async fn put_one(&self, remote_name: &str, value: &Value) -> Result<()> {
    (**self).put_one(remote_name, value).await
  }

  async fn put_many(&self, items: &[(String, Value)]) -> Result<()> {
    (**self).put_many(items).await
  }

  async fn delete_one(&self, remote_name: &str) -> Result<()> {
    (**self).delete_one(remote_name).await
  }
}
