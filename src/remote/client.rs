use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use super::api_types::{
  ApiAck, ApiBulkRequest, ApiEnvelope, ApiPutRequest, ApiRecord, ApiRecordMap,
};
use super::traits::RemoteStore;

/// Collection resource holding every key.
const DATA_PATH: &str = "data";
/// Bulk write resource, under the collection.
const BULK_PATH: &str = "bulk";

/// HTTP client for the data API.
///
/// The bearer credential is handed in by whoever owns the session; the client
/// only attaches it to each request. Clones share the credential, so
/// [`RemoteClient::set_token`] reaches every copy.
#[derive(Clone)]
pub struct RemoteClient {
  http: reqwest::Client,
  base: Url,
  token: Arc<RwLock<Option<String>>>,
}

impl RemoteClient {
  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API URL '{}': {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("API URL cannot be used as a base: {}", base_url));
    }

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      token: Arc::new(RwLock::new(token)),
    })
  }

  /// Replace the bearer credential, e.g. after a login or logout.
  pub fn set_token(&self, token: Option<String>) {
    match self.token.write() {
      Ok(mut current) => *current = token,
      Err(poisoned) => *poisoned.into_inner() = token,
    }
  }

  fn current_token(&self) -> Option<String> {
    match self.token.read() {
      Ok(token) => token.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// The API base URL.
  pub fn base_url(&self) -> &Url {
    &self.base
  }

  fn key_url(&self, remote_name: &str) -> Url {
    endpoint_url(&self.base, &[DATA_PATH, remote_name])
  }

  async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, String)> {
    let request = match self.current_token() {
      Some(token) => request.bearer_auth(token),
      None => request,
    };

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response body: {}", e))?;

    Ok((status, body))
  }
}

#[async_trait]
impl RemoteStore for RemoteClient {
  async fn fetch_one(&self, remote_name: &str) -> Result<Option<Value>> {
    let (status, body) = self.send(self.http.get(self.key_url(remote_name))).await?;
    decode_fetch_one(status, &body).map_err(|e| eyre!("Failed to fetch {}: {}", remote_name, e))
  }

  async fn fetch_all(&self) -> Result<BTreeMap<String, Value>> {
    let url = endpoint_url(&self.base, &[DATA_PATH]);
    let (status, body) = self.send(self.http.get(url)).await?;
    decode_fetch_all(status, &body).map_err(|e| eyre!("Failed to fetch all data: {}", e))
  }

  async fn put_one(&self, remote_name: &str, value: &Value) -> Result<()> {
    let request = self
      .http
      .post(self.key_url(remote_name))
      .json(&ApiPutRequest { data: value });
    let (status, body) = self.send(request).await?;
    decode_ack(status, &body).map_err(|e| eyre!("Failed to save {}: {}", remote_name, e))
  }

  async fn put_many(&self, items: &[(String, Value)]) -> Result<()> {
    let url = endpoint_url(&self.base, &[DATA_PATH, BULK_PATH]);
    let request = self.http.post(url).json(&ApiBulkRequest::new(items));
    let (status, body) = self.send(request).await?;
    decode_ack(status, &body)
      .map_err(|e| eyre!("Failed to bulk save {} items: {}", items.len(), e))
  }

  async fn delete_one(&self, remote_name: &str) -> Result<()> {
    let (status, body) = self
      .send(self.http.delete(self.key_url(remote_name)))
      .await?;
    decode_ack(status, &body).map_err(|e| eyre!("Failed to delete {}: {}", remote_name, e))
  }
}

/// Append path segments to the base URL. Segments are percent-encoded.
fn endpoint_url(base: &Url, segments: &[&str]) -> Url {
  let mut url = base.clone();
  if let Ok(mut path) = url.path_segments_mut() {
    path.pop_if_empty().extend(segments);
  }
  url
}

/// Parse a successful envelope, rejecting error statuses and `success: false`.
fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<ApiEnvelope<T>> {
  if !status.is_success() {
    return Err(eyre!("server returned {}", status));
  }

  let envelope: ApiEnvelope<T> =
    serde_json::from_str(body).map_err(|e| eyre!("malformed response: {}", e))?;

  if !envelope.success {
    return Err(eyre!("request rejected: {}", envelope.failure_reason()));
  }

  Ok(envelope)
}

fn decode_fetch_one(status: StatusCode, body: &str) -> Result<Option<Value>> {
  if status == StatusCode::NOT_FOUND {
    return Ok(None);
  }

  let envelope: ApiEnvelope<ApiRecord> = decode_envelope(status, body)?;
  Ok(envelope.data.and_then(|record| record.data))
}

fn decode_fetch_all(status: StatusCode, body: &str) -> Result<BTreeMap<String, Value>> {
  let envelope: ApiEnvelope<ApiRecordMap> = decode_envelope(status, body)?;
  let records = envelope.data.map(|records| records.data).unwrap_or_default();
  // A null entry is a key the server has not created yet
  Ok(
    records
      .into_iter()
      .filter(|(_, value)| !value.is_null())
      .collect(),
  )
}

fn decode_ack(status: StatusCode, body: &str) -> Result<()> {
  // Some endpoints answer 204 with no body
  if status.is_success() && body.trim().is_empty() {
    return Ok(());
  }

  let _: ApiAck = decode_envelope(status, body)?;
  Ok(())
}
