//! Serde types matching the data API's request and response bodies.
//!
//! Every response is wrapped in an envelope with a `success` flag. Reads nest
//! the payload one level deeper: `{ success, data: { data: <payload> } }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Responses
// ============================================================================

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  #[serde(default)]
  pub success: bool,
  pub data: Option<T>,
  pub error: Option<String>,
  pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
  /// Human-readable reason for a failed envelope.
  pub fn failure_reason(&self) -> &str {
    self
      .error
      .as_deref()
      .or(self.message.as_deref())
      .unwrap_or("no reason given")
  }
}

/// Inner wrapper of a single-key read. `null` means no value is stored.
#[derive(Debug, Deserialize)]
pub struct ApiRecord {
  #[serde(default)]
  pub data: Option<Value>,
}

/// Inner wrapper of the list-all read.
#[derive(Debug, Deserialize)]
pub struct ApiRecordMap {
  #[serde(default)]
  pub data: BTreeMap<String, Value>,
}

/// Envelope of write and delete endpoints, payload ignored.
pub type ApiAck = ApiEnvelope<serde::de::IgnoredAny>;

// ============================================================================
// Requests
// ============================================================================

/// Body of a single-key write.
#[derive(Debug, Serialize)]
pub struct ApiPutRequest<'a> {
  pub data: &'a Value,
}

/// Body of a bulk write.
#[derive(Debug, Serialize)]
pub struct ApiBulkRequest<'a> {
  pub items: Vec<ApiBulkItem<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ApiBulkItem<'a> {
  pub key: &'a str,
  pub data: &'a Value,
}

impl<'a> ApiBulkRequest<'a> {
  pub fn new(items: &'a [(String, Value)]) -> Self {
    Self {
      items: items
        .iter()
        .map(|(key, data)| ApiBulkItem { key, data })
        .collect(),
    }
  }
}
