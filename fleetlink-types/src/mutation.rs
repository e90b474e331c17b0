//! Mutations captured while offline.
//!
//! The queue stores opaque HTTP-shaped requests. It never interprets the
//! url, method or body, so any mutation type the dashboard issues can be
//! held durably and replayed later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write the dashboard wants applied to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    /// Path relative to the API base, e.g. `/work-orders/1`.
    pub url: String,
    /// HTTP method, upper-case.
    pub method: String,
    /// JSON body sent as-is on replay.
    #[serde(default)]
    pub body: Value,
    /// Cached entity this write belongs to, if any. Only used to move the
    /// entity's sync status after replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl MutationRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_ascii_uppercase(),
            body,
            entity_id: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new("POST", url, body)
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new("PUT", url, body)
    }

    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self::new("PATCH", url, body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url, Value::Null)
    }

    /// Tags the request with the cached entity it modifies.
    pub fn for_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }
}

/// A mutation persisted in the durable queue.
///
/// `sequence_id` is assigned by the store, strictly increasing in
/// insertion order, and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    pub sequence_id: i64,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMutation {
    /// The request this queue entry replays.
    #[must_use]
    pub fn request(&self) -> MutationRequest {
        MutationRequest {
            url: self.url.clone(),
            method: self.method.clone(),
            body: self.body.clone(),
            entity_id: self.entity_id.clone(),
        }
    }

    /// Short `METHOD url` label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}
