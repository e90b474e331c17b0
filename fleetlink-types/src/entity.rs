//! Entities cached locally so offline views can be hydrated.

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a cached entity stands relative to the backend.
///
/// `Synced` -> `Pending` on a local offline edit, then `Pending` -> `Synced`
/// or `Pending` -> `Error` once a replay sweep has attempted the edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "error" => Ok(Self::Error),
            other => Err(Error::InvalidSyncStatus(other.to_string())),
        }
    }
}

/// An offline-readable record, e.g. a work order.
///
/// Writes are full replacements keyed by `id`; there is no field-level merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntity {
    pub id: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl CachedEntity {
    /// Creates a synced entity stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        status: impl Into<String>,
        priority: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: status.into(),
            priority: priority.into(),
            updated_at: Utc::now(),
            sync_status: SyncStatus::Synced,
        }
    }

    /// Records a local edit that has not reached the backend yet.
    pub fn mark_pending(&mut self) {
        self.sync_status = SyncStatus::Pending;
        self.updated_at = Utc::now();
    }

    pub fn mark_synced(&mut self) {
        self.sync_status = SyncStatus::Synced;
    }

    pub fn mark_failed(&mut self) {
        self.sync_status = SyncStatus::Error;
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }
}
