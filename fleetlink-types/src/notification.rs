//! Notifications and the realtime push envelope.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-facing notification. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "isRead")]
    pub is_read: bool,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: String::new(),
            category: String::new(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// One page of the pull-based notification query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPage {
    #[serde(default)]
    pub items: Vec<NotificationEvent>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

/// A message pushed over the realtime channel.
///
/// The set of variants is closed: any `type` this client does not know is
/// decoded as [`RealtimeMessage::Unknown`] and discarded by consumers rather
/// than half-processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeMessage {
    #[serde(rename = "notification.new")]
    NotificationNew { notification: NotificationEvent },

    #[serde(rename = "notification.read")]
    NotificationRead {
        #[serde(default, alias = "notification_id")]
        id: Option<String>,
    },

    #[serde(rename = "notification.deleted")]
    NotificationDeleted {
        #[serde(default, alias = "notification_id")]
        id: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

impl RealtimeMessage {
    /// Parses a raw text frame.
    ///
    /// Fails on malformed JSON, a missing `type`, or a known type whose
    /// payload does not match.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The wire discriminator, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotificationNew { .. } => "notification.new",
            Self::NotificationRead { .. } => "notification.read",
            Self::NotificationDeleted { .. } => "notification.deleted",
            Self::Unknown => "unknown",
        }
    }
}
