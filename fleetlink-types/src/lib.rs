//! Core type definitions for FleetLink.
//!
//! This crate defines the data model shared by the offline sync layer:
//! - Realtime channel state
//! - Cached entities readable while offline
//! - Queued mutations awaiting replay
//! - Notifications and the realtime message envelope
//!
//! Everything here is plain data. Persistence lives in `fleetlink-store`,
//! I/O and coordination in `fleetlink-sync`.

mod connection;
mod entity;
mod ids;
mod mutation;
mod notification;

pub use connection::ConnectionState;
pub use entity::{CachedEntity, SyncStatus};
pub use ids::SessionId;
pub use mutation::{MutationRequest, QueuedMutation};
pub use notification::{NotificationEvent, NotificationPage, RealtimeMessage};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid sync status: {0}")]
    InvalidSyncStatus(String),
}
