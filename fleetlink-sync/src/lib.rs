//! Client resilience layer for the FleetLink dashboard.
//!
//! Keeps the dashboard usable across network interruptions and reconciles
//! server push with server pull.
//!
//! # Components
//!
//! - **Connection**: one realtime channel per session, exponential-backoff
//!   reconnects, ordered fan-out to weakly held subscribers
//! - **Coordinator**: replays the durable mutation queue in FIFO order when
//!   connectivity returns, then clears it
//! - **Merger**: merges pushed notifications with the paginated pull query,
//!   deduplicated by id with pushed copies winning
//! - **Offline**: sends mutations directly or captures them in the queue
//! - **Session**: the per-session context object that owns all of the above
//!
//! # Data flow
//!
//! 1. An offline mutation is cached as `pending` and queued
//! 2. The connectivity monitor reports `Online`
//! 3. The coordinator replays the queue one item at a time, then clears it
//! 4. Realtime pushes fan out to the notification feed, which marks the
//!    pulled page stale and refetches it in the background
//!
//! # Example
//!
//! ```no_run
//! use fleetlink_sync::{Session, SessionAuth, SessionConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> fleetlink_sync::SyncResult<()> {
//! let session = Session::builder(SessionConfig::default())
//!     .auth(Arc::new(SessionAuth::with_token("token")))
//!     .build()?;
//! session.start();
//! // ...
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
mod backoff;
pub mod channel;
pub mod connection;
pub mod connectivity;
pub mod coordinator;
mod error;
pub mod merger;
pub mod notice;
pub mod offline;
pub mod session;

pub use auth::{AuthProvider, SessionAuth, StaticAuth};
pub use backend::{BackendApi, BackendConfig, HttpBackend};
pub use backoff::Backoff;
pub use channel::{ChannelConnector, ChannelEvent, RealtimeChannel, WsConnector};
pub use connection::{
    ConnectionConfig, ConnectionManager, InboundMessage, SubscriberError, Subscription,
};
pub use connectivity::{spawn_health_probe, ConnectivityMonitor, ConnectivitySignal};
pub use coordinator::{FailedMutation, SweepOutcome, SweepReport, SyncConfig, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use merger::{merge_notifications, FeedConfig, FeedSnapshot, NotificationFeed};
pub use notice::{LogNotifier, Notice, NoticeLevel, Notifier};
pub use offline::{MutationGateway, SubmitOutcome};
pub use session::{Session, SessionBuilder, SessionConfig};

pub use fleetlink_types::ConnectionState;
