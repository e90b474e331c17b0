use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the realtime channel.
///
/// Transitions are driven only by the channel's own lifecycle events
/// (open, error, close). `Error` and `Disconnected` are both non-operational
/// but stay distinct so the UI can tell a failed socket from a closed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Whether messages can currently flow over the channel.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
