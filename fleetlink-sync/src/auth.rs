//! Session auth context consumed by the realtime channel and the backend client.

use std::sync::{PoisonError, RwLock};

/// Supplies the current auth token. Token issuance and role checks live
/// outside this crate; here we only need to know whether a session exists.
pub trait AuthProvider: Send + Sync {
    /// The bearer token for the current session, if authenticated.
    fn token(&self) -> Option<String>;

    /// Whether an authenticated session is present.
    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Mutable token holder updated on login, refresh and logout.
#[derive(Debug, Default)]
pub struct SessionAuth {
    token: RwLock<Option<String>>,
}

impl SessionAuth {
    /// A session with no token yet.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthProvider for SessionAuth {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.is_empty())
    }
}

/// A fixed token, e.g. one passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticAuth(Option<String>);

impl StaticAuth {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()))
    }
}

impl AuthProvider for StaticAuth {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}
