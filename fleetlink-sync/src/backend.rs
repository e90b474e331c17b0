//! HTTP client for the dashboard backend.
//!
//! Covers the three calls this layer makes: replaying a queued mutation,
//! the paginated notification query, and a cheap health check used as the
//! connectivity probe.

use crate::auth::AuthProvider;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use fleetlink_types::{MutationRequest, NotificationPage, QueuedMutation};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backend HTTP configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// API root, e.g. `https://fleet.example.com/api/v1`.
    pub base_url: String,
    /// Per-request deadline (ms).
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Backend operations used by the sync layer.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Replays one queued mutation verbatim.
    async fn replay(&self, mutation: &QueuedMutation) -> SyncResult<()> {
        self.execute(&mutation.request()).await
    }

    /// Sends a mutation request. Any 2xx counts as success.
    async fn execute(&self, request: &MutationRequest) -> SyncResult<()>;

    /// Fetches one page of notifications.
    async fn fetch_notifications(&self, page: u32, page_size: u32)
        -> SyncResult<NotificationPage>;

    /// Cheap reachability check.
    async fn ping(&self) -> SyncResult<()>;
}

/// [`BackendApi`] over `reqwest`.
pub struct HttpBackend {
    config: BackendConfig,
    base: Url,
    client: Client,
    auth: Arc<dyn AuthProvider>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig, auth: Arc<dyn AuthProvider>) -> SyncResult<Self> {
        let base = parse_base(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            base,
            client,
            auth,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Resolves a mutation URL. Absolute URLs pass through; anything else
    /// is taken relative to the API root.
    fn resolve(&self, url: &str) -> SyncResult<Url> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }
        self.base
            .join(url.trim_start_matches('/'))
            .map_err(|e| SyncError::Config(format!("invalid request url '{url}': {e}")))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn execute(&self, request: &MutationRequest) -> SyncResult<()> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| SyncError::Protocol(format!("invalid HTTP method '{}'", request.method)))?;
        let url = self.resolve(&request.url)?;
        debug!("{} {}", method, url.path());

        let mut builder = self.request(method, url);
        if !request.body.is_null() {
            builder = builder.json(&request.body);
        }
        let response = builder.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_notifications(
        &self,
        page: u32,
        page_size: u32,
    ) -> SyncResult<NotificationPage> {
        let mut url = self.resolve("notifications")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());

        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check(response).await?;
        let value: Value = response.json().await?;
        parse_notification_page(value, page, page_size)
    }

    async fn ping(&self) -> SyncResult<()> {
        let url = self.resolve("health")?;
        let response = self.request(Method::GET, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Accepts either a page envelope or a bare array of notifications.
fn parse_notification_page(value: Value, page: u32, page_size: u32) -> SyncResult<NotificationPage> {
    if value.is_array() {
        let items: Vec<_> = serde_json::from_value(value)?;
        return Ok(NotificationPage {
            total: items.len() as u64,
            items,
            page,
            page_size,
        });
    }
    let mut parsed: NotificationPage = serde_json::from_value(value)?;
    if parsed.page == 0 {
        parsed.page = page;
    }
    if parsed.page_size == 0 {
        parsed.page_size = page_size;
    }
    Ok(parsed)
}

fn parse_base(raw: &str) -> SyncResult<Url> {
    let mut base = Url::parse(raw.trim())
        .map_err(|e| SyncError::Config(format!("invalid base_url '{raw}': {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// In-memory backend for tests.
pub mod mock {
    use super::*;
    use fleetlink_types::NotificationEvent;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every call; failures are scripted per call kind.
    #[derive(Default)]
    pub struct MockBackend {
        executed: Mutex<Vec<MutationRequest>>,
        execute_failures: Mutex<VecDeque<Option<SyncError>>>,
        hang_execute: AtomicBool,
        notifications: Mutex<Vec<NotificationEvent>>,
        fetch_failures: Mutex<VecDeque<SyncError>>,
        fetch_count: Mutex<u32>,
        offline: AtomicBool,
    }

    impl MockBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Requests executed so far, in order.
        pub fn executed(&self) -> Vec<MutationRequest> {
            self.executed.lock().unwrap().clone()
        }

        /// Scripts the outcome of upcoming `execute` calls in order:
        /// `None` succeeds, `Some(err)` fails.
        pub fn script_execute(&self, outcomes: impl IntoIterator<Item = Option<SyncError>>) {
            self.execute_failures.lock().unwrap().extend(outcomes);
        }

        /// Makes the next `execute` call fail.
        pub fn fail_next_execute(&self, err: SyncError) {
            self.execute_failures.lock().unwrap().push_back(Some(err));
        }

        /// Makes every `execute` call hang.
        pub fn hang_execute(&self, hang: bool) {
            self.hang_execute.store(hang, Ordering::SeqCst);
        }

        /// Replaces the notification list served by `fetch_notifications`.
        pub fn set_notifications(&self, items: Vec<NotificationEvent>) {
            *self.notifications.lock().unwrap() = items;
        }

        /// Makes the next `fetch_notifications` call fail.
        pub fn fail_next_fetch(&self, err: SyncError) {
            self.fetch_failures.lock().unwrap().push_back(err);
        }

        pub fn fetch_count(&self) -> u32 {
            *self.fetch_count.lock().unwrap()
        }

        /// Makes `ping` fail with a network error.
        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BackendApi for MockBackend {
        async fn execute(&self, request: &MutationRequest) -> SyncResult<()> {
            if self.hang_execute.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            self.executed.lock().unwrap().push(request.clone());
            match self.execute_failures.lock().unwrap().pop_front() {
                Some(Some(err)) => Err(err),
                _ => Ok(()),
            }
        }

        async fn fetch_notifications(
            &self,
            page: u32,
            page_size: u32,
        ) -> SyncResult<NotificationPage> {
            *self.fetch_count.lock().unwrap() += 1;
            if let Some(err) = self.fetch_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let all = self.notifications.lock().unwrap().clone();
            let start = (page.saturating_sub(1) * page_size) as usize;
            let items = all
                .iter()
                .skip(start)
                .take(page_size as usize)
                .cloned()
                .collect();
            Ok(NotificationPage {
                items,
                total: all.len() as u64,
                page,
                page_size,
            })
        }

        async fn ping(&self) -> SyncResult<()> {
            if self.offline.load(Ordering::SeqCst) {
                Err(SyncError::Network("backend unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }
}
