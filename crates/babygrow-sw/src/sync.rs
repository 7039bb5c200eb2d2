//! Background sync of growth data recorded while offline.
//!
//! Pages queue form submissions they could not deliver (new growth records,
//! milestone toggles) in an [`OfflineStore`]. When the runtime fires the
//! growth-data sync tag, [`GrowthDataSync`] replays the queue in order.
//!
//! - 2xx, or a 3xx to anywhere but the login page: delivered, removed from
//!   the queue. BabyGrow answers a stored form with a redirect to the list
//!   it belongs to.
//! - 4xx: rejected by the server, removed from the queue and counted.
//! - Login redirect, 5xx or transport failure: stop; the rest stays queued
//!   and the error goes back to the runtime, which retries the whole sync
//!   later.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Method};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SwError;
use crate::net::Fetcher;
use crate::request::{Request, RequestMode, Response};

/// A submission queued while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: u64,
    pub method: String,
    /// Path (or absolute URL) the form posts to.
    pub path: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Queued at timestamp (ms since epoch).
    pub queued_at: u64,
}

/// Persisted queue of pending mutations, owned by the page side.
#[async_trait::async_trait]
pub trait OfflineStore: Send + Sync {
    /// Pending mutations, oldest first.
    async fn pending(&self) -> Result<Vec<PendingMutation>, SwError>;

    /// Remove a mutation once it no longer needs delivering.
    async fn acknowledge(&self, id: u64) -> Result<(), SwError>;
}

/// In-memory [`OfflineStore`].
#[derive(Debug, Default)]
pub struct MemoryOfflineStore {
    queue: RwLock<BTreeMap<u64, PendingMutation>>,
    next_id: AtomicU64,
}

impl MemoryOfflineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a submission. Returns its id.
    pub async fn enqueue(
        &self,
        method: &str,
        path: &str,
        content_type: Option<&str>,
        body: impl Into<Vec<u8>>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mutation = PendingMutation {
            id,
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            content_type: content_type.map(str::to_string),
            body: body.into(),
            queued_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        };
        self.queue.write().await.insert(id, mutation);
        id
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn pending(&self) -> Result<Vec<PendingMutation>, SwError> {
        Ok(self.queue.read().await.values().cloned().collect())
    }

    async fn acknowledge(&self, id: u64) -> Result<(), SwError> {
        self.queue.write().await.remove(&id);
        Ok(())
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Delivered successfully.
    pub replayed: usize,
    /// Rejected by the server and dropped.
    pub rejected: usize,
}

/// Path the server redirects to when the session has expired.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// How the server answered one replayed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Rejected,
    Retry(String),
}

/// Replays an [`OfflineStore`] against the server.
pub struct GrowthDataSync {
    store: Arc<dyn OfflineStore>,
    fetcher: Arc<dyn Fetcher>,
    scope: Url,
    login_path: String,
}

impl GrowthDataSync {
    pub fn new(store: Arc<dyn OfflineStore>, fetcher: Arc<dyn Fetcher>, scope: Url) -> Self {
        Self {
            store,
            fetcher,
            scope,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    /// Treat redirects to `path` as an expired session.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    fn is_login(&self, url: &Url) -> bool {
        url.path() == self.login_path
    }

    fn classify(&self, request: &Request, response: &Response) -> Delivery {
        let status = response.status;
        if status.is_redirection() {
            let target = response
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| request.url.join(location).ok());
            return match target {
                Some(target) if self.is_login(&target) => {
                    Delivery::Retry(format!("redirected to login ({status})"))
                }
                Some(_) => Delivery::Delivered,
                None => Delivery::Retry(format!("{status} without a usable Location")),
            };
        }
        if status.is_success() {
            if response.redirected_from(&request.url) && self.is_login(&response.url) {
                return Delivery::Retry("redirected to login".to_string());
            }
            return Delivery::Delivered;
        }
        if status.is_client_error() {
            return Delivery::Rejected;
        }
        Delivery::Retry(format!("server answered {status}"))
    }

    fn to_request(&self, mutation: &PendingMutation) -> Result<Request, SwError> {
        let url = self
            .scope
            .join(&mutation.path)
            .map_err(|e| SwError::Sync(format!("mutation {}: bad path: {e}", mutation.id)))?;
        let method = Method::from_bytes(mutation.method.as_bytes())
            .map_err(|e| SwError::Sync(format!("mutation {}: bad method: {e}", mutation.id)))?;

        let mut request = Request {
            method,
            body: Some(Bytes::from(mutation.body.clone())),
            mode: RequestMode::SameOrigin,
            ..Request::get(url)
        };
        if let Some(ref content_type) = mutation.content_type {
            let value = HeaderValue::from_str(content_type).map_err(|e| {
                SwError::Sync(format!("mutation {}: bad content type: {e}", mutation.id))
            })?;
            request.headers.insert(CONTENT_TYPE, value);
        }
        Ok(request)
    }

    /// Replay every pending mutation, oldest first.
    pub async fn run(&self) -> Result<SyncReport, SwError> {
        let pending = self.store.pending().await?;
        info!(pending = pending.len(), "Syncing offline growth data");

        let mut report = SyncReport::default();
        for mutation in pending {
            let request = match self.to_request(&mutation) {
                Ok(request) => request,
                Err(e) => {
                    warn!(id = mutation.id, error = %e, "Malformed mutation, dropping");
                    report.rejected += 1;
                    self.store.acknowledge(mutation.id).await?;
                    continue;
                }
            };
            let response = self.fetcher.fetch(&request).await.map_err(|e| {
                warn!(id = mutation.id, error = %e, "Growth data sync interrupted");
                SwError::Sync(format!("mutation {}: {e}", mutation.id))
            })?;

            match self.classify(&request, &response) {
                Delivery::Delivered => {
                    debug!(id = mutation.id, status = %response.status, "Mutation delivered");
                    report.replayed += 1;
                }
                Delivery::Rejected => {
                    warn!(id = mutation.id, status = %response.status, path = %mutation.path, "Mutation rejected, dropping");
                    report.rejected += 1;
                }
                Delivery::Retry(reason) => {
                    warn!(id = mutation.id, status = %response.status, reason = %reason, "Mutation not delivered, keeping queue");
                    return Err(SwError::Sync(format!("mutation {}: {reason}", mutation.id)));
                }
            }
            self.store.acknowledge(mutation.id).await?;
        }

        info!(replayed = report.replayed, rejected = report.rejected, "Growth data sync complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::Mutex;

    /// Answers with a scripted status per path; `None` means transport failure.
    struct ScriptedServer {
        statuses: Vec<(&'static str, Option<StatusCode>)>,
        locations: Vec<(&'static str, &'static str)>,
        seen: Mutex<Vec<(Method, String, Option<String>)>>,
    }

    impl ScriptedServer {
        fn new(statuses: Vec<(&'static str, Option<StatusCode>)>) -> Self {
            Self {
                statuses,
                locations: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Send a `Location` header with responses for `path`.
        fn redirecting(mut self, path: &'static str, location: &'static str) -> Self {
            self.locations.push((path, location));
            self
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for ScriptedServer {
        async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
            let content_type = request
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.seen.lock().unwrap().push((
                request.method.clone(),
                request.url.path().to_string(),
                content_type,
            ));
            let path = request.url.path();
            let status = self
                .statuses
                .iter()
                .find(|(p, _)| *p == path)
                .and_then(|(_, s)| *s);
            let Some(status) = status else {
                return Err(SwError::network("connection refused"));
            };
            let mut response = Response::new(request.url.clone(), status, "");
            if let Some((_, location)) = self.locations.iter().find(|(p, _)| *p == path) {
                response = response.header(LOCATION, HeaderValue::from_static(location));
            }
            Ok(response)
        }
    }

    fn scope() -> Url {
        Url::parse("http://127.0.0.1:5001/").unwrap()
    }

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");

    #[tokio::test]
    async fn test_replays_in_order_and_drains_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("post", "/children/1/growth/add", FORM, "weight=7.2").await;
        store.enqueue("POST", "/children/1/milestone/4/toggle", None, "").await;

        let server = Arc::new(
            ScriptedServer::new(vec![
                ("/children/1/growth/add", Some(StatusCode::FOUND)),
                ("/children/1/milestone/4/toggle", Some(StatusCode::OK)),
            ])
            .redirecting("/children/1/growth/add", "/children/1/growth"),
        );
        let sync = GrowthDataSync::new(store.clone(), server.clone(), scope());

        let report = sync.run().await.unwrap();
        assert_eq!(report, SyncReport { replayed: 2, rejected: 0 });
        assert!(store.is_empty().await);

        let seen = server.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, Method::POST);
        assert_eq!(seen[0].1, "/children/1/growth/add");
        assert_eq!(seen[0].2.as_deref(), FORM);
        assert_eq!(seen[1].1, "/children/1/milestone/4/toggle");
    }

    #[tokio::test]
    async fn test_client_error_is_dropped() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/9/growth/add", FORM, "weight=x").await;

        let server = Arc::new(ScriptedServer::new(vec![(
            "/children/9/growth/add",
            Some(StatusCode::NOT_FOUND),
        )]));
        let report = GrowthDataSync::new(store.clone(), server, scope())
            .run()
            .await
            .unwrap();

        assert_eq!(report, SyncReport { replayed: 0, rejected: 1 });
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_network_failure_keeps_remaining_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/1/growth/add", FORM, "a").await;
        store.enqueue("POST", "/children/2/growth/add", FORM, "b").await;
        store.enqueue("POST", "/children/3/growth/add", FORM, "c").await;

        let server = Arc::new(ScriptedServer::new(vec![
            ("/children/1/growth/add", Some(StatusCode::OK)),
            ("/children/2/growth/add", None),
            ("/children/3/growth/add", Some(StatusCode::OK)),
        ]));
        let result = GrowthDataSync::new(store.clone(), server.clone(), scope())
            .run()
            .await;

        assert!(matches!(result, Err(SwError::Sync(_))));
        assert_eq!(store.len().await, 2);
        assert_eq!(server.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_stops_sync() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/1/growth/add", FORM, "a").await;

        let server = Arc::new(ScriptedServer::new(vec![(
            "/children/1/growth/add",
            Some(StatusCode::INTERNAL_SERVER_ERROR),
        )]));
        let result = GrowthDataSync::new(store.clone(), server, scope()).run().await;

        assert!(matches!(result, Err(SwError::Sync(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_login_redirect_keeps_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/1/growth/add", FORM, "a").await;
        store.enqueue("POST", "/children/2/growth/add", FORM, "b").await;

        let server = Arc::new(
            ScriptedServer::new(vec![
                ("/children/1/growth/add", Some(StatusCode::FOUND)),
                ("/children/2/growth/add", Some(StatusCode::OK)),
            ])
            .redirecting("/children/1/growth/add", "/login"),
        );
        let result = GrowthDataSync::new(store.clone(), server.clone(), scope())
            .run()
            .await;

        assert!(matches!(result, Err(SwError::Sync(ref m)) if m.contains("login")));
        assert_eq!(store.len().await, 2);
        assert_eq!(server.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_without_location_keeps_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/1/growth/add", FORM, "a").await;

        let server = Arc::new(ScriptedServer::new(vec![(
            "/children/1/growth/add",
            Some(StatusCode::SEE_OTHER),
        )]));
        let result = GrowthDataSync::new(store.clone(), server, scope()).run().await;

        assert!(matches!(result, Err(SwError::Sync(_))));
        assert_eq!(store.len().await, 1);
    }

    /// Follows redirects itself, like a browser fetch would.
    struct FollowingServer {
        landed_on: &'static str,
    }

    #[async_trait::async_trait]
    impl Fetcher for FollowingServer {
        async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
            let target = request.url.join(self.landed_on).unwrap();
            Ok(Response::new(target, StatusCode::OK, "LOGIN FORM"))
        }
    }

    #[tokio::test]
    async fn test_followed_redirect_to_custom_login_keeps_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("POST", "/children/1/growth/add", FORM, "a").await;

        let server = Arc::new(FollowingServer {
            landed_on: "/auth/sign-in?next=/children/1/growth/add",
        });
        let result = GrowthDataSync::new(store.clone(), server, scope())
            .with_login_path("/auth/sign-in")
            .run()
            .await;

        assert!(matches!(result, Err(SwError::Sync(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_mutation_is_dropped() {
        let store = Arc::new(MemoryOfflineStore::new());
        store.enqueue("BAD METHOD", "/children/1/growth/add", FORM, "a").await;
        store.enqueue("POST", "/children/1/growth/add", FORM, "b").await;

        let server = Arc::new(ScriptedServer::new(vec![(
            "/children/1/growth/add",
            Some(StatusCode::OK),
        )]));
        let report = GrowthDataSync::new(store.clone(), server.clone(), scope())
            .run()
            .await
            .unwrap();

        assert_eq!(report, SyncReport { replayed: 1, rejected: 1 });
        assert!(store.is_empty().await);
        assert_eq!(server.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let store = Arc::new(MemoryOfflineStore::new());
        let server = Arc::new(ScriptedServer::new(Vec::new()));
        let report = GrowthDataSync::new(store, server.clone(), scope())
            .run()
            .await
            .unwrap();

        assert_eq!(report, SyncReport::default());
        assert!(server.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pending_mutation_serde() {
        let mutation = PendingMutation {
            id: 7,
            method: "POST".to_string(),
            path: "/children/1/growth/add".to_string(),
            content_type: None,
            body: b"weight=7".to_vec(),
            queued_at: 1,
        };
        let json = serde_json::to_string(&mutation).unwrap();
        let back: PendingMutation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mutation);
    }
}
