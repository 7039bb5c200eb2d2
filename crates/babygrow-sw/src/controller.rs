//! The offline cache controller.
//!
//! One method per worker event:
//!
//! | event               | method                          |
//! |---------------------|---------------------------------|
//! | install             | [`OfflineCacheController::install`] |
//! | activate            | [`OfflineCacheController::activate`] |
//! | fetch               | [`OfflineCacheController::handle_fetch`] |
//! | sync                | [`OfflineCacheController::handle_sync`] |
//! | push                | [`OfflineCacheController::handle_push`] |
//! | notificationclick   | [`OfflineCacheController::handle_notification_click`] |
//!
//! Fetches use stale-while-revalidate: a cache hit is returned at once and a
//! background fetch refreshes the entry; a miss goes to the network and a 200
//! is written back. Failed navigations with nothing cached get the offline
//! page.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use crate::cache::SharedCacheStorage;
use crate::clients::{Client, ClientMatchOptions};
use crate::config::ControllerConfig;
use crate::error::SwError;
use crate::host::WorkerHost;
use crate::intercept::{BypassReason, ExclusionRules, InterceptAction};
use crate::lifecycle::{ExtendLifetime, WorkerState};
use crate::net::Fetcher;
use crate::notification::{
    ClickAction, Notification, NotificationId, NotificationOptions, PushPayload,
};
use crate::request::{Request, RequestKey, Response};
use crate::sync::{GrowthDataSync, SyncReport};

/// Result of a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Entries written to the new store.
    pub cached: usize,
    /// Ask the runtime to activate without waiting for pages to close.
    pub skip_waiting: bool,
}

/// Result of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Stores deleted because their name is not the current version.
    pub evicted: Vec<String>,
    /// Pages now controlled by this version.
    pub claimed: usize,
}

/// What the controller did with a request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not handled; the runtime sends the request to the network untouched.
    Passthrough(BypassReason),
    /// Handled; this is the response for the page.
    Respond(Response),
}

/// A handled fetch event.
#[derive(Debug)]
pub struct FetchHandled {
    pub outcome: FetchOutcome,
    /// Background revalidation the event must outlive.
    pub lifetime: ExtendLifetime,
}

impl FetchHandled {
    fn respond(response: Response) -> Self {
        Self {
            outcome: FetchOutcome::Respond(response),
            lifetime: ExtendLifetime::new(),
        }
    }

    /// The response, unless the request was passed through.
    pub fn response(&self) -> Option<&Response> {
        match self.outcome {
            FetchOutcome::Respond(ref response) => Some(response),
            FetchOutcome::Passthrough(_) => None,
        }
    }
}

/// Result of a sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Tag is not ours.
    Ignored,
    Synced(SyncReport),
}

/// Result of a notification click.
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    Dismissed,
    /// An open page already showed the target URL.
    Focused(Client),
    /// A new page was opened at the target URL.
    Opened(Client),
}

/// One version of the offline cache controller.
pub struct OfflineCacheController {
    config: Arc<ControllerConfig>,
    exclusions: ExclusionRules,
    host: WorkerHost,
    state: RwLock<WorkerState>,
}

impl OfflineCacheController {
    /// Create a controller. The config is validated up front.
    pub fn new(config: ControllerConfig, host: WorkerHost) -> Result<Self, SwError> {
        config.validate()?;
        let exclusions = ExclusionRules::from_substrings(&config.exclusion_patterns);
        Ok(Self {
            config: Arc::new(config),
            exclusions,
            host,
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Name of this version's cache store.
    pub fn version(&self) -> &str {
        &self.config.version_name
    }

    pub fn host(&self) -> &WorkerHost {
        &self.host
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        debug!(version = %self.version(), state = ?state, "Controller state changed");
    }

    pub(crate) async fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    // ==================== Install ====================

    /// Fetch and store every precache manifest entry.
    ///
    /// All entries are fetched before the store is touched, so a failure
    /// leaves no store behind for this version. The controller becomes
    /// redundant on failure.
    pub async fn install(&self) -> Result<InstallOutcome, SwError> {
        self.set_state(WorkerState::Installing).await;

        match self.precache().await {
            Ok(cached) => {
                self.set_state(WorkerState::Installed).await;
                info!(version = %self.version(), cached, "Precache complete");
                Ok(InstallOutcome {
                    cached,
                    skip_waiting: self.config.skip_waiting,
                })
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                warn!(version = %self.version(), error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, SwError> {
        let urls = self.config.precache_urls()?;
        info!(version = %self.version(), entries = urls.len(), "Caching assets");

        let network = &self.host.network;
        let fetched = try_join_all(urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response = network
                .fetch(&request)
                .await
                .map_err(|e| SwError::Precache {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
            if !response.ok() {
                return Err(SwError::Precache {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok::<_, SwError>((request, response))
        }))
        .await?;

        let mut caches = self.host.caches.write().await;
        let cache = caches.open(self.version());
        for (request, response) in fetched {
            cache.put(&request, response)?;
        }
        Ok(cache.len())
    }

    // ==================== Activate ====================

    /// Delete every other version's store and claim all open pages.
    pub async fn activate(&self) -> ActivateOutcome {
        self.set_state(WorkerState::Activating).await;

        let evicted = {
            let mut caches = self.host.caches.write().await;
            let stale: Vec<String> = caches
                .keys()
                .into_iter()
                .filter(|name| name != self.version())
                .collect();
            for name in &stale {
                info!(cache = %name, "Removing old cache");
                caches.delete(name);
            }
            stale
        };

        let claimed = self.host.clients.write().await.claim(self.version());

        self.set_state(WorkerState::Activated).await;
        info!(version = %self.version(), evicted = evicted.len(), claimed, "Controller activated");

        ActivateOutcome { evicted, claimed }
    }

    // ==================== Fetch ====================

    /// Serve a page request.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchHandled, SwError> {
        trace!(url = %request.url, method = %request.method, mode = ?request.mode, "Fetch event");

        if let InterceptAction::Bypass(reason) = self.exclusions.classify(request) {
            return Ok(FetchHandled {
                outcome: FetchOutcome::Passthrough(reason),
                lifetime: ExtendLifetime::new(),
            });
        }

        let cached = {
            let caches = self.host.caches.read().await;
            caches
                .get(self.version())
                .and_then(|cache| cache.match_request(request))
                .map(|entry| entry.response.cached_copy())
        };

        if let Some(response) = cached {
            debug!(url = %request.url, "Serving from cache, revalidating");
            let mut lifetime = ExtendLifetime::new();
            lifetime.wait_until(revalidate(
                Arc::clone(&self.host.network),
                Arc::clone(&self.host.caches),
                self.version().to_string(),
                request.clone(),
            ));
            return Ok(FetchHandled {
                outcome: FetchOutcome::Respond(response),
                lifetime,
            });
        }

        match self.host.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable_for(request) {
                    self.host
                        .caches
                        .write()
                        .await
                        .open(self.version())
                        .put(request, response.clone())?;
                    debug!(url = %request.url, "Cached network response");
                }
                Ok(FetchHandled::respond(response))
            }
            Err(e) if request.is_navigation() => {
                warn!(url = %request.url, error = %e, "Navigation failed, serving offline page");
                self.offline_fallback().await.map(FetchHandled::respond)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed for sub-resource");
                Err(e)
            }
        }
    }

    async fn offline_fallback(&self) -> Result<Response, SwError> {
        let url = self.config.offline_fallback_url()?;
        let key = RequestKey::get(&url);
        let caches = self.host.caches.read().await;
        caches
            .get(self.version())
            .and_then(|cache| cache.match_key(&key))
            .map(|entry| entry.response.cached_copy())
            .ok_or_else(|| SwError::OfflineFallbackMissing(url.to_string()))
    }

    // ==================== Sync ====================

    /// Run the growth-data sync when `tag` is ours.
    ///
    /// An error means the runtime should retry later.
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome, SwError> {
        if tag != self.config.sync_tag {
            debug!(tag, "Ignoring unknown sync tag");
            return Ok(SyncOutcome::Ignored);
        }

        let Some(store) = self.host.offline_store.clone() else {
            info!("No offline store attached, nothing to sync");
            return Ok(SyncOutcome::Synced(SyncReport::default()));
        };

        let sync = GrowthDataSync::new(
            store,
            Arc::clone(&self.host.network),
            self.config.scope.clone(),
        )
        .with_login_path(self.config.login_path.as_str());
        sync.run().await.map(SyncOutcome::Synced)
    }

    // ==================== Push ====================

    /// Show a notification for a push message.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let payload = PushPayload::parse(data);
        let (title, options) = NotificationOptions::from_payload(&payload, &self.config.notifications);
        let notification = self.host.notifications.write().await.show(title, options);
        info!(id = notification.id.raw(), title = %notification.title, url = %notification.options.url, "Notification shown");
        notification
    }

    /// Close the notification, then focus or open its target page unless it
    /// was dismissed.
    pub async fn handle_notification_click(
        &self,
        id: NotificationId,
        action: Option<&str>,
    ) -> Result<ClickOutcome, SwError> {
        let notification = self
            .host
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_else(|| SwError::NotFound(format!("notification {}", id.raw())))?;

        if ClickAction::from_action(action) == ClickAction::Dismiss {
            debug!(id = id.raw(), "Notification dismissed");
            return Ok(ClickOutcome::Dismissed);
        }

        let target = self.config.resolve(&notification.options.url)?;
        let mut clients = self.host.clients.write().await;

        let windows = ClientMatchOptions {
            include_uncontrolled: false,
        };
        let existing = clients
            .match_all(&windows)
            .into_iter()
            .find(|client| client.url == target)
            .map(|client| client.id.clone());

        match existing {
            Some(client_id) => {
                let client = clients.focus(&client_id)?;
                info!(url = %target, client = %client.id.as_str(), "Focused existing page");
                Ok(ClickOutcome::Focused(client))
            }
            None => {
                let in_scope = target.as_str().starts_with(self.config.scope.as_str());
                let controller = in_scope.then(|| self.version());
                let client = clients.open_window(target, controller);
                info!(url = %client.url, client = %client.id.as_str(), "Opened new page");
                Ok(ClickOutcome::Opened(client))
            }
        }
    }
}

impl std::fmt::Debug for OfflineCacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCacheController")
            .field("version", &self.config.version_name)
            .field("scope", &self.config.scope.as_str())
            .finish_non_exhaustive()
    }
}

/// Refresh one cache entry from the network. Failures are dropped.
///
/// Only writes into a store that still exists, so a revalidation that
/// finishes after a newer version activated cannot resurrect an evicted store.
async fn revalidate(
    network: Arc<dyn Fetcher>,
    caches: SharedCacheStorage,
    version: String,
    request: Request,
) {
    match network.fetch(&request).await {
        Ok(response) if response.is_cacheable_for(&request) => {
            let mut caches = caches.write().await;
            match caches.get_mut(&version) {
                Some(cache) => {
                    if let Err(e) = cache.put(&request, response) {
                        debug!(url = %request.url, error = %e, "Revalidation write failed");
                    } else {
                        trace!(url = %request.url, "Cache entry refreshed");
                    }
                }
                None => debug!(cache = %version, "Store gone, dropping revalidated response"),
            }
        }
        Ok(response) => {
            trace!(url = %request.url, status = %response.status, "Revalidation not cacheable");
        }
        Err(e) => {
            trace!(url = %request.url, error = %e, "Revalidation failed");
        }
    }
}
