//! Runtime-owned resources shared by every controller version.

use std::sync::Arc;

use crate::cache::{CacheStorage, SharedCacheStorage};
use crate::clients::{Clients, SharedClients};
use crate::net::Fetcher;
use crate::notification::{NotificationCenter, SharedNotifications};
use crate::sync::OfflineStore;

/// What the runtime gives a controller: the network, cache storage, open
/// pages, the notification tray, and the page-side offline queue.
#[derive(Clone)]
pub struct WorkerHost {
    pub network: Arc<dyn Fetcher>,
    pub caches: SharedCacheStorage,
    pub clients: SharedClients,
    pub notifications: SharedNotifications,
    pub offline_store: Option<Arc<dyn OfflineStore>>,
}

impl WorkerHost {
    /// Fresh, empty host state on top of `network`.
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            network,
            caches: CacheStorage::shared(),
            clients: Clients::shared(),
            notifications: NotificationCenter::shared(),
            offline_store: None,
        }
    }

    /// Attach the offline growth-data queue.
    pub fn with_offline_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.offline_store = Some(store);
        self
    }
}

impl std::fmt::Debug for WorkerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHost")
            .field("offline_store", &self.offline_store.is_some())
            .finish_non_exhaustive()
    }
}
