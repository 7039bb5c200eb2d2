//! # BabyGrow Service Worker
//!
//! Offline cache controller for the BabyGrow web app.
//!
//! ## Features
//!
//! - **Precache**: all-or-nothing install of a fixed manifest
//! - **Versioned stores**: activation evicts every other version's cache
//! - **Stale-while-revalidate**: cached responses first, refreshed in the background
//! - **Offline page**: failed navigations with nothing cached get a fallback
//! - **Background sync**: replays growth data queued while offline
//! - **Push**: notifications with open/dismiss actions that focus or open pages
//!
//! ## Architecture
//!
//! ```text
//! Registration (runtime)
//!     ├── installing / waiting / active
//!     │       └── OfflineCacheController (one per version)
//!     │               ├── ExclusionRules
//!     │               └── ControllerConfig
//!     └── WorkerHost
//!             ├── Fetcher (network)
//!             ├── CacheStorage
//!             │       └── Cache → RequestKey → CacheEntry
//!             ├── Clients
//!             ├── NotificationCenter
//!             └── OfflineStore (optional)
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod intercept;
pub mod lifecycle;
pub mod net;
pub mod notification;
pub mod registration;
pub mod request;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};
pub use clients::{Client, ClientId, ClientMatchOptions, Clients};
pub use config::ControllerConfig;
pub use controller::{
    ActivateOutcome, ClickOutcome, FetchHandled, FetchOutcome, InstallOutcome,
    OfflineCacheController, SyncOutcome,
};
pub use error::{SwError, SwResult};
pub use host::WorkerHost;
pub use intercept::{BypassReason, ExclusionRules, InterceptAction};
pub use lifecycle::{ExtendLifetime, WorkerState};
pub use net::{Fetcher, FetcherConfig, HttpFetcher};
pub use notification::{
    ClickAction, Notification, NotificationCenter, NotificationDefaults, NotificationId,
    NotificationOptions, PushPayload,
};
pub use registration::{DispatchedFetch, Registration, UpdateOutcome};
pub use request::{Request, RequestId, RequestKey, RequestMode, Response};
pub use sync::{
    GrowthDataSync, MemoryOfflineStore, OfflineStore, PendingMutation, SyncReport,
    DEFAULT_LOGIN_PATH,
};
