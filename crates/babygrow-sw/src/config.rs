//! Controller configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SwError;
use crate::notification::NotificationDefaults;
use crate::sync::DEFAULT_LOGIN_PATH;

/// Immutable configuration for one controller version.
///
/// Changing `version_name` is the only way to invalidate previously cached
/// entries: on activation every store with another name is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Name of this version's cache store.
    pub version_name: String,

    /// Absolute URL that root-relative paths resolve against.
    pub scope: Url,

    /// Resources fetched and stored at install. All or nothing.
    pub precache_manifest: Vec<String>,

    /// URL substrings that are never cached and always go to the network.
    pub exclusion_patterns: Vec<String>,

    /// Page served for failed navigations with nothing cached.
    pub offline_fallback_path: String,

    /// Background sync tag for offline growth data.
    pub sync_tag: String,

    /// Where the server sends requests without a session. A replayed
    /// mutation redirected here stays queued.
    pub login_path: String,

    /// Activate as soon as install completes.
    pub skip_waiting: bool,

    /// Notification defaults for push messages.
    pub notifications: NotificationDefaults,
}

/// The scope the BabyGrow dev server listens on.
pub const DEFAULT_SCOPE: &str = "http://127.0.0.1:5001/";

fn default_scope() -> Url {
    Url::parse(DEFAULT_SCOPE).expect("DEFAULT_SCOPE is a valid URL")
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            version_name: "babygrow-cache-v1".to_string(),
            scope: default_scope(),
            precache_manifest: [
                "/",
                "/offline.html",
                "/static/css/style.css",
                "/static/js/celebrations.js",
                "/static/manifest.json",
                "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&family=Quicksand:wght@500;600;700&display=swap",
                "https://cdn.jsdelivr.net/npm/bootstrap-icons@1.11.1/font/bootstrap-icons.css",
                "https://cdn.jsdelivr.net/npm/chart.js",
                "https://cdn.jsdelivr.net/npm/canvas-confetti@1.6.0/dist/confetti.browser.min.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclusion_patterns: ["/api/", "/login", "/register", "/logout"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            offline_fallback_path: "/offline.html".to_string(),
            sync_tag: "sync-growth-data".to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            skip_waiting: true,
            notifications: NotificationDefaults::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SwError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SwError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Same config under a different version name.
    pub fn with_version(mut self, version_name: impl Into<String>) -> Self {
        self.version_name = version_name.into();
        self
    }

    /// Same config with another scope.
    pub fn with_scope(mut self, scope: Url) -> Self {
        self.scope = scope;
        self
    }

    /// Same config with another precache manifest.
    pub fn with_manifest<S: Into<String>>(mut self, manifest: impl IntoIterator<Item = S>) -> Self {
        self.precache_manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve a manifest entry or target path against the scope.
    pub fn resolve(&self, path: &str) -> Result<Url, SwError> {
        self.scope
            .join(path)
            .map_err(|e| SwError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Every manifest entry, resolved.
    pub fn precache_urls(&self) -> Result<Vec<Url>, SwError> {
        self.precache_manifest
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    /// The offline fallback page, resolved.
    pub fn offline_fallback_url(&self) -> Result<Url, SwError> {
        self.resolve(&self.offline_fallback_path)
    }

    /// Check the invariants a controller relies on.
    pub fn validate(&self) -> Result<(), SwError> {
        if self.version_name.trim().is_empty() {
            return Err(SwError::config("version_name must not be empty"));
        }
        if self.sync_tag.trim().is_empty() {
            return Err(SwError::config("sync_tag must not be empty"));
        }

        let urls = self.precache_urls()?;
        let fallback = self.offline_fallback_url()?;
        if !urls.contains(&fallback) {
            return Err(SwError::config(format!(
                "offline fallback {} is not in the precache manifest",
                self.offline_fallback_path
            )));
        }
        Ok(())
    }
}
