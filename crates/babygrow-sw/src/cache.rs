//! Versioned cache stores.
//!
//! ```text
//! CacheStorage
//!     └── Cache ("babygrow-cache-v1")
//!             └── RequestKey → CacheEntry
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use tokio::sync::RwLock;

use crate::error::SwError;
use crate::request::{Request, RequestKey, Response};

/// Cache storage shared between the runtime and every controller version.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: Response,
    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// A single named cache store.
#[derive(Debug, Default)]
pub struct Cache {
    pub name: String,
    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&request.key())
    }

    /// Match by key.
    pub fn match_key(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store `response` under the request's key, replacing any previous entry.
    pub fn put(&mut self, request: &Request, response: Response) -> Result<(), SwError> {
        self.put_key(request.key(), response)
    }

    /// Store `response` under `key`. Only GET keys are accepted.
    pub fn put_key(&mut self, key: RequestKey, response: Response) -> Result<(), SwError> {
        if !key.is_get() {
            return Err(SwError::Cache(format!("cannot cache non-GET request {key}")));
        }
        let entry = CacheEntry {
            key: key.clone(),
            response: Response {
                from_cache: false,
                ..response
            },
            cached_at: now_millis(),
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&RequestKey> {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache stores, by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared handle.
    pub fn shared() -> SharedCacheStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// An existing cache, without creating it.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cache> {
        self.caches.get_mut(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use url::Url;

    fn get(s: &str) -> Request {
        Request::get(Url::parse(s).unwrap())
    }

    fn ok(request: &Request, body: &'static str) -> Response {
        Response::new(request.url.clone(), StatusCode::OK, body)
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("babygrow-cache-v1");
        let request = get("https://example.com/static/css/style.css");
        cache.put(&request, ok(&request, "css")).unwrap();

        let entry = cache.match_request(&request).unwrap();
        assert_eq!(entry.response.text(), "css");
        assert!(cache.match_request(&get("https://example.com/other.css")).is_none());
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = Cache::new("v1");
        let request = get("https://example.com/");
        cache.put(&request, ok(&request, "old")).unwrap();
        cache.put(&request, ok(&request, "new")).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_request(&request).unwrap().response.text(), "new");
    }

    #[test]
    fn test_cache_rejects_non_get() {
        let mut cache = Cache::new("v1");
        let request = Request::post(
            Url::parse("https://example.com/children/add").unwrap(),
            Bytes::from_static(b"name=Ana"),
        );
        let response = ok(&request, "");
        assert!(matches!(cache.put(&request, response), Err(SwError::Cache(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        let request = get("https://example.com/static/js/celebrations.js");
        cache.put(&request, ok(&request, "js")).unwrap();
        assert!(cache.delete(&request.key()));
        assert!(!cache.delete(&request.key()));
        assert!(cache.match_request(&request).is_none());
    }

    #[test]
    fn test_cache_storage_open_and_delete() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("v1"));

        storage.open("v1");
        storage.open("v2");
        assert_eq!(storage.keys(), vec!["v1".to_string(), "v2".to_string()]);

        assert!(storage.delete("v1"));
        assert!(!storage.has("v1"));
        assert!(storage.has("v2"));
    }

    #[test]
    fn test_cache_storage_get_mut_does_not_create() {
        let mut storage = CacheStorage::new();
        assert!(storage.get_mut("v1").is_none());
        assert!(!storage.has("v1"));

        let request = get("https://example.com/offline.html");
        storage.open("v1");
        storage
            .get_mut("v1")
            .unwrap()
            .put(&request, ok(&request, "offline"))
            .unwrap();
        assert_eq!(
            storage.get("v1").unwrap().match_request(&request).unwrap().response.text(),
            "offline"
        );
    }
}
