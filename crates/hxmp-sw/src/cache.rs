//! Named request/response caches.

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use hxmp_core::now_millis;
use hxmp_net::{Request, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{ServiceWorkerError, SwResult};

// ==================== Entries ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (cache key).
    pub url: String,

    /// Request method. Always `GET`.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers in wire order. Repeated names keep every value and
    /// values are raw bytes, since they need not be UTF-8.
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: i64,
}

impl CacheEntry {
    /// Snapshot `response` as the entry for `request`.
    ///
    /// Fails for anything but GET requests.
    pub fn new(request: &Request, response: &Response) -> SwResult<Self> {
        if !request.is_get() {
            return Err(ServiceWorkerError::CacheError(format!(
                "only GET requests can be cached, got {}",
                request.method
            )));
        }

        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Ok(Self {
            url: request.cache_key(),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        })
    }

    /// Rebuild the response this entry was stored from.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(n, v);
            }
        }

        let mut response = Response::new(
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            self.body.clone(),
        );
        response.headers = headers;
        response.url = url::Url::parse(&self.url).ok();
        response.into_cached()
    }
}

// ==================== Cache ====================

/// A cache instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries, keyed by request URL.
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request by cache key.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or replace an entry. Last write wins.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys (URLs).
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Storage of named caches (the `caches` global).
///
/// Every operation may fail; callers on the request path treat failures as
/// best effort and fall back to the network.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if it does not exist.
    async fn open(&self, name: &str) -> SwResult<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> SwResult<bool>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> SwResult<bool>;

    /// Names of all caches. Order is backend specific but stable.
    async fn keys(&self) -> SwResult<Vec<String>>;

    /// Store `response` for `request` in cache `cache_name`.
    async fn put(&self, cache_name: &str, request: &Request, response: &Response) -> SwResult<()>;

    /// Store every pair, or none of them.
    async fn put_all(&self, cache_name: &str, pairs: &[(Request, Response)]) -> SwResult<()>;

    /// Match a request in one cache.
    async fn match_in(&self, cache_name: &str, request: &Request) -> SwResult<Option<Response>>;

    /// Match a request across all caches, in [`keys`](Self::keys) order.
    async fn match_request(&self, request: &Request) -> SwResult<Option<Response>>;
}

/// In-memory [`CacheStorage`]. Lists caches in creation order.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in cache `name`, if it exists.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        let caches = self.caches.read().await;
        caches.iter().find(|c| c.name == name).map(Cache::len)
    }
}

fn open_in<'a>(caches: &'a mut Vec<Cache>, name: &str) -> &'a mut Cache {
    match caches.iter().position(|c| c.name == name) {
        Some(index) => &mut caches[index],
        None => {
            caches.push(Cache::new(name));
            let last = caches.len() - 1;
            &mut caches[last]
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> SwResult<()> {
        open_in(&mut *self.caches.write().await, name);
        Ok(())
    }

    async fn has(&self, name: &str) -> SwResult<bool> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn delete(&self, name: &str) -> SwResult<bool> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        Ok(self.caches.read().await.iter().map(|c| c.name.clone()).collect())
    }

    async fn put(&self, cache_name: &str, request: &Request, response: &Response) -> SwResult<()> {
        let entry = CacheEntry::new(request, response)?;
        open_in(&mut *self.caches.write().await, cache_name).put(entry);
        Ok(())
    }

    async fn put_all(&self, cache_name: &str, pairs: &[(Request, Response)]) -> SwResult<()> {
        let entries = pairs
            .iter()
            .map(|(request, response)| CacheEntry::new(request, response))
            .collect::<SwResult<Vec<_>>>()?;

        let mut caches = self.caches.write().await;
        let cache = open_in(&mut caches, cache_name);
        for entry in entries {
            cache.put(entry);
        }
        Ok(())
    }

    async fn match_in(&self, cache_name: &str, request: &Request) -> SwResult<Option<Response>> {
        let caches = self.caches.read().await;
        let key = request.cache_key();
        Ok(caches
            .iter()
            .find(|c| c.name == cache_name)
            .and_then(|c| c.match_request(&key))
            .map(CacheEntry::to_response))
    }

    async fn match_request(&self, request: &Request) -> SwResult<Option<Response>> {
        let caches = self.caches.read().await;
        let key = request.cache_key();
        Ok(caches
            .iter()
            .find_map(|c| c.match_request(&key))
            .map(CacheEntry::to_response))
    }
}
