//! Caching strategies.
//!
//! Each strategy combines one lookup in the cache store with at most one live
//! fetch and always resolves to a [`Response`]: the live one, a cached one, or
//! [`Response::offline`]. Cache access is best effort; a failing read is a
//! miss and a failing write is logged and dropped.

use std::sync::Arc;

use hxmp_net::{Fetcher, NetError, Request, Response};
use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::classify::Strategy;

/// Everything a strategy needs: the cache store, the network and the name of
/// the cache new responses go into.
#[derive(Clone)]
pub struct StrategyContext {
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    cache_name: Arc<str>,
}

impl StrategyContext {
    pub fn new(
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        cache_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            caches,
            fetcher,
            cache_name: cache_name.into(),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn caches(&self) -> &Arc<dyn CacheStorage> {
        &self.caches
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Look `request` up in every cache. Errors count as a miss.
    pub async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.caches.match_request(request).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Live network fetch. Does not touch the cache.
    pub async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.fetcher.fetch(request).await
    }

    /// Store `response` for `request` in the active cache. Returns whether
    /// the write went through.
    pub async fn store(&self, request: &Request, response: &Response) -> bool {
        match self.caches.put(&self.cache_name, request, response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %request.url, cache = %self.cache_name, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Fetch and store. `None` when the network failed.
    async fn revalidate(&self, request: &Request) -> Option<Response> {
        match self.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                Some(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network fetch failed");
                None
            }
        }
    }

    /// Resolve `request` with `strategy`.
    pub async fn resolve(&self, strategy: Strategy, request: &Request) -> Response {
        match strategy {
            Strategy::NetworkFirst => network_first(self, request).await,
            Strategy::CacheFirst => cache_first(self, request).await,
            Strategy::StaleWhileRevalidate => stale_while_revalidate(self, request).await,
        }
    }
}

/// Live response when the network answers (and cache it), else the cached
/// copy, else offline.
pub async fn network_first(ctx: &StrategyContext, request: &Request) -> Response {
    if let Some(response) = ctx.revalidate(request).await {
        return response;
    }

    match ctx.lookup(request).await {
        Some(cached) => {
            debug!(url = %request.url, "Network failed, serving cached copy");
            cached
        }
        None => Response::offline(),
    }
}

/// Cached copy when present; otherwise fetch, cache and return it; offline
/// when that fails too.
pub async fn cache_first(ctx: &StrategyContext, request: &Request) -> Response {
    if let Some(cached) = ctx.lookup(request).await {
        return cached;
    }

    ctx.revalidate(request)
        .await
        .unwrap_or_else(Response::offline)
}

/// Cached copy immediately, while a background fetch refreshes the cache for
/// the next request. On a miss, waits for that fetch.
///
/// The refresh runs as its own task and completes even when the returned
/// future is dropped.
pub async fn stale_while_revalidate(ctx: &StrategyContext, request: &Request) -> Response {
    let cached = ctx.lookup(request).await;

    let refresh = {
        let ctx = ctx.clone();
        let request = request.clone();
        tokio::spawn(async move { ctx.revalidate(&request).await })
    };

    if let Some(cached) = cached {
        return cached;
    }

    match refresh.await {
        Ok(Some(response)) => response,
        Ok(None) => Response::offline(),
        Err(e) => {
            warn!(url = %request.url, error = %e, "Revalidation task failed");
            Response::offline()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::testing::ScriptedFetcher;
    use crate::SwResult;
    use async_trait::async_trait;
    use http::StatusCode;
    use std::time::Duration;
    use tokio::sync::Notify;

    const CACHE: &str = "hxmp-space-v1.0.0";

    fn setup() -> (StrategyContext, Arc<MemoryCacheStorage>, Arc<ScriptedFetcher>) {
        let caches = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let ctx = StrategyContext::new(caches.clone(), fetcher.clone(), CACHE);
        (ctx, caches, fetcher)
    }

    fn get(url: &str) -> Request {
        Request::parse_get(url).unwrap()
    }

    /// Cache store whose every operation fails.
    struct BrokenCaches;

    #[async_trait]
    impl CacheStorage for BrokenCaches {
        async fn open(&self, _: &str) -> SwResult<()> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn has(&self, _: &str) -> SwResult<bool> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn delete(&self, _: &str) -> SwResult<bool> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn keys(&self) -> SwResult<Vec<String>> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn put(&self, _: &str, _: &Request, _: &Response) -> SwResult<()> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn put_all(&self, _: &str, _: &[(Request, Response)]) -> SwResult<()> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn match_in(&self, _: &str, _: &Request) -> SwResult<Option<Response>> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
        async fn match_request(&self, _: &Request) -> SwResult<Option<Response>> {
            Err(crate::ServiceWorkerError::cache("unavailable"))
        }
    }

    #[tokio::test]
    async fn test_network_first_stores_live_response() {
        let (ctx, caches, fetcher) = setup();
        fetcher.route("https://hxmp.space/api/feed", "live");

        let request = get("https://hxmp.space/api/feed");
        let response = network_first(&ctx, &request).await;

        assert_eq!(response.text().unwrap(), "live");
        assert!(!response.from_cache);
        let stored = caches.match_in(CACHE, &request).await.unwrap().unwrap();
        assert_eq!(stored.text().unwrap(), "live");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_last_cached() {
        let (ctx, _caches, fetcher) = setup();
        let request = get("https://hxmp.space/api/feed");

        fetcher.route("https://hxmp.space/api/feed", "first");
        network_first(&ctx, &request).await;
        fetcher.route("https://hxmp.space/api/feed", "second");
        network_first(&ctx, &request).await;

        fetcher.set_offline(true);
        let response = network_first(&ctx, &request).await;
        assert_eq!(response.text().unwrap(), "second");
        assert!(response.from_cache);
    }

    #[tokio::test]
    async fn test_network_first_offline_without_cache() {
        let (ctx, _caches, fetcher) = setup();
        fetcher.set_offline(true);

        let response = network_first(&ctx, &get("https://hxmp.space/api/feed")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.text().unwrap(), "Offline");
    }

    #[tokio::test]
    async fn test_cache_first_second_request_skips_network() {
        let (ctx, _caches, fetcher) = setup();
        fetcher.route("https://hxmp.space/floating-nav.js", "nav()");
        let request = get("https://hxmp.space/floating-nav.js");

        let first = cache_first(&ctx, &request).await;
        let second = cache_first(&ctx, &request).await;

        assert_eq!(fetcher.calls(), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.text().unwrap(), "nav()");
    }

    #[tokio::test]
    async fn test_cache_first_offline_on_miss() {
        let (ctx, _caches, fetcher) = setup();
        fetcher.set_offline(true);

        let response = cache_first(&ctx, &get("https://hxmp.space/logo.png")).await;
        assert!(response.is_offline());
    }

    #[tokio::test]
    async fn test_swr_returns_cached_without_waiting() {
        let caches = Arc::new(MemoryCacheStorage::new());
        let gate = Arc::new(Notify::new());
        let fetcher = Arc::new(ScriptedFetcher::gated(gate.clone()));
        let ctx = StrategyContext::new(caches.clone(), fetcher.clone(), CACHE);

        let request = get("https://hxmp.space/xrhome.html");
        caches
            .put(CACHE, &request, &Response::new(StatusCode::OK, "old"))
            .await
            .unwrap();
        fetcher.route("https://hxmp.space/xrhome.html", "new");

        let response = tokio::time::timeout(
            Duration::from_millis(500),
            stale_while_revalidate(&ctx, &request),
        )
        .await
        .expect("cached response must not wait on the network");
        assert_eq!(response.text().unwrap(), "old");

        gate.notify_one();
        let mut refreshed = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let hit = caches.match_in(CACHE, &request).await.unwrap().unwrap();
            if hit.text().unwrap() == "new" {
                refreshed = Some(hit);
                break;
            }
        }
        assert!(refreshed.is_some(), "background fetch must refresh the cache");
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network() {
        let (ctx, caches, fetcher) = setup();
        fetcher.route("https://hxmp.space/xrhome.html", "fresh");
        let request = get("https://hxmp.space/xrhome.html");

        let response = stale_while_revalidate(&ctx, &request).await;
        assert_eq!(response.text().unwrap(), "fresh");
        assert!(caches.match_in(CACHE, &request).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_swr_miss_offline() {
        let (ctx, _caches, fetcher) = setup();
        fetcher.set_offline(true);

        let response = stale_while_revalidate(&ctx, &get("https://hxmp.space/")).await;
        assert!(response.is_offline());
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_network() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.route("https://hxmp.space/a.css", "css");
        let ctx = StrategyContext::new(Arc::new(BrokenCaches), fetcher.clone(), CACHE);
        let request = get("https://hxmp.space/a.css");

        for strategy in [
            Strategy::NetworkFirst,
            Strategy::CacheFirst,
            Strategy::StaleWhileRevalidate,
        ] {
            let response = ctx.resolve(strategy, &request).await;
            assert_eq!(response.text().unwrap(), "css", "{strategy}");
        }
    }

    #[tokio::test]
    async fn test_http_errors_are_responses() {
        let (ctx, _caches, fetcher) = setup();
        fetcher.route_status("https://hxmp.space/api/x", StatusCode::INTERNAL_SERVER_ERROR, "boom");

        let response = network_first(&ctx, &get("https://hxmp.space/api/x")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
