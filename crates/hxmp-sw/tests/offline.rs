//! End-to-end tests: a worker installed against a scripted network, then
//! driven through version upgrades and outages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{Method, StatusCode};
use hxmp_core::AppConfig;
use hxmp_net::{Fetcher, NetError, Request, Response, Url};
use hxmp_sw::{CacheStorage, DiskCacheStorage, MemoryCacheStorage, ServiceWorker, ServiceWorkerState};

const ORIGIN: &str = "https://hxmp.space/";

#[derive(Default)]
struct Network {
    pages: Mutex<HashMap<String, String>>,
    down: AtomicBool,
    hits: AtomicUsize,
}

impl Network {
    fn serve(&self, path: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(format!("https://hxmp.space{path}"), body.to_string());
    }

    fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for Network {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".to_string()));
        }
        let page = self.pages.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(match page {
            Some(body) => Response::new(StatusCode::OK, body),
            None => Response::new(StatusCode::NOT_FOUND, "missing"),
        })
    }
}

fn site() -> Arc<Network> {
    let network = Arc::new(Network::default());
    for path in [
        "/",
        "/index.html",
        "/xrhome.html",
        "/auth-gateway.html",
        "/assets/xr2.png",
        "/floating-nav.css",
        "/floating-nav.js",
    ] {
        network.serve(path, &format!("content of {path}"));
    }
    network
}

fn config(version: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.release.app_version = version.to_string();
    config.worker.origin = Url::parse(ORIGIN).unwrap();
    config
}

fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
}

#[tokio::test]
async fn upgrade_replaces_old_cache_and_keeps_foreign_ones() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = site();

    let (v1, _rx) = ServiceWorker::new(&config("1.0.0"), caches.clone(), network.clone());
    v1.start().await.unwrap();
    caches.open("analytics-queue").await.unwrap();

    let (v2, _rx) = ServiceWorker::new(&config("1.1.0"), caches.clone(), network.clone());
    v2.start().await.unwrap();

    assert_eq!(v2.state().await, ServiceWorkerState::Activated);
    let names = caches.keys().await.unwrap();
    assert_eq!(names, vec!["analytics-queue", "hxmp-space-v1.1.0"]);
    assert_eq!(caches.entry_count("hxmp-space-v1.1.0").await, Some(7));
}

#[tokio::test]
async fn static_assets_are_fetched_once() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = site();
    network.serve("/gallery.js", "gallery()");

    let (worker, _rx) = ServiceWorker::new(&config("1.0.0"), caches, network.clone());
    worker.start().await.unwrap();
    let after_install = network.hits();

    for _ in 0..3 {
        let response = worker.handle_fetch(get("/gallery.js")).await.unwrap();
        assert_eq!(response.text().unwrap(), "gallery()");
    }
    assert_eq!(network.hits(), after_install + 1);
}

#[tokio::test]
async fn outage_serves_cached_copies_or_offline() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = site();
    network.serve("/api/profile", "{\"name\":\"nova\"}");

    let (worker, _rx) = ServiceWorker::new(&config("1.0.0"), caches, network.clone());
    worker.start().await.unwrap();

    let live = worker.handle_fetch(get("/api/profile")).await.unwrap();
    assert!(!live.from_cache);

    network.go_down();

    let cached = worker.handle_fetch(get("/api/profile")).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.text().unwrap(), "{\"name\":\"nova\"}");

    let page = worker.handle_fetch(get("/xrhome.html")).await.unwrap();
    assert_eq!(page.text().unwrap(), "content of /xrhome.html");

    let unknown = worker.handle_fetch(get("/api/never-seen")).await.unwrap();
    assert_eq!(unknown.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(unknown.text().unwrap(), "Offline");
}

#[tokio::test]
async fn writes_and_foreign_requests_pass_through() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = site();
    let (worker, _rx) = ServiceWorker::new(&config("1.0.0"), caches, network.clone());
    worker.start().await.unwrap();
    let before = network.hits();

    let post = Request::new(Method::POST, Url::parse("https://hxmp.space/api/like").unwrap());
    let cdn = Request::get(Url::parse("https://cdn.jsdelivr.net/npm/three.js").unwrap());

    assert!(worker.handle_fetch(post).await.is_none());
    assert!(worker.handle_fetch(cdn).await.is_none());
    assert_eq!(network.hits(), before);
}

#[tokio::test]
async fn failed_install_leaves_previous_version_in_charge() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = site();
    let (v1, _rx) = ServiceWorker::new(&config("1.0.0"), caches.clone(), network.clone());
    v1.start().await.unwrap();

    network.go_down();
    let (v2, _rx) = ServiceWorker::new(&config("1.1.0"), caches.clone(), network.clone());
    assert!(v2.start().await.is_err());
    assert_eq!(v2.state().await, ServiceWorkerState::Redundant);

    assert_eq!(caches.keys().await.unwrap(), vec!["hxmp-space-v1.0.0"]);
    let response = v1.handle_fetch(get("/floating-nav.css")).await.unwrap();
    assert_eq!(response.text().unwrap(), "content of /floating-nav.css");
}

#[tokio::test]
async fn disk_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = site();

    {
        let caches = Arc::new(DiskCacheStorage::open_dir(dir.path()).await.unwrap());
        let (worker, _rx) = ServiceWorker::new(&config("1.0.0"), caches, network.clone());
        worker.start().await.unwrap();
    }

    network.go_down();
    let caches = Arc::new(DiskCacheStorage::open_dir(dir.path()).await.unwrap());
    let (restarted, _rx) = ServiceWorker::new(&config("1.0.0"), caches.clone(), network.clone());

    // Nothing to fetch: the previous run left a complete cache behind.
    assert!(restarted.resume().await.unwrap());
    assert_eq!(restarted.state().await, ServiceWorkerState::Activated);

    let hit = restarted.handle_fetch(get("/floating-nav.js")).await.unwrap();
    assert!(hit.from_cache);
    assert_eq!(hit.text().unwrap(), "content of /floating-nav.js");
}

#[tokio::test]
async fn restart_into_new_version_offline_keeps_old_cache() {
    let dir = tempfile::tempdir().unwrap();
    let network = site();

    {
        let caches = Arc::new(DiskCacheStorage::open_dir(dir.path()).await.unwrap());
        let (worker, _rx) = ServiceWorker::new(&config("1.0.0"), caches, network.clone());
        worker.start().await.unwrap();
    }

    network.go_down();
    let caches = Arc::new(DiskCacheStorage::open_dir(dir.path()).await.unwrap());
    let (next, _rx) = ServiceWorker::new(&config("1.1.0"), caches.clone(), network.clone());

    assert!(!next.resume().await.unwrap());
    assert!(next.start().await.is_err());
    assert_eq!(next.state().await, ServiceWorkerState::Redundant);

    let hit = caches
        .match_request(&get("/floating-nav.js"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.text().unwrap(), "content of /floating-nav.js");
}
