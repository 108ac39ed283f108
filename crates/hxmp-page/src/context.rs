//! Everything page-side operations touch, passed explicitly.

use std::sync::Arc;

use hxmp_core::AppConfig;
use hxmp_sw::CacheStorage;

use crate::storage::KeyValueStore;

/// Forces the page to load again from the server.
pub trait Reloader: Send + Sync {
    fn reload(&self);
}

impl<F> Reloader for F
where
    F: Fn() + Send + Sync,
{
    fn reload(&self) {
        self()
    }
}

/// The page's storage, cache facility, reload hook and configuration.
#[derive(Clone)]
pub struct PageContext {
    pub config: AppConfig,
    pub storage: Arc<dyn KeyValueStore>,
    /// Named caches shared with the service worker; `None` where the host
    /// has no cache facility.
    pub caches: Option<Arc<dyn CacheStorage>>,
    pub reloader: Arc<dyn Reloader>,
}

impl PageContext {
    /// Create a context without a cache facility.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn KeyValueStore>,
        reloader: Arc<dyn Reloader>,
    ) -> Self {
        Self {
            config,
            storage,
            caches: None,
            reloader,
        }
    }

    /// Attach the cache facility.
    pub fn with_caches(mut self, caches: Arc<dyn CacheStorage>) -> Self {
        self.caches = Some(caches);
        self
    }
}
