//! # HXMP Service Worker
//!
//! Request caching layer of HXMP Space, modelled on the browser service
//! worker it runs as.
//!
//! ## Features
//!
//! - **Cache stores**: named caches keyed by request, in memory or on disk
//! - **Classification**: URL rules pick one caching strategy per request
//! - **Strategies**: network-first, cache-first, stale-while-revalidate
//! - **Lifecycle**: install (precache), activate (evict old versions, claim
//!   clients) and the `skipWaiting` / `clearCache` message channel
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker
//!     ├── Lifecycle (parsed → installing → installed → activating → activated)
//!     ├── Clients (controlled pages)
//!     ├── RequestClassifier ── Strategy
//!     └── StrategyContext
//!             ├── CacheStorage (caches)
//!             │       └── Cache
//!             │               └── Request → CacheEntry
//!             └── Fetcher (network)
//! ```

use thiserror::Error;

pub mod cache;
pub mod classify;
pub mod disk;
pub mod lifecycle;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, CacheEntry, CacheStorage, MemoryCacheStorage};
pub use classify::{ClassificationRule, PatternType, RequestClassifier, Strategy, UrlPattern};
pub use disk::DiskCacheStorage;
pub use lifecycle::{Client, Clients, Lifecycle, ServiceWorkerId, ServiceWorkerState};
pub use strategy::{cache_first, network_first, stale_while_revalidate, StrategyContext};
pub use worker::{ServiceWorker, ServiceWorkerEvent, WorkerMessage};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Unknown message: {0}")]
    UnknownMessage(String),
}

impl ServiceWorkerError {
    pub(crate) fn cache(message: impl std::fmt::Display) -> Self {
        Self::CacheError(message.to_string())
    }
}

/// Result type alias for service worker operations.
pub type SwResult<T> = Result<T, ServiceWorkerError>;
