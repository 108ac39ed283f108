//! # HXMP Page
//!
//! The page side of the HXMP Space caching layer: detects deployments,
//! purges stale caches and storage, and tracks who may see which page.
//!
//! ## Architecture
//!
//! ```text
//! PageContext
//!     ├── KeyValueStore (page storage: memory or JSON file)
//!     ├── CacheStorage (optional, shared with the service worker)
//!     ├── Reloader (forces a fresh page load)
//!     └── AppConfig
//!
//! VersionRegistry ── check_version / clear_cache
//! SessionStore ── SessionState ── needs_gateway
//! ```

use hxmp_sw::ServiceWorkerError;
use thiserror::Error;

pub mod assets;
pub mod context;
pub mod session;
pub mod storage;
pub mod version;

pub use assets::stamp_asset_url;
pub use context::{PageContext, Reloader};
pub use session::{needs_gateway, SessionEvent, SessionState, SessionStore, AUTH_PAGES};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use version::{PurgeReport, StoredVersion, VersionCheck, VersionRegistry};

/// Errors that can occur in page-side operations.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] ServiceWorkerError),
}

/// Result type alias for page-side operations.
pub type PageResult<T> = Result<T, PageError>;
