//! Deployment detection ("cache busting").
//!
//! On every page load the registry compares the version record stored in page
//! storage with the record of the running build. Any difference means a new
//! deployment: caches and non-preserved storage are purged, the new record is
//! stored, and when the application version itself changed the page is
//! reloaded so every asset comes from the new build. A record that cannot be
//! stored suppresses the reload.

use hxmp_core::VersionRecord;
use tracing::{debug, error, info, warn};

use crate::context::PageContext;
use crate::PageResult;

/// Version record as found in page storage. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredVersion {
    pub app_version: Option<String>,
    /// Decimal string, as stored.
    pub build_timestamp: Option<String>,
}

impl StoredVersion {
    /// Whether this is exactly `record`.
    pub fn matches(&self, record: &VersionRecord) -> bool {
        self.app_version.as_deref() == Some(record.app_version.as_str())
            && self.build_timestamp.as_deref() == Some(record.build_timestamp.to_string().as_str())
    }
}

/// Outcome of [`VersionRegistry::check_version`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Stored record equals the running build.
    Unchanged,
    /// Nothing stored yet. Purged and recorded, no reload.
    FirstVisit,
    /// Same version, new build timestamp. Purged and recorded, no reload.
    Rebuilt,
    /// Version changed. Purged, recorded and reloaded.
    Upgraded { from: String },
    /// Purged, but the new record could not be stored. Never reloads, since
    /// the reloaded page would detect the same change again.
    Unrecorded,
    /// Storage could not be read; nothing was done.
    Unavailable,
}

impl VersionCheck {
    pub fn reloaded(&self) -> bool {
        matches!(self, VersionCheck::Upgraded { .. })
    }
}

/// What a purge removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub caches: Vec<String>,
    pub keys: Vec<String>,
}

/// Tracks the application version across deployments.
pub struct VersionRegistry {
    ctx: PageContext,
    current: VersionRecord,
}

impl VersionRegistry {
    pub fn new(ctx: PageContext) -> Self {
        let current = ctx.config.current_version();
        Self { ctx, current }
    }

    /// Record of the running build.
    pub fn current(&self) -> &VersionRecord {
        &self.current
    }

    pub fn context(&self) -> &PageContext {
        &self.ctx
    }

    /// Read the stored record.
    pub fn stored(&self) -> PageResult<StoredVersion> {
        let keys = &self.ctx.config.storage;
        Ok(StoredVersion {
            app_version: self.ctx.storage.get(&keys.version_key)?,
            build_timestamp: self.ctx.storage.get(&keys.timestamp_key)?,
        })
    }

    fn persist(&self) -> PageResult<()> {
        let keys = &self.ctx.config.storage;
        self.ctx
            .storage
            .set(&keys.version_key, &self.current.app_version)?;
        self.ctx
            .storage
            .set(&keys.timestamp_key, &self.current.build_timestamp.to_string())?;
        Ok(())
    }

    /// Detect a new deployment and react to it.
    ///
    /// Never fails: purge and storage errors are logged and the check
    /// carries on with what it could do.
    pub async fn check_version(&self) -> VersionCheck {
        let stored = match self.stored() {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "Could not read stored version");
                return VersionCheck::Unavailable;
            }
        };

        if stored.matches(&self.current) {
            debug!(version = %self.current.app_version, "Version unchanged");
            return VersionCheck::Unchanged;
        }

        info!(
            stored = ?stored.app_version,
            current = %self.current.app_version,
            build = self.current.build_timestamp,
            "New version detected, clearing cache"
        );

        // Purge before persisting, otherwise the purge would drop the new record.
        if let Err(e) = self.clear_cache().await {
            error!(error = %e, "Error clearing cache");
        }
        if let Err(e) = self.persist() {
            error!(error = %e, "Could not store version record, not reloading");
            return VersionCheck::Unrecorded;
        }

        // An empty stored version counts as none.
        match stored.app_version.filter(|v| !v.is_empty()) {
            None => VersionCheck::FirstVisit,
            Some(previous) if previous == self.current.app_version => VersionCheck::Rebuilt,
            Some(previous) => {
                info!(from = %previous, to = %self.current.app_version, "Reloading for new version");
                self.ctx.reloader.reload();
                VersionCheck::Upgraded { from: previous }
            }
        }
    }

    /// Whether purging leaves `key` in place.
    pub fn is_preserved(&self, key: &str) -> bool {
        let storage = &self.ctx.config.storage;
        storage.preserve_keys.iter().any(|k| k == key)
            || storage.preserve_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Delete every named cache and every storage key that is not preserved.
    ///
    /// Without a cache facility only storage is purged.
    pub async fn clear_cache(&self) -> PageResult<PurgeReport> {
        let mut report = PurgeReport::default();

        match &self.ctx.caches {
            Some(caches) => {
                for name in caches.keys().await? {
                    if caches.delete(&name).await? {
                        report.caches.push(name);
                    }
                }
                debug!(count = report.caches.len(), "Caches cleared");
            }
            None => warn!("No cache facility, clearing storage only"),
        }

        for key in self.ctx.storage.keys()? {
            if !self.is_preserved(&key) && self.ctx.storage.remove(&key)? {
                report.keys.push(key);
            }
        }

        info!(
            caches = report.caches.len(),
            keys = report.keys.len(),
            "Cache cleared successfully"
        );
        Ok(report)
    }
}
