//! Application configuration

use crate::error::{HxmpError, HxmpResult};
use crate::types::VersionRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Top-level configuration, usually read from `hxmp.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Version of the current build
    pub release: ReleaseConfig,

    /// Service worker settings
    pub worker: WorkerConfig,

    /// Page-level key-value storage settings
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Semantic version of the application
    pub app_version: String,

    /// Build timestamp (ms since epoch), stamped by `hxmp-deploy pre-deploy`
    pub build_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Prefix shared by every cache this worker manages
    pub cache_prefix: String,

    /// Origin the worker controls
    pub origin: Url,

    /// Root-relative URLs fetched into the cache at install time
    pub precache: Vec<String>,

    /// Path substrings served network-first
    pub network_first: Vec<String>,

    /// File extensions (without the dot) served cache-first
    pub cache_first_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key holding the stored application version
    pub version_key: String,

    /// Key holding the stored build timestamp
    pub timestamp_key: String,

    /// Key holding the serialized session state
    pub session_key: String,

    /// Keys that survive a full purge
    pub preserve_keys: Vec<String>,

    /// Key prefixes that survive a full purge (identity provider keys)
    pub preserve_prefixes: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> HxmpResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), version = %config.release.app_version, "Loaded configuration");
        Ok(config)
    }

    /// Write configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> HxmpResult<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> HxmpResult<()> {
        if self.release.app_version.trim().is_empty() {
            return Err(HxmpError::version("release.app_version must not be empty"));
        }
        if self.worker.cache_prefix.is_empty() {
            return Err(HxmpError::config("worker.cache_prefix must not be empty"));
        }
        if let Some(url) = self.worker.precache.iter().find(|u| !u.starts_with('/')) {
            return Err(HxmpError::config(format!(
                "precache entry must be root-relative: {url}"
            )));
        }
        Ok(())
    }

    /// Version record of the running build.
    pub fn current_version(&self) -> VersionRecord {
        VersionRecord::new(&self.release.app_version, self.release.build_timestamp)
    }

    /// Name of the active cache, e.g. `hxmp-space-v1.0.0`.
    pub fn cache_name(&self) -> String {
        format!("{}v{}", self.worker.cache_prefix, self.release.app_version)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            release: ReleaseConfig::default(),
            worker: WorkerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            app_version: "1.0.0".to_string(),
            build_timestamp: 0,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "hxmp-space-".to_string(),
            origin: Url::parse("http://localhost:8080/").expect("static origin"),
            precache: strings(&[
                "/",
                "/index.html",
                "/xrhome.html",
                "/auth-gateway.html",
                "/assets/xr2.png",
                "/floating-nav.css",
                "/floating-nav.js",
            ]),
            network_first: strings(&["/api/", "/auth-", "/admin-", "/supabase-config.js"]),
            cache_first_extensions: strings(&[
                "js", "css", "png", "jpg", "jpeg", "svg", "gif", "woff", "woff2",
            ]),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            version_key: "appVersion".to_string(),
            timestamp_key: "buildTimestamp".to_string(),
            session_key: "sessionState".to_string(),
            preserve_keys: strings(&[
                "userLoggedIn",
                "guestMode",
                "ageVerified",
                "supabaseSession",
                "sessionState",
            ]),
            preserve_prefixes: strings(&["sb-"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
