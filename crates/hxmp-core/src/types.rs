//! Release records shared between the page, the worker and deployment tooling

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Application version and build timestamp of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub app_version: String,
    /// Milliseconds since the Unix epoch.
    pub build_timestamp: i64,
}

impl VersionRecord {
    pub fn new(app_version: impl Into<String>, build_timestamp: i64) -> Self {
        Self {
            app_version: app_version.into(),
            build_timestamp,
        }
    }

    /// Query value appended to versioned asset URLs (`<version>-<timestamp>`).
    pub fn asset_tag(&self) -> String {
        format!("{}-{}", self.app_version, self.build_timestamp)
    }
}

/// Deployment metadata written next to the site by `hxmp-deploy pre-deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployInfo {
    pub version: String,
    pub timestamp: i64,
    /// RFC 3339 rendering of `timestamp`.
    pub date: String,
    pub environment: String,
}

impl DeployInfo {
    pub fn new(record: &VersionRecord, environment: impl Into<String>) -> Self {
        let date = DateTime::<Utc>::from_timestamp_millis(record.build_timestamp)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        Self {
            version: record.app_version.clone(),
            timestamp: record.build_timestamp,
            date,
            environment: environment.into(),
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
