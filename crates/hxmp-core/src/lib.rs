//! HXMP Core Library
//!
//! This crate provides shared configuration, errors, release records and
//! logging setup for the HXMP Space caching layer.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{AppConfig, ReleaseConfig, StorageConfig, WorkerConfig};
pub use error::{HxmpError, HxmpResult};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use types::{now_millis, DeployInfo, VersionRecord};
