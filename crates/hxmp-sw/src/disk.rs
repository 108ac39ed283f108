//! Persistent cache storage: one JSON file per cache under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hxmp_net::{Request, Response};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::cache::{Cache, CacheEntry, CacheStorage};
use crate::{ServiceWorkerError, SwResult};

const EXTENSION: &str = "json";

/// [`CacheStorage`] persisted to disk.
///
/// Each cache lives in `<root>/<name>.json`. Writes rewrite the whole file and
/// are serialized through one lock, so put/match stay atomic per key.
#[derive(Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl DiskCacheStorage {
    /// Open (and create) the storage directory.
    pub async fn open_dir(root: impl Into<PathBuf>) -> SwResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(ServiceWorkerError::cache)?;
        debug!(root = %root.display(), "Disk cache storage opened");
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> SwResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', ':']);
        if !valid {
            return Err(ServiceWorkerError::CacheError(format!(
                "invalid cache name: {name:?}"
            )));
        }
        Ok(self.root.join(format!("{name}.{EXTENSION}")))
    }

    async fn read(&self, name: &str) -> SwResult<Option<Cache>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(ServiceWorkerError::cache),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServiceWorkerError::cache(e)),
        }
    }

    async fn write(&self, cache: &Cache) -> SwResult<()> {
        let path = self.path_for(&cache.name)?;
        let tmp = path.with_extension("tmp");
        let raw = serde_json::to_vec(cache).map_err(ServiceWorkerError::cache)?;

        tokio::fs::write(&tmp, raw)
            .await
            .map_err(ServiceWorkerError::cache)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(ServiceWorkerError::cache)?;

        trace!(cache = %cache.name, entries = cache.len(), "Cache written");
        Ok(())
    }

    /// Cache names in lexical order.
    async fn list(&self) -> SwResult<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(ServiceWorkerError::cache)?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(ServiceWorkerError::cache)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> SwResult<()> {
        let _guard = self.lock.lock().await;
        if self.read(name).await?.is_none() {
            self.write(&Cache::new(name)).await?;
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> SwResult<bool> {
        let path = self.path_for(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(ServiceWorkerError::cache)
    }

    async fn delete(&self, name: &str) -> SwResult<bool> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ServiceWorkerError::cache(e)),
        }
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.list().await
    }

    async fn put(&self, cache_name: &str, request: &Request, response: &Response) -> SwResult<()> {
        let entry = CacheEntry::new(request, response)?;
        let _guard = self.lock.lock().await;
        let mut cache = self
            .read(cache_name)
            .await?
            .unwrap_or_else(|| Cache::new(cache_name));
        cache.put(entry);
        self.write(&cache).await
    }

    async fn put_all(&self, cache_name: &str, pairs: &[(Request, Response)]) -> SwResult<()> {
        let entries = pairs
            .iter()
            .map(|(request, response)| CacheEntry::new(request, response))
            .collect::<SwResult<Vec<_>>>()?;

        let _guard = self.lock.lock().await;
        let mut cache = self
            .read(cache_name)
            .await?
            .unwrap_or_else(|| Cache::new(cache_name));
        for entry in entries {
            cache.put(entry);
        }
        self.write(&cache).await
    }

    async fn match_in(&self, cache_name: &str, request: &Request) -> SwResult<Option<Response>> {
        let _guard = self.lock.lock().await;
        let key = request.cache_key();
        Ok(self
            .read(cache_name)
            .await?
            .and_then(|cache| cache.match_request(&key).map(CacheEntry::to_response)))
    }

    async fn match_request(&self, request: &Request) -> SwResult<Option<Response>> {
        let _guard = self.lock.lock().await;
        let key = request.cache_key();
        for name in self.list().await? {
            if let Some(cache) = self.read(&name).await? {
                if let Some(entry) = cache.match_request(&key) {
                    return Ok(Some(entry.to_response()));
                }
            }
        }
        Ok(None)
    }
}
