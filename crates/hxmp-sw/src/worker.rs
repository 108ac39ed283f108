//! The service worker: lifecycle events, fetch interception and messages.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use hxmp_core::{AppConfig, WorkerConfig};
use hxmp_net::{CacheMode, Fetcher, Request, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::classify::{RequestClassifier, Strategy};
use crate::lifecycle::{Client, Clients, Lifecycle, ServiceWorkerId, ServiceWorkerState};
use crate::strategy::StrategyContext;
use crate::{ServiceWorkerError, SwResult};

/// Out-of-band commands a controlled page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Activate now instead of waiting for pages to close.
    SkipWaiting,
    /// Delete every cache in the store.
    ClearCache,
}

impl FromStr for WorkerMessage {
    type Err = ServiceWorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "clearCache" => Ok(Self::ClearCache),
            other => Err(ServiceWorkerError::UnknownMessage(other.to_string())),
        }
    }
}

/// Service worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A cache was deleted.
    CacheDeleted { name: String },
    /// Controller changed.
    ControllerChange { client_id: String },
}

/// A service worker for one origin and one application version.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: WorkerConfig,
    ctx: StrategyContext,
    classifier: RequestClassifier,
    lifecycle: RwLock<Lifecycle>,
    clients: RwLock<Clients>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorker {
    /// Create a worker for the version described by `config`.
    pub fn new(
        config: &AppConfig,
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = Self {
            id: ServiceWorkerId::new(),
            config: config.worker.clone(),
            ctx: StrategyContext::new(caches, fetcher, config.cache_name()),
            classifier: RequestClassifier::from_config(&config.worker),
            lifecycle: RwLock::new(Lifecycle::new()),
            clients: RwLock::new(Clients::new()),
            event_tx,
        };
        (worker, event_rx)
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    /// Name of the cache this worker writes to.
    pub fn cache_name(&self) -> &str {
        self.ctx.cache_name()
    }

    pub fn caches(&self) -> &Arc<dyn CacheStorage> {
        self.ctx.caches()
    }

    pub async fn state(&self) -> ServiceWorkerState {
        self.lifecycle.read().await.state()
    }

    /// Register an open page in the worker's scope.
    pub async fn add_client(&self, client: Client) {
        self.clients.write().await.add(client);
    }

    /// Number of pages this worker controls.
    pub async fn controlled_clients(&self) -> usize {
        self.clients.read().await.controlled_by(self.id).len()
    }

    async fn set_state(&self, state: ServiceWorkerState) -> SwResult<()> {
        self.lifecycle.write().await.transition(state)?;
        info!(worker = ?self.id, %state, "Service worker state changed");
        let _ = self.event_tx.send(ServiceWorkerEvent::StateChange {
            worker_id: self.id,
            new_state: state,
        });
        Ok(())
    }

    fn precache_requests(&self) -> SwResult<Vec<Request>> {
        self.config
            .precache
            .iter()
            .map(|path| {
                self.config
                    .origin
                    .join(path)
                    .map(|url| Request::get(url).with_cache_mode(CacheMode::Reload))
                    .map_err(|e| ServiceWorkerError::InstallFailed(format!("{path}: {e}")))
            })
            .collect()
    }

    /// Install: fetch the precache manifest fresh from the network and store
    /// it in the active cache, all or nothing. Requests skip-waiting on
    /// success; marks the worker redundant on failure.
    pub async fn install(&self) -> SwResult<()> {
        self.set_state(ServiceWorkerState::Installing).await?;

        match self.precache().await {
            Ok(count) => {
                info!(cache = %self.cache_name(), assets = count, "Precached assets");
                self.set_state(ServiceWorkerState::Installed).await?;
                self.lifecycle.write().await.request_skip_waiting();
                Ok(())
            }
            Err(e) => {
                error!(cache = %self.cache_name(), error = %e, "Install failed");
                self.set_state(ServiceWorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> SwResult<usize> {
        let requests = self.precache_requests()?;
        let fetcher = self.ctx.fetcher();

        let pairs = try_join_all(requests.into_iter().map(|request| async move {
            let response = fetcher
                .fetch(&request)
                .await
                .map_err(|e| ServiceWorkerError::NetworkError(format!("{}: {e}", request.url)))?;
            if !response.ok() {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{} answered {}",
                    request.url, response.status
                )));
            }
            Ok::<_, ServiceWorkerError>((request, response))
        }))
        .await?;

        let caches = self.caches();
        caches.open(self.cache_name()).await?;
        caches.put_all(self.cache_name(), &pairs).await?;
        Ok(pairs.len())
    }

    /// Activate: evict every managed cache except the active one, then take
    /// control of all open pages. Returns the names of the evicted caches.
    ///
    /// Eviction is best effort: a cache that cannot be listed or deleted is
    /// logged and left behind, and the worker still activates.
    pub async fn activate(&self) -> SwResult<Vec<String>> {
        self.set_state(ServiceWorkerState::Activating).await?;

        let names = match self.caches().keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches, skipping eviction");
                Vec::new()
            }
        };

        let mut evicted = Vec::new();
        for name in names
            .into_iter()
            .filter(|name| name.starts_with(&self.config.cache_prefix) && name != self.cache_name())
        {
            match self.caches().delete(&name).await {
                Ok(_) => {
                    info!(cache = %name, "Deleted old cache");
                    let _ = self
                        .event_tx
                        .send(ServiceWorkerEvent::CacheDeleted { name: name.clone() });
                    evicted.push(name);
                }
                Err(e) => warn!(cache = %name, error = %e, "Could not delete old cache"),
            }
        }

        self.claim_clients().await;
        self.set_state(ServiceWorkerState::Activated).await?;
        Ok(evicted)
    }

    async fn claim_clients(&self) {
        let claimed = self.clients.write().await.claim(self.id);
        for client_id in claimed {
            debug!(worker = ?self.id, client = %client_id, "Claimed client");
            let _ = self
                .event_tx
                .send(ServiceWorkerEvent::ControllerChange { client_id });
        }
    }

    /// Install, then activate immediately when skip-waiting was requested.
    pub async fn start(&self) -> SwResult<()> {
        self.install().await?;
        if self.lifecycle.read().await.ready_to_activate() {
            self.activate().await?;
        }
        Ok(())
    }

    /// Resume a worker whose version is already installed, as after a
    /// restart. When the active cache holds the whole precache manifest the
    /// worker activates without touching the network and `true` is returned.
    /// Otherwise nothing changes and [`start`](Self::start) is the way on.
    pub async fn resume(&self) -> SwResult<bool> {
        if !self.precache_complete().await? {
            debug!(cache = %self.cache_name(), "Active cache incomplete, cannot resume");
            return Ok(false);
        }

        self.set_state(ServiceWorkerState::Installing).await?;
        self.set_state(ServiceWorkerState::Installed).await?;
        self.activate().await?;
        info!(cache = %self.cache_name(), "Resumed from existing cache");
        Ok(true)
    }

    async fn precache_complete(&self) -> SwResult<bool> {
        let caches = self.caches();
        if !caches.has(self.cache_name()).await? {
            return Ok(false);
        }
        for request in self.precache_requests()? {
            if caches.match_in(self.cache_name(), &request).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Skip the waiting phase: activates now if installed.
    pub async fn skip_waiting(&self) -> SwResult<()> {
        let ready = {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.request_skip_waiting();
            lifecycle.ready_to_activate()
        };
        if ready {
            self.activate().await?;
        }
        Ok(())
    }

    /// Delete every cache in the store. Returns the deleted names.
    pub async fn clear_caches(&self) -> SwResult<Vec<String>> {
        let names = self.caches().keys().await?;
        for name in &names {
            self.caches().delete(name).await?;
            let _ = self
                .event_tx
                .send(ServiceWorkerEvent::CacheDeleted { name: name.clone() });
        }
        info!(count = names.len(), "Cleared all caches");
        Ok(names)
    }

    /// Handle a message posted by a page. Unknown messages are ignored.
    pub async fn handle_message(&self, data: &str) -> SwResult<()> {
        match data.parse::<WorkerMessage>() {
            Ok(WorkerMessage::SkipWaiting) => self.skip_waiting().await,
            Ok(WorkerMessage::ClearCache) => self.clear_caches().await.map(|_| ()),
            Err(e) => {
                debug!(error = %e, "Ignoring message");
                Ok(())
            }
        }
    }

    /// Strategy for `request`, or `None` when the worker does not intercept
    /// it (non-GET or cross-origin).
    pub fn route(&self, request: &Request) -> Option<Strategy> {
        if !request.is_get() {
            trace!(url = %request.url, method = %request.method, "Passing through non-GET request");
            return None;
        }
        if !request.is_same_origin(&self.config.origin) {
            trace!(url = %request.url, "Passing through cross-origin request");
            return None;
        }
        Some(self.classifier.classify(&request.url))
    }

    /// Handle a fetch event.
    ///
    /// `None` means the worker did not intercept and the caller performs the
    /// request itself. Intercepted requests always resolve, to the offline
    /// response at worst. The strategy runs as its own task, so dropping the
    /// returned future does not cancel pending cache writes.
    pub async fn handle_fetch(&self, request: Request) -> Option<Response> {
        if self.state().await != ServiceWorkerState::Activated {
            trace!(url = %request.url, "Worker not active, not intercepting");
            return None;
        }

        let strategy = self.route(&request)?;
        debug!(url = %request.url, %strategy, "Intercepted request");

        let ctx = self.ctx.clone();
        let url = request.url.clone();
        let task = tokio::spawn(async move { ctx.resolve(strategy, &request).await });

        Some(match task.await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Strategy task failed");
                Response::offline()
            }
        })
    }

    /// Origin this worker intercepts.
    pub fn origin(&self) -> &Url {
        &self.config.origin
    }
}
