//! Worker lifecycle states and the pages a worker controls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hashbrown::HashMap;
use url::Url;

use crate::{ServiceWorkerError, SwResult};

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Initial state, nothing installed yet.
    #[default]
    Parsed,
    /// Installing (precache running).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (old caches being evicted).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (install failed or replaced).
    Redundant,
}

impl ServiceWorkerState {
    /// Whether the lifecycle may move from `self` to `next`.
    pub fn can_transition_to(self, next: ServiceWorkerState) -> bool {
        use ServiceWorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Installing | Installed | Activating | Activated, Redundant)
        )
    }
}

impl fmt::Display for ServiceWorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceWorkerState::Parsed => "parsed",
            ServiceWorkerState::Installing => "installing",
            ServiceWorkerState::Installed => "installed",
            ServiceWorkerState::Activating => "activating",
            ServiceWorkerState::Activated => "activated",
            ServiceWorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Lifecycle bookkeeping of one worker.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ServiceWorkerState,
    state_changed_at: Instant,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> ServiceWorkerState {
        self.state
    }

    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: ServiceWorkerState) -> SwResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot move from {} to {}",
                self.state, next
            )));
        }
        self.state = next;
        self.state_changed_at = Instant::now();
        Ok(())
    }

    /// Request activation without waiting for controlled pages to close.
    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Installed and allowed to activate right away.
    pub fn ready_to_activate(&self) -> bool {
        self.state == ServiceWorkerState::Installed && self.skip_waiting
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Clients ====================

/// A client (open page in the worker's scope).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Worker currently controlling this page, if any.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Make `worker` the controller of every client. Returns the IDs whose
    /// controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> Vec<String> {
        self.clients
            .values_mut()
            .filter(|c| c.controller != Some(worker))
            .map(|c| {
                c.controller = Some(worker);
                c.id.clone()
            })
            .collect()
    }

    /// Clients controlled by `worker`.
    pub fn controlled_by(&self, worker: ServiceWorkerId) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut lifecycle = Lifecycle::new();
        for state in [
            ServiceWorkerState::Installing,
            ServiceWorkerState::Installed,
            ServiceWorkerState::Activating,
            ServiceWorkerState::Activated,
        ] {
            lifecycle.transition(state).unwrap();
        }
        assert_eq!(lifecycle.state(), ServiceWorkerState::Activated);
    }

    #[test]
    fn test_rejects_skipping_install() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.transition(ServiceWorkerState::Activating).is_err());
        assert_eq!(lifecycle.state(), ServiceWorkerState::Parsed);
    }

    #[test]
    fn test_redundant_is_terminal() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(ServiceWorkerState::Installing).unwrap();
        lifecycle.transition(ServiceWorkerState::Redundant).unwrap();
        assert!(lifecycle.transition(ServiceWorkerState::Installing).is_err());
    }

    #[test]
    fn test_ready_to_activate() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(ServiceWorkerState::Installing).unwrap();
        lifecycle.transition(ServiceWorkerState::Installed).unwrap();
        assert!(!lifecycle.ready_to_activate());

        lifecycle.request_skip_waiting();
        assert!(lifecycle.ready_to_activate());
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut clients = Clients::new();
        clients.add(Client::new("a", Url::parse("https://hxmp.space/").unwrap()));
        clients.add(Client::new("b", Url::parse("https://hxmp.space/xrhome.html").unwrap()));

        let worker = ServiceWorkerId::new();
        let mut changed = clients.claim(worker);
        changed.sort();
        assert_eq!(changed, vec!["a", "b"]);
        assert!(clients.claim(worker).is_empty());
        assert_eq!(clients.controlled_by(worker).len(), 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceWorkerState::Installed.to_string(), "installed");
    }
}
