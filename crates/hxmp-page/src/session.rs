//! Session state of the page: signed-in user, time-boxed guest or nobody.
//!
//! The state is one JSON value in page storage, so every tab sees the same
//! state and guest expiry is a single timestamp. Time is always passed in by
//! the caller (milliseconds since the epoch, server time where available).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::KeyValueStore;
use crate::PageResult;

/// Pages reachable without a permitted session.
pub const AUTH_PAGES: &[&str] = &[
    "auth-gateway.html",
    "auth-login.html",
    "auth-signup.html",
    "index.html",
];

/// Who is using the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Anonymous,
    #[serde(rename_all = "camelCase")]
    Authenticated { user_id: String },
    #[serde(rename_all = "camelCase")]
    GuestActive { expires_at: i64 },
    /// Guest time ran out. Only a sign-in leaves this state.
    GuestExpired,
}

/// Facts that move the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    SignedOut,
    GuestStarted { duration_ms: i64 },
    /// Re-evaluate guest expiry.
    Tick,
}

impl SessionState {
    /// Next state after `event` at time `now`.
    pub fn transition(&self, event: &SessionEvent, now: i64) -> SessionState {
        use SessionState::*;

        let next = match (self, event) {
            (_, SessionEvent::SignedIn { user_id }) => Authenticated {
                user_id: user_id.clone(),
            },
            (GuestExpired, _) => GuestExpired,
            (_, SessionEvent::SignedOut) => Anonymous,
            (Anonymous, SessionEvent::GuestStarted { duration_ms }) => GuestActive {
                expires_at: now.saturating_add(*duration_ms),
            },
            (state, SessionEvent::GuestStarted { .. }) | (state, SessionEvent::Tick) => {
                state.clone()
            }
        };

        match next {
            GuestActive { expires_at } if now >= expires_at => GuestExpired,
            next => next,
        }
    }

    /// Whether the session may see pages outside [`AUTH_PAGES`].
    pub fn is_permitted(&self, now: i64) -> bool {
        match self {
            SessionState::Authenticated { .. } => true,
            SessionState::GuestActive { expires_at } => now < *expires_at,
            SessionState::Anonymous | SessionState::GuestExpired => false,
        }
    }
}

/// Whether `path` must be redirected to the auth gateway for `state`.
///
/// Auth pages never redirect. The site root counts as `index.html`.
pub fn needs_gateway(path: &str, state: &SessionState, now: i64) -> bool {
    let page = match path.rsplit('/').next() {
        Some("") | None => "index.html",
        Some(page) => page,
    };
    !AUTH_PAGES.contains(&page) && !state.is_permitted(now)
}

/// Session state persisted in page storage.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Current state at `now`. Missing or unreadable values are `Anonymous`.
    /// A guest session found expired is stored as such.
    pub fn load(&self, now: i64) -> PageResult<SessionState> {
        let stored = match self.storage.get(&self.key)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = %self.key, error = %e, "Discarding unreadable session state");
                SessionState::Anonymous
            }),
            None => SessionState::Anonymous,
        };

        let current = stored.transition(&SessionEvent::Tick, now);
        if current != stored {
            info!("Guest session expired");
            self.save(&current)?;
        }
        Ok(current)
    }

    /// Apply `event` at `now` and persist the result.
    pub fn apply(&self, event: &SessionEvent, now: i64) -> PageResult<SessionState> {
        let next = self.load(now)?.transition(event, now);
        self.save(&next)?;
        debug!(?event, state = ?next, "Session updated");
        Ok(next)
    }

    fn save(&self, state: &SessionState) -> PageResult<()> {
        let raw = serde_json::to_string(state).map_err(crate::StorageError::from)?;
        self.storage.set(&self.key, &raw)?;
        Ok(())
    }
}
