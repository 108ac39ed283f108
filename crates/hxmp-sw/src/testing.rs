//! Scripted fetchers for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use hxmp_net::{Fetcher, NetError, Request, Response};
use tokio::sync::Notify;

/// Answers from a route table, counts calls, and can be taken offline.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for `gate` to be notified before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn route(&self, url: &str, body: &str) {
        self.route_status(url, StatusCode::OK, body);
    }

    pub fn route_status(&self, url: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("network unreachable".to_string()));
        }

        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(match route {
            Some((status, body)) => Response::new(status, body),
            None => Response::new(StatusCode::NOT_FOUND, "not found"),
        })
    }
}
