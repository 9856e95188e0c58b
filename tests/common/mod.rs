//! Shared test helpers: a scripted in-memory network

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shellcache::network::{Network, NetworkError};
use shellcache::{Request, Response};

/// Network that answers from a fixed table of URLs
///
/// Unknown URLs answer 404. The network can be switched offline, and can be
/// told to fail the next few requests.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    fail_next: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `body` with status 200 at `url`
    pub fn serve(&self, url: &str, body: &str) {
        self.serve_status(url, 200, body);
    }

    pub fn serve_status(&self, url: &str, status: u16, body: &str) {
        let response = Response::new(status, body.to_string(), url);
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `n` requests fail as unreachable
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of requests seen for `url`, including failed ones
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline);
        }
        let pending_failures = self.fail_next.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next.store(pending_failures - 1, Ordering::SeqCst);
            return Err(NetworkError::Unreachable {
                url,
                reason: "scripted failure".to_string(),
            });
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found", url.as_str())))
    }
}
