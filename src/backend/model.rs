// src/backend/model.rs
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

use url::Url;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::BackendInfo;

/// A single upstream server the balancer may forward requests to.
///
/// Identity is `(host, port)` only — the derived `url` and the runtime
/// liveness/metrics state are not part of equality.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub url: Url,

    // `alive` gets its own tiny RW-lock rather than living behind the
    // registry's lock: readers (the heartbeat loop, every strategy's
    // `select`) must never block on registry mutation, and writers never
    // need to touch anything else.
    alive: RwLock<bool>,

    active_connections: AtomicUsize,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,

    pub circuit_breaker: CircuitBreaker,
}

impl Backend {
    pub fn new(info: &BackendInfo) -> Self {
        Self {
            id: format!("{}:{}", info.host, info.port),
            host: info.host.clone(),
            port: info.port,
            url: info.url.clone(),
            alive: RwLock::new(true),
            active_connections: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    /// Identity comparison: host and port only, matching the data model's
    /// equality contract.
    pub fn identity_eq(&self, other: &Backend) -> bool {
        self.host == other.host && self.port == other.port
    }

    pub fn matches_info(&self, info: &BackendInfo) -> bool {
        self.host == info.host && self.port == info.port
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.read().expect("backend liveness lock poisoned")
    }

    /// Flips this backend to dead. Returns `true` if this was a genuine
    /// alive -> dead transition (idempotent otherwise).
    pub fn mark_dead(&self) -> bool {
        let mut guard = self.alive.write().expect("backend liveness lock poisoned");
        if *guard {
            *guard = false;
            true
        } else {
            false
        }
    }

    /// Flips this backend to alive. Returns `true` if this was a genuine
    /// dead -> alive transition.
    pub fn mark_alive(&self) -> bool {
        let mut guard = self.alive.write().expect("backend liveness lock poisoned");
        if !*guard {
            *guard = true;
            true
        } else {
            false
        }
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_active_connections(&self) -> usize {
        self.active_connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> BackendMetrics {
        BackendMetrics {
            active_connections: self.active_connections(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackendMetrics {
    pub active_connections: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
}

/// The control-plane's external view of a backend.
///
/// NB: `port` is serialized as a *string*, matching a quirk preserved from
/// the source's hand-rolled JSON encoder — this is kept for API
/// compatibility, not corrected.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BackendView {
    pub host: String,
    pub port: String,
    pub alive: bool,
}

impl From<&Backend> for BackendView {
    fn from(b: &Backend) -> Self {
        Self {
            host: b.host.clone(),
            port: b.port.to_string(),
            alive: b.is_alive(),
        }
    }
}
