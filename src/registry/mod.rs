// src/registry/mod.rs
//! The authoritative, mutable list of backends. Owns the single
//! readers-writer lock that guards the backend vector, the currently
//! installed strategy (reached through one atomically-swapped pointer so
//! its hooks are always consistent), and the reqwest client used for both
//! upstream proxying and health probes.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendView};
use crate::config::BackendInfo;
use crate::health::HealthMonitor;
use crate::metrics::MetricsCollector;
use crate::proxy::{self, ProxyError};
use crate::strategy::Strategy;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("backend {0}:{1} already registered")]
    DuplicateBackend(String, u16),
}

pub struct BackendRegistry {
    backends: RwLock<Vec<Arc<Backend>>>,
    strategy: ArcSwap<dyn Strategy>,
    client: reqwest::Client,
    // Set once, after construction, by whoever wires the monitor up.
    // A `Weak` would be equally correct here, but the registry legitimately
    // owns the monitor's lifetime in this process (it outlives every
    // individual request); the monitor holds the `Weak` back-reference.
    monitor: OnceLock<Arc<HealthMonitor>>,
    // Unset when the ambient metrics server isn't enabled in configuration.
    metrics: OnceLock<Arc<MetricsCollector>>,
}

impl BackendRegistry {
    pub fn new(infos: &[BackendInfo], strategy: Arc<dyn Strategy>, client: reqwest::Client) -> Self {
        let backends = infos.iter().map(|info| Arc::new(Backend::new(info))).collect();
        Self {
            backends: RwLock::new(backends),
            strategy: ArcSwap::from(strategy),
            client,
            monitor: OnceLock::new(),
            metrics: OnceLock::new(),
        }
    }

    /// Wires up the health monitor this registry reports dead backends to.
    /// Called once at startup, after both have been constructed.
    pub fn attach_monitor(&self, monitor: Arc<HealthMonitor>) {
        let _ = self.monitor.set(monitor);
    }

    /// Wires up the Prometheus collector backend requests and circuit
    /// breaker transitions are reported to. A no-op if metrics are disabled.
    pub fn attach_metrics(&self, metrics: Arc<MetricsCollector>) {
        let _ = self.metrics.set(metrics);
    }

    pub fn current_strategy(&self) -> Arc<dyn Strategy> {
        self.strategy.load_full()
    }

    pub fn set_strategy(&self, strategy: Arc<dyn Strategy>) {
        self.strategy.store(strategy);
    }

    pub async fn len(&self) -> usize {
        self.backends.read().await.len()
    }

    /// An ordered, read-only snapshot of the current backends.
    pub async fn get_backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().await.clone()
    }

    pub async fn views(&self) -> Vec<BackendView> {
        self.backends
            .read()
            .await
            .iter()
            .map(|b| BackendView::from(b.as_ref()))
            .collect()
    }

    /// Appends all `infos` in order. Fails without mutating anything if any
    /// entry's `(host, port)` matches an existing backend.
    pub async fn add_backends(&self, infos: &[BackendInfo]) -> Result<(), RegistryError> {
        let mut backends = self.backends.write().await;
        for info in infos {
            if backends.iter().any(|b| b.matches_info(info)) {
                return Err(RegistryError::DuplicateBackend(info.host.clone(), info.port));
            }
        }
        for info in infos {
            backends.push(Arc::new(Backend::new(info)));
        }
        Ok(())
    }

    /// Removes every backend matching an entry in `infos`, silently
    /// ignoring absent ones. Returns the removed indices, sorted ascending,
    /// in the *pre-removal* numbering — strategies depend on this ordering
    /// to keep their index-keyed auxiliary state in sync.
    pub async fn remove_backends(&self, infos: &[BackendInfo]) -> Vec<usize> {
        let mut backends = self.backends.write().await;
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(backends.len());

        for (i, backend) in backends.drain(..).enumerate() {
            if infos.iter().any(|info| backend.matches_info(info)) {
                removed.push(i);
                if let Some(monitor) = self.monitor.get() {
                    monitor.forget(&backend.id);
                }
            } else {
                kept.push(backend);
            }
        }

        *backends = kept;
        removed
    }

    /// Flips the backend at `index` dead and, if this was a genuine
    /// alive -> dead transition, asks the monitor to start a recovery task.
    pub async fn report_dead(&self, index: usize) {
        let backends = self.backends.read().await;
        if let Some(backend) = backends.get(index) {
            self.mark_dead_and_notify(backend);
        }
    }

    pub async fn report_alive(&self, index: usize) {
        let backends = self.backends.read().await;
        if let Some(backend) = backends.get(index) {
            if backend.mark_alive() {
                if let Some(metrics) = self.metrics.get() {
                    metrics.update_backend_health(&backend.id, true);
                }
            }
        }
    }

    fn mark_dead_and_notify(&self, backend: &Arc<Backend>) {
        if backend.mark_dead() {
            if let Some(metrics) = self.metrics.get() {
                metrics.update_backend_health(&backend.id, false);
            }
            if let Some(monitor) = self.monitor.get() {
                monitor.start_recovery(backend.clone());
            }
        }
    }

    /// Issues HTTP HEAD probes against every currently-live backend, under
    /// one read-lock hold for the whole scan (probes are short and
    /// bounded; a concurrent add/remove simply waits for the pass to
    /// finish). A failed probe marks that backend dead.
    pub async fn heartbeat_scan(&self) {
        let backends = self.backends.read().await;
        for backend in backends.iter() {
            if !backend.is_alive() {
                continue;
            }
            if !proxy::probe_head(&self.client, &backend.url).await {
                self.mark_dead_and_notify(backend);
            }
        }
    }

    /// Proxies `req` to `backends[index]`. The registry read-lock is held
    /// for the entire call, including the upstream I/O — matching the
    /// contract that `serve` observes a registry snapshot that cannot be
    /// mutated out from under it mid-flight.
    pub async fn serve(
        &self,
        index: usize,
        req: hyper::Request<hyper::Body>,
    ) -> Result<hyper::Response<hyper::Body>, ProxyError> {
        // Held for the whole call, including the upstream I/O below: a
        // `serve` in flight must observe a registry that cannot be mutated
        // out from under it.
        let backends = self.backends.read().await;
        let backend = backends
            .get(index)
            .ok_or(ProxyError::InvalidIndex(index))?
            .clone();

        if !backend.circuit_breaker.call_permitted().await {
            return Err(ProxyError::CircuitOpen(index));
        }

        let strategy = self.strategy.load_full();
        strategy.on_connection_start(index);
        backend.increment_active_connections();

        let req = strategy.modify_request(index, req);

        let start = Instant::now();
        let result = proxy::forward(&self.client, &backend.url, req).await;
        let elapsed = start.elapsed();

        backend.decrement_active_connections();
        strategy.on_connection_end(index);
        backend.record_request(result.is_ok());

        if let Some(metrics) = self.metrics.get() {
            metrics.record_backend_request(&backend.id, result.is_ok(), elapsed);
            metrics.update_backend_connections(&backend.id, backend.active_connections() as i64);
        }

        match &result {
            Ok(_) => {
                backend.circuit_breaker.record_success().await;
                strategy.record_latency(index, elapsed);
            }
            Err(_) => backend.circuit_breaker.record_failure().await,
        }

        if let Some(metrics) = self.metrics.get() {
            metrics.update_circuit_breaker_state(&backend.id, backend.circuit_breaker.get_state().await);
        }

        result
    }
}
