// src/health/mod.rs
//! Passive and active backend health detection: a 15-second heartbeat loop
//! over every live backend, and one detached recovery task per dead
//! backend that probes with exponentially increasing intervals (5s..=10s)
//! until the backend answers again.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;

use crate::backend::Backend;
use crate::metrics::MetricsCollector;
use crate::proxy;
use crate::registry::BackendRegistry;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const INITIAL_DEAD_INTERVAL: Duration = Duration::from_secs(5);
const MAX_DEAD_INTERVAL: Duration = Duration::from_secs(10);

/// Holds a `Weak` back-reference to the registry it monitors — a relation,
/// not ownership, so a stray recovery task can never keep the registry
/// alive past the process's real shutdown.
pub struct HealthMonitor {
    registry: Weak<BackendRegistry>,
    client: reqwest::Client,
    // Presence of an entry means "a recovery task for this backend id is
    // currently running". The dead-check task treats its own removal
    // (backend removed from the registry) as a cancellation signal.
    dead: DashMap<String, ()>,
    metrics: std::sync::OnceLock<Arc<MetricsCollector>>,
}

impl HealthMonitor {
    pub fn new(registry: Weak<BackendRegistry>, client: reqwest::Client) -> Arc<Self> {
        Arc::new(Self {
            registry,
            client,
            dead: DashMap::new(),
            metrics: std::sync::OnceLock::new(),
        })
    }

    /// Wires up the Prometheus collector recovered backends are reported to.
    /// A no-op if metrics are disabled.
    pub fn attach_metrics(&self, metrics: Arc<MetricsCollector>) {
        let _ = self.metrics.set(metrics);
    }

    /// Spawns the 15-second heartbeat loop as a detached task. Terminates
    /// on its own once the registry is gone (process shutdown).
    pub fn spawn_heartbeat(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                match this.registry.upgrade() {
                    Some(registry) => registry.heartbeat_scan().await,
                    None => break,
                }
            }
        });
    }

    /// Starts a recovery task for `backend` unless one is already running.
    /// Idempotent: re-reporting an already-dead backend is a no-op.
    pub fn start_recovery(self: &Arc<Self>, backend: Arc<Backend>) {
        if self.dead.insert(backend.id.clone(), ()).is_some() {
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = INITIAL_DEAD_INTERVAL;
            loop {
                tokio::time::sleep(interval).await;

                // Cancelled: the backend was removed from the registry
                // while we slept.
                if !this.dead.contains_key(&backend.id) {
                    return;
                }

                if proxy::probe_head(&this.client, &backend.url).await {
                    if backend.mark_alive() {
                        if let Some(metrics) = this.metrics.get() {
                            metrics.update_backend_health(&backend.id, true);
                        }
                    }
                    this.dead.remove(&backend.id);
                    return;
                }

                interval = (interval * 2).min(MAX_DEAD_INTERVAL);
            }
        });
    }

    /// Removes a pending recovery-task entry, signalling that task to
    /// terminate at its next wake. Called when a backend is removed from
    /// the registry outright.
    pub fn forget(&self, backend_id: &str) {
        self.dead.remove(backend_id);
    }

    /// Number of dead-check tasks currently tracked. Exposed for tests.
    pub fn recovery_task_count(&self) -> usize {
        self.dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendInfo;
    use crate::strategy::LeastConnectionsStrategy;
    use std::sync::Arc;

    fn registry() -> Arc<BackendRegistry> {
        let infos = vec![BackendInfo::new("127.0.0.1", 1).unwrap()];
        Arc::new(BackendRegistry::new(
            &infos,
            Arc::new(LeastConnectionsStrategy::new(1)),
            reqwest::Client::new(),
        ))
    }

    #[tokio::test]
    async fn reporting_dead_twice_starts_only_one_recovery_task() {
        let registry = registry();
        let monitor = HealthMonitor::new(Arc::downgrade(&registry), reqwest::Client::new());
        registry.attach_monitor(monitor.clone());

        registry.report_dead(0).await;
        registry.report_dead(0).await;

        assert_eq!(monitor.recovery_task_count(), 1);
    }

    #[tokio::test]
    async fn forgetting_a_backend_clears_its_entry() {
        let registry = registry();
        let monitor = HealthMonitor::new(Arc::downgrade(&registry), reqwest::Client::new());
        registry.attach_monitor(monitor.clone());

        registry.report_dead(0).await;
        assert_eq!(monitor.recovery_task_count(), 1);

        monitor.forget(&registry.get_backends().await[0].id);
        assert_eq!(monitor.recovery_task_count(), 0);
    }
}
