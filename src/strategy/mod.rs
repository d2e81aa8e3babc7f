// src/strategy/mod.rs
mod least_connections;
mod least_response_time;
mod round_robin;

pub mod consistent_hash;

pub use least_connections::LeastConnectionsStrategy;
pub use least_response_time::LeastResponseTimeStrategy;
pub use round_robin::RoundRobinStrategy;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use hyper::{Body, Request};

use crate::backend::Backend;
use crate::config::StrategyConfig;

/// A pluggable backend-selection policy.
///
/// The three required operations keep a strategy's auxiliary, index-keyed
/// state (weights, connection counts, response-time windows, ...) in sync
/// with the registry's backend list. The three hook methods default to
/// no-ops: the source expresses these as optional capability interfaces
/// probed via a runtime type assertion at construction time, which Rust
/// trait objects have no ergonomic equivalent for, so here a strategy
/// simply overrides the hook it needs.
pub trait Strategy: Send + Sync {
    /// Chooses a live backend's index from the given snapshot, or `None`
    /// if none are selectable.
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize>;

    /// Extends auxiliary per-backend state by `n` default-initialized
    /// slots at the tail.
    fn add_backends(&self, n: usize);

    /// Drops the given indices (sorted ascending, pre-removal numbering)
    /// from auxiliary state, preserving the order of what remains.
    fn remove_backends(&self, removed_indices: &[usize]);

    fn name(&self) -> &'static str;

    /// Invoked by the registry immediately before a backend is asked to
    /// serve a request. Strategies with no interest in connection counts
    /// leave this as a no-op.
    fn on_connection_start(&self, _index: usize) {}

    /// Invoked by the registry immediately after a backend finishes
    /// serving a request (success or failure).
    fn on_connection_end(&self, _index: usize) {}

    /// Invoked by the registry just before the proxy call, giving the
    /// strategy a chance to replace the request (e.g. to attach
    /// instrumentation for TTFB measurement).
    fn modify_request(&self, _index: usize, req: Request<Body>) -> Request<Body> {
        req
    }

    /// Invoked by the registry after a successful proxy call with the
    /// wall-clock time the call took. The least-response-time strategy is
    /// the only one that cares; everyone else leaves this a no-op.
    fn record_latency(&self, _index: usize, _elapsed: Duration) {}
}

/// Instantiates a strategy from configuration against the current backend
/// count. `ROUND_ROBIN`, `LEAST_CONN`, and `LEAST_RESP` are the only names
/// recognized in production; the consistent-hash ring in
/// [`consistent_hash`] exists as an unwired collaborator, matching the
/// source, which never registers it in its own strategy switch.
pub fn create_strategy(cfg: &StrategyConfig, backend_count: usize) -> Result<Arc<dyn Strategy>> {
    let strategy: Arc<dyn Strategy> = match cfg.name.as_str() {
        "ROUND_ROBIN" => {
            tracing::info!("created round robin strategy");
            Arc::new(RoundRobinStrategy::new(cfg, backend_count)?)
        }
        "LEAST_CONN" => {
            tracing::info!("created least connections strategy");
            Arc::new(LeastConnectionsStrategy::new(backend_count))
        }
        "LEAST_RESP" => {
            tracing::info!("created least response time strategy");
            Arc::new(LeastResponseTimeStrategy::new(backend_count))
        }
        other => bail!("unrecognized strategy name '{}' in config file", other),
    };

    Ok(strategy)
}
