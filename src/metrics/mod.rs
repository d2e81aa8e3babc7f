// src/metrics/mod.rs
mod collector;

pub use collector::{MetricsCollector, MetricsRegistry, Timer};

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};

use crate::config::MetricsConfig;

/// Runs a minimal HTTP server that serves the Prometheus text exposition
/// format at `config.path`, until the process exits. Intended to be
/// spawned as its own task alongside the data-plane listener.
pub async fn serve_metrics(config: MetricsConfig, registry: Arc<MetricsRegistry>) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let path = Arc::new(config.path);

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        let path = path.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();
                async move {
                    let response = if req.uri().path() == path.as_str() {
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("content-type", "text/plain; version=0.0.4")
                            .body(Body::from(registry.gather()))
                            .expect("building metrics response")
                    } else {
                        Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::empty())
                            .expect("building not-found response")
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    tracing::info!(%addr, path = %path, "metrics listener starting");
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
