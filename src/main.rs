// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use aegis_balancer::{
    config, dispatcher::Dispatcher, health::HealthMonitor, metrics::MetricsRegistry,
    registry::BackendRegistry, server, strategy,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aegis_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!(path = %config_path, "loading configuration");
    let config = config::load_config(&config_path).await?;

    let client = reqwest::Client::new();
    let strategy = strategy::create_strategy(&config.strategy, config.backends.len())?;

    let registry = Arc::new(BackendRegistry::new(&config.backends, strategy, client.clone()));
    let monitor = HealthMonitor::new(Arc::downgrade(&registry), client);
    registry.attach_monitor(monitor.clone());
    monitor.spawn_heartbeat();

    let dispatcher = Arc::new(Dispatcher::new(registry, config.sticky));

    if config.metrics.enabled {
        let metrics_registry = Arc::new(MetricsRegistry::new()?);
        let collector = metrics_registry.collector();
        dispatcher.registry().attach_metrics(collector.clone());
        monitor.attach_metrics(collector);

        let metrics_config = config.metrics.clone();
        tokio::spawn(async move {
            if let Err(err) = aegis_balancer::metrics::serve_metrics(metrics_config, metrics_registry).await {
                tracing::error!(%err, "metrics server exited");
            }
        });
    }

    let admin_addr: SocketAddr = ([0, 0, 0, 0], config.admin.port).into();
    let admin_dispatcher = dispatcher.clone();
    let dashboard_dir = PathBuf::from(config.admin.dashboard_dir.clone());
    tokio::spawn(async move {
        if let Err(err) = server::admin::serve(admin_addr, admin_dispatcher, dashboard_dir).await {
            tracing::error!(%err, "admin server exited");
        }
    });

    let handler = server::RequestHandler::new(dispatcher);
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(%addr, "starting load balancer");

    tokio::select! {
        result = server::ServerBuilder::new(addr).with_handler(handler).serve() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutting down");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
