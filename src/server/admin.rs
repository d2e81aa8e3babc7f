// src/server/admin.rs
//! The admin listener: routes `/backends` to the control plane and
//! everything else to the dashboard's static file server. Runs on its own
//! port, entirely separate from the data-plane listener `ServerBuilder`
//! drives.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};

use crate::{control_plane, dashboard, dispatcher::Dispatcher};

pub async fn serve(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    dashboard_dir: PathBuf,
) -> anyhow::Result<()> {
    let dashboard_dir = Arc::new(dashboard_dir);

    let make_svc = make_service_fn(move |_conn| {
        let dispatcher = dispatcher.clone();
        let dashboard_dir = dashboard_dir.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let dispatcher = dispatcher.clone();
                let dashboard_dir = dashboard_dir.clone();
                async move {
                    let resp = if req.uri().path() == "/backends" {
                        control_plane::handle(&dispatcher, req).await
                    } else {
                        dashboard::serve(&dashboard_dir, req).await
                    };
                    Ok::<_, Infallible>(resp)
                }
            }))
        }
    });

    tracing::info!(%addr, "admin listener (control plane + dashboard) starting");
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
