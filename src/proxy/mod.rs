// src/proxy/mod.rs
//! Single-host reverse-proxy primitives: forwarding one inbound request to
//! one backend's absolute URL, and the HEAD probe used by the health
//! monitor. Kept free of registry/strategy concerns so it can be unit
//! tested against a bare HTTP server.

use hyper::{Body, Request, Response};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("backend index {0} out of range")]
    InvalidIndex(usize),

    #[error("circuit breaker open for backend index {0}")]
    CircuitOpen(usize),

    #[error("failed to read request body: {0}")]
    BodyRead(hyper::Error),

    #[error("failed to build upstream request: {0}")]
    BuildRequest(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Forwards `req` to `base_url`, rewriting the `Host` header per
/// single-host-reverse-proxy conventions, and translates the upstream
/// response back into a `hyper::Response`.
pub async fn forward(
    client: &reqwest::Client,
    base_url: &Url,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();
    let body_bytes = hyper::body::to_bytes(body)
        .await
        .map_err(ProxyError::BodyRead)?;

    let mut target = base_url.clone();
    target.set_path(parts.uri.path());
    target.set_query(parts.uri.query());

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| ProxyError::BuildRequest(Box::new(e)))?;

    let mut builder = client.request(method, target.as_str());
    for (name, value) in parts.headers.iter() {
        if name == hyper::header::HOST {
            continue;
        }
        builder = builder.header(name, value);
    }
    if let Some(host) = base_url.host_str() {
        builder = builder.header(reqwest::header::HOST, host);
    }
    builder = builder.body(body_bytes.to_vec());

    let upstream = builder.send().await?;

    let status = upstream.status();
    let headers = upstream.headers().clone();
    let resp_bytes = upstream.bytes().await?;

    let mut response = Response::builder().status(status.as_u16());
    for (name, value) in headers.iter() {
        response = response.header(name, value);
    }
    response
        .body(Body::from(resp_bytes))
        .map_err(|e| ProxyError::BuildRequest(Box::new(e)))
}

/// Issues an HTTP HEAD probe against `base_url`, used by both the
/// heartbeat loop and per-backend dead-check tasks. Any non-2xx/3xx
/// response or transport error counts as a failed probe.
pub async fn probe_head(client: &reqwest::Client, base_url: &Url) -> bool {
    match client.head(base_url.as_str()).send().await {
        Ok(resp) => resp.status().is_success() || resp.status().is_redirection(),
        Err(_) => false,
    }
}
