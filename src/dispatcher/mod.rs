// src/dispatcher/mod.rs
//! Ties the registry and strategy together under live-mutation
//! concurrency: sticky-session lookup, strategy selection, the 3-attempt
//! retry loop, and failure marking.

use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use hyper::header::{COOKIE, SET_COOKIE};
use hyper::{Body, HeaderMap, Request, Response, StatusCode};
use tokio::sync::RwLock;

use crate::config::{BackendInfo, StrategyConfig};
use crate::registry::{BackendRegistry, RegistryError};
use crate::strategy::create_strategy;

const STICKY_COOKIE_NAME: &str = "balancer_session";
const STICKY_COOKIE_MAX_AGE_SECS: u64 = 15 * 60;
const MAX_ATTEMPTS: usize = 3;

pub struct Dispatcher {
    // Write held by `change_strategy`/`add_backends`/`remove_backends`;
    // read held for the entire lifetime of a request, so no mutation can
    // interleave with an in-flight request's view of the registry.
    lock: RwLock<()>,
    registry: Arc<BackendRegistry>,
    sticky: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<BackendRegistry>, sticky: bool) -> Self {
        Self {
            lock: RwLock::new(()),
            registry,
            sticky,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let _guard = self.lock.read().await;

        let (parts, body) = req.into_parts();
        let body_bytes = match hyper::body::to_bytes(body).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(%err, "failed reading inbound request body");
                return bad_gateway();
            }
        };

        if self.sticky {
            if let Some(resp) = self.try_sticky_path(&parts, &body_bytes).await {
                return resp;
            }
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let backends = self.registry.get_backends().await;
            let strategy = self.registry.current_strategy();

            let index = match strategy.select(&backends) {
                Some(index) => index,
                None => {
                    tracing::warn!("no live backend available to select");
                    return bad_gateway();
                }
            };

            let attempt_req = rebuild_request(&parts, &body_bytes);
            match self.registry.serve(index, attempt_req).await {
                Ok(mut resp) => {
                    if self.sticky {
                        set_sticky_cookie(resp.headers_mut(), index);
                    }
                    return resp;
                }
                Err(err) => {
                    tracing::warn!(%err, index, attempt, "backend failed, marking dead and retrying");
                    if !matches!(err, crate::proxy::ProxyError::CircuitOpen(_)) {
                        self.registry.report_dead(index).await;
                    }
                }
            }
        }

        let mut resp = bad_gateway();
        if self.sticky {
            clear_sticky_cookie(resp.headers_mut());
        }
        resp
    }

    /// Attempts the sticky-session path. Returns `Some(response)` if the
    /// request was fully handled (either served successfully, or the
    /// cookie was unusable and logged); returns `None` to fall through to
    /// the balancing path.
    async fn try_sticky_path(&self, parts: &Parts, body: &Bytes) -> Option<Response<Body>> {
        let raw = extract_cookie(&parts.headers, STICKY_COOKIE_NAME)?;

        let index: usize = match raw.parse() {
            Ok(index) => index,
            Err(_) => {
                tracing::warn!(value = %raw, "unparseable sticky session cookie, falling through");
                return None;
            }
        };

        let attempt_req = rebuild_request(parts, body);
        match self.registry.serve(index, attempt_req).await {
            Ok(mut resp) => {
                set_sticky_cookie(resp.headers_mut(), index);
                Some(resp)
            }
            Err(err) => {
                tracing::warn!(%err, index, "sticky backend failed, falling through to balancing path");
                if !matches!(err, crate::proxy::ProxyError::CircuitOpen(_)) {
                    self.registry.report_dead(index).await;
                }
                None
            }
        }
    }

    pub async fn add_backends(&self, infos: &[BackendInfo]) -> Result<(), RegistryError> {
        let _guard = self.lock.write().await;
        self.registry.add_backends(infos).await?;
        self.registry.current_strategy().add_backends(infos.len());
        Ok(())
    }

    pub async fn remove_backends(&self, infos: &[BackendInfo]) {
        let _guard = self.lock.write().await;
        let removed = self.registry.remove_backends(infos).await;
        self.registry.current_strategy().remove_backends(&removed);
    }

    pub async fn change_strategy(&self, cfg: &StrategyConfig) -> anyhow::Result<()> {
        let _guard = self.lock.write().await;
        let count = self.registry.len().await;
        let new_strategy = create_strategy(cfg, count)?;
        self.registry.set_strategy(new_strategy);
        Ok(())
    }

    pub async fn backend_views(&self) -> Vec<crate::backend::BackendView> {
        self.registry.views().await
    }
}

fn rebuild_request(parts: &Parts, body: &Bytes) -> Request<Body> {
    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone())
        .version(parts.version);
    if let Some(headers) = builder.headers_mut() {
        *headers = parts.headers.clone();
    }
    builder
        .body(Body::from(body.clone()))
        .expect("rebuilding request from buffered parts")
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let pair = pair.trim();
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn set_sticky_cookie(headers: &mut HeaderMap, index: usize) {
    let value = format!(
        "{}={}; Max-Age={}; Path=/",
        STICKY_COOKIE_NAME, index, STICKY_COOKIE_MAX_AGE_SECS
    );
    if let Ok(header_value) = hyper::header::HeaderValue::from_str(&value) {
        headers.insert(SET_COOKIE, header_value);
    }
}

fn clear_sticky_cookie(headers: &mut HeaderMap) {
    let value = format!("{}=; Max-Age=0; Path=/", STICKY_COOKIE_NAME);
    if let Ok(header_value) = hyper::header::HeaderValue::from_str(&value) {
        headers.insert(SET_COOKIE, header_value);
    }
}

fn bad_gateway() -> Response<Body> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .body(Body::from("502 Bad Gateway: no backend available"))
        .expect("building 502 response")
}
