// src/control_plane/mod.rs
//! The out-of-band HTTP surface driving the Dispatcher's backend list at
//! runtime. An external collaborator, not part of THE CORE: handlers call
//! straight into `Dispatcher::add_backends`/`remove_backends`/`backend_views`
//! exactly as the core's contract describes.

use std::sync::Arc;

use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Deserialize;

use crate::config::BackendInfo;
use crate::dispatcher::Dispatcher;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackendPayload {
    host: String,
    port: u16,
}

/// Handles a request to `/backends`. Callers should route any other path
/// elsewhere (e.g. to the dashboard's static file server) before reaching
/// this function.
pub async fn handle(dispatcher: &Arc<Dispatcher>, req: Request<Body>) -> Response<Body> {
    match *req.method() {
        Method::GET => handle_get(dispatcher).await,
        Method::PUT => handle_put(dispatcher, req).await,
        Method::DELETE => handle_delete(dispatcher, req).await,
        Method::OPTIONS => handle_options(),
        _ => empty_response(StatusCode::METHOD_NOT_ALLOWED),
    }
}

async fn handle_get(dispatcher: &Arc<Dispatcher>) -> Response<Body> {
    let views = dispatcher.backend_views().await;
    let body = match serde_json::to_vec(&views) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(%err, "failed serializing backend list");
            return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Body::from(body))
        .expect("building backends GET response")
}

async fn handle_put(dispatcher: &Arc<Dispatcher>, req: Request<Body>) -> Response<Body> {
    let info = match parse_payload(req).await {
        Ok(info) => info,
        Err(resp) => return resp,
    };

    match dispatcher.add_backends(&[info]).await {
        Ok(()) => empty_response(StatusCode::OK),
        Err(err) => {
            tracing::warn!(%err, "rejecting duplicate backend add");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn handle_delete(dispatcher: &Arc<Dispatcher>, req: Request<Body>) -> Response<Body> {
    match parse_payload(req).await {
        Ok(info) => {
            dispatcher.remove_backends(&[info]).await;
        }
        Err(_) => {
            // Malformed body on delete is still answered 200: the source
            // treats an absent/unparseable host as simply nothing to
            // remove rather than a client error.
        }
    }
    empty_response(StatusCode::OK)
}

fn handle_options() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, PUT, DELETE, OPTIONS")
        .header("access-control-allow-headers", "content-type")
        .body(Body::empty())
        .expect("building OPTIONS response")
}

async fn parse_payload(req: Request<Body>) -> Result<BackendInfo, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|_| empty_response(StatusCode::BAD_REQUEST))?;
    let payload: BackendPayload =
        serde_json::from_slice(&bytes).map_err(|_| empty_response(StatusCode::BAD_REQUEST))?;
    BackendInfo::new(payload.host, payload.port).map_err(|_| empty_response(StatusCode::BAD_REQUEST))
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("building empty response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendInfo as CfgBackendInfo, StrategyConfig};
    use crate::registry::BackendRegistry;
    use crate::strategy::create_strategy;

    fn dispatcher() -> Arc<Dispatcher> {
        let infos = vec![CfgBackendInfo::new("127.0.0.1", 9001).unwrap()];
        let strategy = create_strategy(
            &StrategyConfig {
                name: "LEAST_CONN".to_string(),
                properties: serde_yaml::Value::Null,
            },
            infos.len(),
        )
        .unwrap();
        let registry = Arc::new(BackendRegistry::new(&infos, strategy, reqwest::Client::new()));
        Arc::new(Dispatcher::new(registry, false))
    }

    #[tokio::test]
    async fn get_lists_current_backends() {
        let dispatcher = dispatcher();
        let req = Request::builder()
            .method(Method::GET)
            .uri("/backends")
            .body(Body::empty())
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn put_with_duplicate_host_returns_500() {
        let dispatcher = dispatcher();
        let body = serde_json::json!({"host": "127.0.0.1", "port": 9001}).to_string();
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/backends")
            .body(Body::from(body))
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn put_with_malformed_json_returns_400() {
        let dispatcher = dispatcher();
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/backends")
            .body(Body::from("not json"))
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_with_unknown_field_returns_400() {
        let dispatcher = dispatcher();
        let body = serde_json::json!({"host": "10.0.0.1", "port": 9002, "weight": 3}).to_string();
        let req = Request::builder()
            .method(Method::PUT)
            .uri("/backends")
            .body(Body::from(body))
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_is_always_200_even_for_absent_hosts() {
        let dispatcher = dispatcher();
        let body = serde_json::json!({"host": "no-such-host", "port": 1}).to_string();
        let req = Request::builder()
            .method(Method::DELETE)
            .uri("/backends")
            .body(Body::from(body))
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn options_is_a_cors_preflight() {
        let dispatcher = dispatcher();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/backends")
            .body(Body::empty())
            .unwrap();
        let resp = handle(&dispatcher, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
