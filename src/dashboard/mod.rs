// src/dashboard/mod.rs
//! A minimal static-file server for a browser dashboard UI built over the
//! control plane. Out of THE CORE's scope; exists only as a thin external
//! collaborator sharing the admin listener with `control_plane`.

use std::path::{Path, PathBuf};

use hyper::{Body, Request, Response, StatusCode};
use tokio::fs;

pub async fn serve(root: &Path, req: Request<Body>) -> Response<Body> {
    let rel = req.uri().path().trim_start_matches('/');
    let rel = if rel.is_empty() { "index.html" } else { rel };

    let path: PathBuf = root.join(rel);
    if !path.starts_with(root) {
        return empty_response(StatusCode::FORBIDDEN);
    }

    match fs::read(&path).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", mime_for(&path))
            .body(Body::from(contents))
            .expect("building dashboard file response"),
        Err(_) => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found"))
            .expect("building dashboard 404 response"),
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("building dashboard error response")
}
