// src/server/handler.rs
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use hyper::{Body, Request, Response};
use tower::Service;

use crate::dispatcher::Dispatcher;

/// Adapts a [`Dispatcher`] to the `tower::Service` the front-end
/// `ServerBuilder` drives — every inbound request goes straight to
/// `Dispatcher::dispatch`, which never itself returns an `Err` (a 502 is
/// a normal `Response`, not a transport failure).
#[derive(Clone)]
pub struct RequestHandler {
    dispatcher: Arc<Dispatcher>,
}

impl RequestHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(req).await) })
    }
}
