//! Panic containment for the whole middleware stack.
//!
//! [`PanicRecoveryLayer`] must be the outermost layer. A panic anywhere
//! below it (limiter, authentication, a handler) becomes a 500 with the
//! standard envelope and `Connection: close`, so the connection that saw the
//! panic is not reused. The panic detail and a backtrace go to the log via
//! the hook installed by [`install_panic_hook`]; the client sees only the
//! generic message.

use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::CONNECTION;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use futures::FutureExt;
use tower::{Layer, Service};
use tracing::error;

use crate::error::{SERVER_ERROR_MESSAGE, error_response};
use crate::jobs::panic_message;

/// Route panic reports through `tracing` with a forced backtrace.
///
/// Replaces the default hook, which writes to stderr and would bypass the
/// JSON log format.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let backtrace = Backtrace::force_capture();
        error!(
            panic = %panic_message(info.payload()),
            location = %location,
            backtrace = %backtrace,
            "Panic"
        );
    }));
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PanicRecoveryLayer;

impl PanicRecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for PanicRecoveryLayer {
    type Service = PanicRecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PanicRecoveryService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct PanicRecoveryService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for PanicRecoveryService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            match AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        method = %method,
                        path = %path,
                        panic = %panic_message(panic.as_ref()),
                        "Request handler panicked"
                    );
                    Ok(panic_response())
                }
            }
        })
    }
}

fn panic_response() -> Response<Body> {
    let mut response = error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE);
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
