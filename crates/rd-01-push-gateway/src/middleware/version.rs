//! Version header middleware.
//!
//! Stamps the running build identifier on every response so clients can
//! detect version skew, and logs requests that announce a different build.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    response::Response,
};
use shared_types::{detect_skew, BuildVersion, VERSION_HEADER};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// Layer that adds the version header to responses
#[derive(Clone)]
pub struct VersionLayer {
    version: Arc<BuildVersion>,
    header: Option<HeaderValue>,
}

impl VersionLayer {
    pub fn new(version: BuildVersion) -> Self {
        // BuildVersion rejects control characters, so this only fails for
        // non-visible ASCII, which is then simply not echoed
        let header = HeaderValue::from_str(version.as_str()).ok();
        Self {
            version: Arc::new(version),
            header,
        }
    }
}

impl<S> Layer<S> for VersionLayer {
    type Service = VersionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VersionService {
            inner,
            version: Arc::clone(&self.version),
            header: self.header.clone(),
        }
    }
}

/// Version service
#[derive(Clone)]
pub struct VersionService<S> {
    inner: S,
    version: Arc<BuildVersion>,
    header: Option<HeaderValue>,
}

impl<S> Service<Request<Body>> for VersionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let header = self.header.clone();

        let remote = req
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Some(skew) = detect_skew(&self.version, remote) {
            debug!(
                path = %req.uri().path(),
                local = %skew.local,
                remote = %skew.remote,
                "Request from a different build"
            );
        }

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            if let Some(value) = header {
                response.headers_mut().insert(VERSION_HEADER, value);
            }
            Ok(response)
        })
    }
}
