//! Security response headers.
//!
//! Wraps the downstream service and stamps a fixed set of defensive headers
//! onto every response. Status and body are never touched.
//!
//! Required headers replace whatever the handler set for the same name.
//! Extra headers are appended afterwards, so a colliding extra header shows
//! up next to the required one instead of replacing it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderName, HeaderValue, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

#[derive(Debug, thiserror::Error)]
#[error("invalid security header '{name}'")]
pub struct InvalidHeader {
    pub name: String,
}

#[derive(Debug)]
struct HeaderSet {
    required: Vec<(HeaderName, HeaderValue)>,
    extra: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderSet {
    fn apply(&self, headers: &mut axum::http::HeaderMap) {
        for (name, value) in &self.required {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &self.extra {
            headers.append(name.clone(), value.clone());
        }
    }
}

/// Layer injecting security headers into responses.
#[derive(Debug, Clone)]
pub struct SecurityHeadersLayer {
    headers: Arc<HeaderSet>,
}

impl SecurityHeadersLayer {
    pub fn new() -> Self {
        Self {
            headers: Arc::new(HeaderSet {
                required: required_headers(),
                extra: Vec::new(),
            }),
        }
    }

    /// Layer with caller-supplied headers merged in.
    pub fn with_extra_headers(extra: &BTreeMap<String, String>) -> Result<Self, InvalidHeader> {
        let extra = extra
            .iter()
            .map(|(name, value)| {
                let invalid = || InvalidHeader { name: name.clone() };
                Ok((
                    HeaderName::try_from(name.as_str()).map_err(|_| invalid())?,
                    HeaderValue::from_str(value).map_err(|_| invalid())?,
                ))
            })
            .collect::<Result<Vec<_>, InvalidHeader>>()?;

        Ok(Self {
            headers: Arc::new(HeaderSet {
                required: required_headers(),
                extra,
            }),
        })
    }
}

impl Default for SecurityHeadersLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Headers present on every response.
fn required_headers() -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        ),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ),
    ]
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeaders {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service produced by [`SecurityHeadersLayer`].
#[derive(Debug, Clone)]
pub struct SecurityHeaders<S> {
    inner: S,
    headers: Arc<HeaderSet>,
}

impl<S, Req, B> Service<Req> for SecurityHeaders<S>
where
    S: Service<Req, Response = Response<B>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let headers = self.headers.clone();
        let future = self.inner.call(req);

        Box::pin(async move {
            let mut response = future.await?;
            headers.apply(response.headers_mut());
            Ok(response)
        })
    }
}
