//! Per-request telemetry: request counters and the task-local request id.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::response::Response;
use closet_telemetry::{Metrics, with_request_context};
use tower::{Layer, Service};

use crate::http::constants::HEADER_REQUEST_ID;

const UNMATCHED_ROUTE: &str = "unmatched";

/// Counts requests per route and status, and exposes the request id to
/// everything the handler calls.
#[derive(Clone)]
pub(crate) struct RequestTelemetryLayer {
    metrics: Metrics,
}

impl RequestTelemetryLayer {
    pub(crate) const fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }
}

impl<S> Layer<S> for RequestTelemetryLayer {
    type Service = RequestTelemetry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTelemetry {
            inner,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct RequestTelemetry<S> {
    inner: S,
    metrics: Metrics,
}

impl<S, B> Service<Request<B>> for RequestTelemetry<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let route = route_label(&req);
        let request_id = request_id_of(&req).to_string();
        // Call the instance that was polled ready; keep a fresh clone for the next request.
        let fresh = self.inner.clone();
        let mut ready = std::mem::replace(&mut self.inner, fresh);
        let metrics = self.metrics.clone();

        Box::pin(with_request_context(request_id, async move {
            let response = ready.call(req).await?;
            metrics.inc_http_request(&route, response.status().as_u16());
            Ok(response)
        }))
    }
}

/// Route template for metric labels; unknown paths collapse to one label.
fn route_label<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |matched| matched.as_str().to_string())
}

/// The `x-request-id` header value, or an empty string.
pub(crate) fn request_id_of<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(HEADER_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn unmatched_requests_share_a_label() {
        let req = Request::builder()
            .uri("/wp-admin/setup.php")
            .body(Body::empty())
            .expect("request");
        assert_eq!(route_label(&req), UNMATCHED_ROUTE);
    }

    #[test]
    fn request_id_header_is_read_verbatim() {
        let req = Request::builder()
            .header(HEADER_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .expect("request");
        assert_eq!(request_id_of(&req), "abc-123");

        let req = Request::builder().body(Body::empty()).expect("request");
        assert_eq!(request_id_of(&req), "");
    }
}
