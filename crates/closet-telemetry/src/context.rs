//! Context propagation helpers for request and application spans.
//!
//! # Design
//! - The request id of the request being served lives in task-local storage so
//!   pipeline spans can carry it without threading it through every call.
//! - An application-level span guard gives top-level spans service/build info.

use std::future::Future;
use std::sync::Arc;

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the application-level tracing span for the lifetime of the guard.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        let service = service.into();
        let span: &'static Span = Box::leak(Box::new(
            tracing::info_span!("app", service = %service, build_sha = %build_sha()),
        ));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Request id of the request being served, if any.
///
/// Empty ids are treated as absent.
#[must_use]
pub fn current_request_id() -> Option<String> {
    ACTIVE_REQUEST_ID
        .try_with(|id| (!id.is_empty()).then(|| id.to_string()))
        .ok()
        .flatten()
}

/// Run `fut` with `request_id` visible to [`current_request_id`].
pub async fn with_request_context<Fut, T>(request_id: impl Into<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let request_id: Arc<str> = Arc::from(request_id.into());
    ACTIVE_REQUEST_ID.scope(request_id, fut).await
}

tokio::task_local! {
    static ACTIVE_REQUEST_ID: Arc<str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_id_is_scoped_to_the_future() {
        let output = with_request_context("req-42", async {
            assert_eq!(current_request_id().as_deref(), Some("req-42"));
            "done"
        })
        .await;
        assert_eq!(output, "done");
        assert!(current_request_id().is_none());
    }

    #[tokio::test]
    async fn empty_request_id_reads_as_absent() {
        with_request_context("", async {
            assert!(current_request_id().is_none());
        })
        .await;
    }
}
