//! Shared handler state and degraded-component tracking.

use std::sync::{Mutex, MutexGuard};

use closet_pipeline::Pipeline;
use closet_scratch::ScratchDir;
use closet_telemetry::Metrics;
use tracing::warn;

use crate::http::constants::DEFAULT_MAX_UPLOAD_BYTES;

/// Everything a request handler needs: the pipeline, scratch storage, and telemetry.
pub struct ApiState {
    pub(crate) pipeline: Pipeline,
    pub(crate) scratch: ScratchDir,
    pub(crate) telemetry: Metrics,
    pub(crate) max_upload_bytes: usize,
    pub(crate) cleanup_request_files: bool,
    degraded: Mutex<Vec<String>>,
}

impl ApiState {
    /// Build state with the default upload limit and request cleanup enabled.
    #[must_use]
    pub const fn new(pipeline: Pipeline, scratch: ScratchDir, telemetry: Metrics) -> Self {
        Self {
            pipeline,
            scratch,
            telemetry,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cleanup_request_files: true,
            degraded: Mutex::new(Vec::new()),
        }
    }

    /// Largest accepted image, in bytes.
    #[must_use]
    pub const fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Whether request artifacts are deleted once the response is built.
    #[must_use]
    pub const fn with_cleanup_request_files(mut self, cleanup: bool) -> Self {
        self.cleanup_request_files = cleanup;
        self
    }

    /// Largest accepted image, in bytes.
    #[must_use]
    pub const fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub(crate) fn add_degraded_component(&self, component: &str) -> bool {
        let mut guard = Self::lock_guard(&self.degraded);
        if guard.iter().any(|entry| entry == component) {
            return false;
        }
        guard.push(component.to_string());
        guard.sort();
        drop(guard);
        warn!(component, "component degraded");
        true
    }

    pub(crate) fn remove_degraded_component(&self, component: &str) -> bool {
        let mut guard = Self::lock_guard(&self.degraded);
        let previous = guard.len();
        guard.retain(|entry| entry != component);
        previous != guard.len()
    }

    pub(crate) fn current_degraded(&self) -> Vec<String> {
        Self::lock_guard(&self.degraded).clone()
    }

    fn lock_guard(mutex: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
        mutex.lock().unwrap_or_else(|poisoned| {
            warn!("degraded component list lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}
