//! Shared HTTP constants (headers, limits, client-facing messages).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

/// Upload limit applied when none is configured (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
/// Allowance for multipart framing and non-file fields on top of the image limit.
pub(crate) const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) const UPLOAD_FIELD: &str = "image";

pub(crate) const MSG_NO_FILE: &str = "No file uploaded";
pub(crate) const MSG_MULTIPLE_FILES: &str = "Only one file may be uploaded";
pub(crate) const MSG_TOO_LARGE: &str = "Uploaded file is too large";
pub(crate) const MSG_UNSUPPORTED_TYPE: &str = "Unsupported image type";
pub(crate) const MSG_STORE_FAILED: &str = "Failed to store upload";
pub(crate) const MSG_SCRATCH_UNAVAILABLE: &str = "scratch directory unavailable";

pub(crate) const COMPONENT_SCRATCH: &str = "scratch";
pub(crate) const COMPONENT_PIPELINE: &str = "pipeline";
