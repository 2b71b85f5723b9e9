//! `POST /remove-bg`: accept one image, run the pipeline, return the result.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json,
    extract::{
        State,
        multipart::{Field, Multipart, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::http::constants::{
    COMPONENT_PIPELINE, MSG_MULTIPLE_FILES, MSG_NO_FILE, MSG_STORE_FAILED, MSG_TOO_LARGE,
    MSG_UNSUPPORTED_TYPE, UPLOAD_FIELD,
};
use crate::http::errors::ApiError;
use crate::state::ApiState;

/// Successful pipeline response.
#[derive(Debug, Serialize)]
pub(crate) struct RemoveBgResponse {
    pub(crate) base64_image: String,
    pub(crate) prediction: Map<String, Value>,
}

/// Rejections raised before the pipeline runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum UploadError {
    #[error("no image part in request")]
    NoFile,
    #[error("more than one image part in request")]
    MultipleFiles,
    #[error("image exceeds upload limit")]
    TooLarge,
    #[error("image bytes are not a supported format")]
    UnsupportedType,
    #[error("image could not be persisted")]
    Store,
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NoFile => Self::bad_request(MSG_NO_FILE),
            UploadError::MultipleFiles => Self::bad_request(MSG_MULTIPLE_FILES),
            UploadError::TooLarge => Self::payload_too_large(MSG_TOO_LARGE),
            UploadError::UnsupportedType => Self::unsupported_media_type(MSG_UNSUPPORTED_TYPE),
            UploadError::Store => Self::internal(MSG_STORE_FAILED),
        }
    }
}

/// Image formats accepted for upload, recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Heic,
}

impl ImageKind {
    pub(crate) const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Heic => "heic",
        }
    }
}

/// Identify the image format from magic bytes.
pub(crate) fn sniff_image_type(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageKind::Jpeg);
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageKind::Png);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(ImageKind::Gif);
    }
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some(ImageKind::Webp);
    }
    if bytes.len() >= 14 && bytes.starts_with(b"BM") {
        return Some(ImageKind::Bmp);
    }
    if bytes.len() >= 12 && bytes[4..8] == *b"ftyp" {
        let brand = &bytes[8..12];
        if [b"heic", b"heix", b"hevc", b"heif", b"mif1", b"msf1"]
            .iter()
            .any(|known| brand == *known)
        {
            return Some(ImageKind::Heic);
        }
    }
    None
}

struct ReceivedImage {
    bytes: Vec<u8>,
    filename: Option<String>,
}

pub(crate) async fn remove_background(
    State(state): State<Arc<ApiState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RemoveBgResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        debug!(reason = %rejection, "request body is not multipart");
        UploadError::NoFile
    })?;
    let received = read_image_part(multipart, state.max_upload_bytes).await?;
    let kind = sniff_image_type(&received.bytes).ok_or_else(|| {
        warn!(
            bytes = received.bytes.len(),
            filename = received.filename.as_deref().unwrap_or_default(),
            "rejected upload with unrecognised image bytes"
        );
        UploadError::UnsupportedType
    })?;

    let stored = state
        .scratch
        .persist_upload(&received.bytes, received.filename.as_deref(), kind.extension())
        .await
        .map_err(|err| {
            error!(error = %err, detail = ?err, "failed to persist upload");
            UploadError::Store
        })?;
    info!(
        path = %stored.path.display(),
        bytes = stored.size,
        original_name = stored.original_name.as_deref().unwrap_or_default(),
        "upload stored"
    );

    let (result, artifacts): (Result<_, ApiError>, Vec<PathBuf>) =
        match state.pipeline.run(&stored.path).await {
            Ok(outcome) => {
                if state.remove_degraded_component(COMPONENT_PIPELINE) {
                    info!("pipeline workers recovered");
                }
                (
                    Ok(Json(RemoveBgResponse {
                        base64_image: outcome.base64_image,
                        prediction: outcome.prediction,
                    })),
                    outcome.artifacts,
                )
            }
            Err(err) => {
                warn!(stage = err.stage().as_str(), error = %err, "pipeline failed");
                if err.is_launch_failure() {
                    state.add_degraded_component(COMPONENT_PIPELINE);
                }
                (
                    Err(ApiError::internal(err.client_message())),
                    err.artifacts().to_vec(),
                )
            }
        };

    if state.cleanup_request_files {
        let removed = state.scratch.remove_artifacts(&artifacts).await;
        debug!(removed, "request artifacts cleaned up");
    }
    result
}

async fn read_image_part(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<ReceivedImage, UploadError> {
    let mut received: Option<ReceivedImage> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) || field.file_name().is_none() {
            continue;
        }
        if received.is_some() {
            return Err(UploadError::MultipleFiles);
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = read_limited(field, max_bytes).await?;
        received = Some(ReceivedImage { bytes, filename });
    }
    received
        .filter(|image| !image.bytes.is_empty())
        .ok_or(UploadError::NoFile)
}

async fn read_limited(mut field: Field<'_>, max_bytes: usize) -> Result<Vec<u8>, UploadError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(UploadError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn multipart_error(err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        debug!(reason = %err.body_text(), "malformed multipart body");
        UploadError::NoFile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_supported_formats() {
        let cases: [(&[u8], ImageKind); 7] = [
            (&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0], ImageKind::Jpeg),
            (b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", ImageKind::Png),
            (b"GIF89a\x01\0\x01\0", ImageKind::Gif),
            (b"RIFF\x24\0\0\0WEBPVP8 ", ImageKind::Webp),
            (b"BM\x46\0\0\0\0\0\0\0\x36\0\0\0", ImageKind::Bmp),
            (b"\0\0\0\x18ftypheic\0\0\0\0", ImageKind::Heic),
            (b"\0\0\0\x18ftypmif1\0\0\0\0", ImageKind::Heic),
        ];
        for (bytes, expected) in cases {
            assert_eq!(sniff_image_type(bytes), Some(expected));
        }
    }

    #[test]
    fn rejects_non_images() {
        for bytes in [
            &b""[..],
            b"%PDF-1.7",
            b"hello world",
            b"\0\0\0\x18ftypmp42\0\0\0\0",
            b"RIFF\x24\0\0\0WAVEfmt ",
            b"BM",
        ] {
            assert_eq!(sniff_image_type(bytes), None);
        }
    }

    #[test]
    fn extensions_are_short_and_alphanumeric() {
        for kind in [
            ImageKind::Jpeg,
            ImageKind::Png,
            ImageKind::Gif,
            ImageKind::Webp,
            ImageKind::Bmp,
            ImageKind::Heic,
        ] {
            let ext = kind.extension();
            assert!(!ext.is_empty() && ext.len() <= 8);
            assert!(ext.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn upload_errors_map_to_client_messages() {
        let cases = [
            (UploadError::NoFile, StatusCode::BAD_REQUEST, MSG_NO_FILE),
            (
                UploadError::MultipleFiles,
                StatusCode::BAD_REQUEST,
                MSG_MULTIPLE_FILES,
            ),
            (
                UploadError::TooLarge,
                StatusCode::PAYLOAD_TOO_LARGE,
                MSG_TOO_LARGE,
            ),
            (
                UploadError::UnsupportedType,
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                MSG_UNSUPPORTED_TYPE,
            ),
            (
                UploadError::Store,
                StatusCode::INTERNAL_SERVER_ERROR,
                MSG_STORE_FAILED,
            ),
        ];
        for (err, status, message) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.message, message);
        }
    }
}
