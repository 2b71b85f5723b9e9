//! Image bytes and request bodies for upload tests.

/// A 1x1 transparent PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Leading bytes of a JPEG file; enough for type sniffing.
pub const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

/// Boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "closet-test-boundary";

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// Form field name.
    pub name: &'a str,
    /// File name; `None` makes this a plain text field.
    pub filename: Option<&'a str>,
    /// Declared content type.
    pub content_type: Option<&'a str>,
    /// Raw part bytes.
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    /// File part with the given field name.
    #[must_use]
    pub const fn file(name: &'a str, filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }

    /// Plain text field.
    #[must_use]
    pub const fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

/// `Content-Type` header value matching [`multipart_body`].
#[must_use]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Encode `parts` as a `multipart/form-data` body delimited by [`BOUNDARY`].
#[must_use]
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = part.filename.map_or_else(
            || format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
            |filename| {
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n",
                    part.name
                )
            },
        );
        body.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_png_starts_with_signature() {
        assert_eq!(&TINY_PNG[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn multipart_body_frames_every_part() {
        let body = multipart_body(&[
            Part::file("image", "shirt.png", "image/png", TINY_PNG),
            Part::text("note", "hello"),
        ]);
        let text = String::from_utf8_lossy(&body);
        assert_eq!(text.matches(&format!("--{BOUNDARY}\r\n")).count(), 2);
        assert!(text.contains("name=\"image\"; filename=\"shirt.png\""));
        assert!(text.contains("Content-Type: image/png"));
        assert!(text.contains("name=\"note\"\r\n\r\nhello\r\n"));
        assert!(text.ends_with(&format!("--{BOUNDARY}--\r\n")));
    }
}
