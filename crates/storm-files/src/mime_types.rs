//! MIME type and extension tables

use mime::Mime;

/// Extensions treated as images and eligible for thumbnails
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "bmp", "png", "webp", "gif"];

const TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/bmp", "bmp"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/x-icon", "ico"),
    ("image/tiff", "tiff"),
    ("application/pdf", "pdf"),
    ("application/json", "json"),
    ("application/zip", "zip"),
    ("application/gzip", "gz"),
    ("application/msword", "doc"),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", "docx"),
    ("application/vnd.ms-excel", "xls"),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", "xlsx"),
    ("application/vnd.ms-powerpoint", "ppt"),
    ("application/vnd.openxmlformats-officedocument.presentationml.presentation", "pptx"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("text/html", "html"),
    ("text/css", "css"),
    ("application/javascript", "js"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("audio/wav", "wav"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
];

/// Extension for a `Content-Type` header value; parameters such as
/// `charset` are ignored
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let parsed: Mime = content_type.trim().parse().ok()?;
    let essence = parsed.essence_str().to_lowercase();
    TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// MIME type for an extension, `application/octet-stream` when unknown
pub fn mime_for_extension(extension: &str) -> &'static str {
    let extension = extension.to_lowercase();
    let extension = if extension == "jpeg" { "jpg" } else { extension.as_str() };
    TYPES
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

pub fn is_image_extension(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}
