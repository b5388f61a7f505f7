//! Magic-number MIME detection.

/// Bytes read from the head of a stream before sniffing.
pub const SNIFF_PREFIX_LEN: usize = 16;

const PNG_MAGIC: &[u8] = b"\x89PNG";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF_MAGIC: &[u8] = b"GIF8";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Sniff a rasterized page or representation.
///
/// Only PNG and JPEG are recognized; anything else is reported as PNG, which
/// is what the page rasterizer emits by default.
#[must_use]
pub fn sniff_image_mime(prefix: &[u8]) -> &'static str {
    if prefix.starts_with(JPEG_MAGIC) {
        "image/jpeg"
    } else {
        "image/png"
    }
}

/// Broader detection used when serving stored bytes over HTTP.
#[must_use]
pub fn sniff_content_type(prefix: &[u8]) -> Option<&'static str> {
    if prefix.starts_with(PNG_MAGIC) {
        Some("image/png")
    } else if prefix.starts_with(JPEG_MAGIC) {
        Some("image/jpeg")
    } else if prefix.starts_with(GIF_MAGIC) {
        Some("image/gif")
    } else if prefix.len() >= 12 && &prefix[..4] == b"RIFF" && &prefix[8..12] == b"WEBP" {
        Some("image/webp")
    } else if prefix.starts_with(PDF_MAGIC) {
        Some("application/pdf")
    } else {
        None
    }
}

/// File extension for a MIME type, falling back to `bin`.
#[must_use]
pub fn extension_for_mime(mime: &str) -> &'static str {
    match essence(mime).as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/markdown" => "md",
        "text/csv" => "csv",
        _ => "bin",
    }
}

/// Lower-cased type/subtype with parameters stripped.
#[must_use]
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
