//! `data:<mime>;base64,<payload>` strings for inline model input.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Build a data URL from raw bytes.
#[must_use]
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Single-part placeholder used when a document yields no renderable pages.
#[must_use]
pub fn text_placeholder(text: &str) -> String {
    encode("text/plain", text.as_bytes())
}

/// Split a base64 data URL into `(mime, payload)`.
///
/// Returns `None` for anything that is not a non-empty base64 data URL.
#[must_use]
pub fn parse(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    if mime.is_empty() || data.is_empty() {
        return None;
    }
    Some((mime, data))
}

/// Decode the payload of a base64 data URL.
#[must_use]
pub fn decode(uri: &str) -> Option<(String, Vec<u8>)> {
    let (mime, data) = parse(uri)?;
    let bytes = STANDARD.decode(data).ok()?;
    Some((mime.to_string(), bytes))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_matches_expected_encoding() {
        let url = text_placeholder("PDF Document: report.pdf");
        assert_eq!(
            url,
            format!(
                "data:text/plain;base64,{}",
                STANDARD.encode("PDF Document: report.pdf")
            )
        );
        let (mime, bytes) = decode(&url).unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(bytes, b"PDF Document: report.pdf");
    }

    #[test]
    fn parse_rejects_non_base64_urls() {
        assert!(parse("data:text/plain,hello").is_none());
        assert!(parse("data:;base64,AAAA").is_none());
        assert!(parse("https://example.org/a.png").is_none());
        assert_eq!(parse("data:image/png;base64,iVBO"), Some(("image/png", "iVBO")));
    }
}
