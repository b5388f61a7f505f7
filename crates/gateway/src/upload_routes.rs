//! Resource upload endpoints.
//!
//! `POST /api/resources` stores a raw body as a new resource;
//! `POST /api/resources/{reference}` appends a revision to an existing one.
//! `Content-Type` is recorded as the revision's MIME type and the optional
//! `X-Filename` header becomes its title.

use {
    attache_media::mime,
    attache_store::ResourceStore,
    axum::{
        Json,
        body::Bytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
    },
    tracing::{info, warn},
};

use crate::server::AppState;

/// Maximum upload size: 25 MB (also used as the route-level body limit).
pub const MAX_UPLOAD_SIZE: usize = 25 * 1024 * 1024;

/// `POST /api/resources`
pub async fn upload_resource(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let upload = match Upload::parse(&headers, &body) {
        Ok(upload) => upload,
        Err(rejection) => return rejection,
    };

    let size = body.len();
    match state
        .gateway
        .store
        .store(body.to_vec(), &upload.mime_type, &upload.title)
        .await
    {
        Ok(resource) => {
            info!(%resource, mime_type = upload.mime_type, size, "stored resource");
            Json(serde_json::json!({
                "ok": true,
                "ref": resource,
                "revision": 1,
                "mime_type": upload.mime_type,
                "size": size,
            }))
            .into_response()
        },
        Err(e) => {
            warn!(title = upload.title, error = %e, "failed to store upload");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to store file: {e}"))
        },
    }
}

/// `POST /api/resources/{reference}`
pub async fn upload_revision(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let upload = match Upload::parse(&headers, &body) {
        Ok(upload) => upload,
        Err(rejection) => return rejection,
    };
    let store = &state.gateway.store;
    let Some(resource) = store.find(&reference).await else {
        return error_response(StatusCode::NOT_FOUND, "resource not found");
    };

    let size = body.len();
    match store
        .store_revision(&resource, body.to_vec(), &upload.mime_type, &upload.title)
        .await
    {
        Ok(revision) => {
            info!(%resource, revision = revision.number, size, "stored revision");
            Json(serde_json::json!({
                "ok": true,
                "ref": resource,
                "revision": revision.number,
                "mime_type": revision.mime_type,
                "size": size,
            }))
            .into_response()
        },
        Err(e) => {
            warn!(%resource, error = %e, "failed to store revision");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to store file: {e}"))
        },
    }
}

struct Upload {
    mime_type: String,
    title: String,
}

impl Upload {
    fn parse(headers: &HeaderMap, body: &Bytes) -> Result<Self, Response> {
        if body.is_empty() {
            return Err(error_response(StatusCode::BAD_REQUEST, "empty body"));
        }
        if body.len() > MAX_UPLOAD_SIZE {
            return Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("body exceeds maximum upload size ({MAX_UPLOAD_SIZE} bytes)"),
            ));
        }

        let declared = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(mime::essence)
            .filter(|m| !m.is_empty() && m != "application/octet-stream");
        // Fall back to sniffing when the client did not say.
        let mime_type = declared.unwrap_or_else(|| {
            mime::sniff_content_type(body)
                .unwrap_or("application/octet-stream")
                .to_string()
        });

        let title = headers
            .get("x-filename")
            .and_then(|v| v.to_str().ok())
            .map(sanitize_filename)
            .unwrap_or_else(|| format!("upload.{}", mime::extension_for_mime(&mime_type)));

        Ok(Self { mime_type, title })
    }
}

pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": error.into() })),
    )
        .into_response()
}

fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        .collect();
    // Leading dots would make hidden files or traversal remnants.
    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue};

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my file (1).png"), "my file 1.png");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn upload_sniffs_missing_content_type() {
        let body = Bytes::from_static(b"%PDF-1.4 body");
        let upload = Upload::parse(&HeaderMap::new(), &body).unwrap();
        assert_eq!(upload.mime_type, "application/pdf");
        assert_eq!(upload.title, "upload.pdf");
    }

    #[test]
    fn upload_keeps_declared_type_and_filename() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("Text/Plain; charset=utf-8"));
        headers.insert("x-filename", HeaderValue::from_static("notes.txt"));
        let upload = Upload::parse(&headers, &Bytes::from_static(b"hi")).unwrap();
        assert_eq!(upload.mime_type, "text/plain");
        assert_eq!(upload.title, "notes.txt");
    }

    #[test]
    fn empty_upload_is_rejected() {
        let rejection = Upload::parse(&HeaderMap::new(), &Bytes::new()).err().unwrap();
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
    }
}
