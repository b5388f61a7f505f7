//! Endpoints behind the URLs the resolver hands out: original bytes
//! (download, delivery, store) and cached representations (flavours).

use {
    attache_media::mime,
    attache_store::{ResourceStore, TransformDefinition},
    axum::{
        body::Body,
        extract::{Path, Query, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tokio_util::io::ReaderStream,
    tracing::{debug, warn},
};

use crate::{server::AppState, upload_routes::error_response};

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

/// `GET {plugin_download_path}?ref=<reference>`
pub async fn plugin_download(State(state): State<AppState>, Query(query): Query<DownloadQuery>) -> Response {
    serve_original(&state, &query.reference, Disposition::Attachment).await
}

/// `GET {delivery_path}/{reference}` and `GET {store_path}/{reference}`
pub async fn deliver(State(state): State<AppState>, Path(reference): Path<String>) -> Response {
    serve_original(&state, &reference, Disposition::Inline).await
}

/// `GET {flavour_path}/{definition_id}/{reference}`
pub async fn flavour(
    State(state): State<AppState>,
    Path((definition_id, reference)): Path<(String, String)>,
) -> Response {
    serve_flavour(&state, &definition_id, &reference, 1).await
}

/// `GET {flavour_path}/{definition_id}/{reference}/{page}`, pages from 1.
pub async fn flavour_page(
    State(state): State<AppState>,
    Path((definition_id, reference, page)): Path<(String, String, usize)>,
) -> Response {
    serve_flavour(&state, &definition_id, &reference, page).await
}

async fn serve_original(state: &AppState, reference: &str, disposition: Disposition) -> Response {
    let store = &state.gateway.store;
    let Some(resource) = store.find(reference).await else {
        return error_response(StatusCode::NOT_FOUND, "resource not found");
    };
    let revision = match store.current_revision(&resource).await {
        Ok(Some(revision)) => revision,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "resource not found"),
        Err(e) => {
            warn!(%resource, error = %e, "failed to read revision");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read resource");
        },
    };
    // Same revision as the headers, even if a new upload lands meanwhile.
    let stream = match store.stream_revision(&resource, revision.number).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%resource, error = %e, "failed to open resource stream");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read resource");
        },
    };

    let content_type = if revision.mime_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        revision.mime_type.clone()
    };
    let kind = match disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    let content_disposition = format!("{kind}; filename=\"{}\"", quoted_filename(&revision.title));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        Body::from_stream(ReaderStream::new(stream)),
    )
        .into_response()
}

async fn serve_flavour(state: &AppState, definition_id: &str, reference: &str, page: usize) -> Response {
    let Some(definition) = TransformDefinition::builtin(definition_id) else {
        return error_response(StatusCode::NOT_FOUND, "unknown representation");
    };
    let Some(resource) = state.gateway.store.find(reference).await else {
        return error_response(StatusCode::NOT_FOUND, "resource not found");
    };
    let Some(representation) = state.gateway.cache.get(&resource, &definition).await else {
        debug!(%resource, definition = definition.id(), "representation not generated");
        return error_response(StatusCode::NOT_FOUND, "representation not available");
    };
    let Some(artifact) = page.checked_sub(1).and_then(|i| representation.artifacts().get(i)) else {
        return error_response(StatusCode::NOT_FOUND, "page out of range");
    };

    match artifact.read_all().await {
        Ok(bytes) => {
            let content_type = mime::sniff_content_type(&bytes).unwrap_or("application/octet-stream");
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        },
        Err(e) => {
            warn!(%resource, definition = definition.id(), page, error = %e, "failed to read representation");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read representation")
        },
    }
}

/// Keep a title usable inside a quoted `Content-Disposition` filename.
fn quoted_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}
