//! Resolution endpoints for chat clients and the model bridge.

use {
    attache_attachments::{AiPayload, AttachmentInput, AttachmentView},
    axum::{Json, extract::State},
    serde::Serialize,
};

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct AiParts {
    /// Content parts in order; empty when the attachment is not model input.
    pub parts: Vec<String>,
}

impl From<Option<AiPayload>> for AiParts {
    fn from(payload: Option<AiPayload>) -> Self {
        Self {
            parts: payload.map(AiPayload::into_parts).unwrap_or_default(),
        }
    }
}

/// `POST /api/attachments/view`
pub async fn view(State(state): State<AppState>, Json(input): Json<AttachmentInput>) -> Json<AttachmentView> {
    Json(state.gateway.resolver.view(&input).await)
}

/// `POST /api/attachments/ai`
pub async fn ai(State(state): State<AppState>, Json(input): Json<AttachmentInput>) -> Json<AiParts> {
    Json(state.gateway.resolver.resolve_for_ai(&input).await.into())
}

/// `POST /api/attachments/ai/batch`: one message's attachments, results in
/// request order.
pub async fn ai_batch(
    State(state): State<AppState>,
    Json(inputs): Json<Vec<AttachmentInput>>,
) -> Json<Vec<AiParts>> {
    let results = state.gateway.resolver.resolve_many_for_ai(&inputs).await;
    Json(results.into_iter().map(AiParts::from).collect())
}
