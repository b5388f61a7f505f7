use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{DefaultBodyLimit, State},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{attachment_routes, delivery_routes, state::GatewayState, upload_routes};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
///
/// Download, delivery, store, and flavour routes are mounted at the paths
/// configured under `urls`, so the URLs the resolver emits are served here.
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let urls = state.config.urls.clone();
    let delivery = format!("{}/{{reference}}", urls.delivery_path.trim_end_matches('/'));
    let store = format!("{}/{{reference}}", urls.store_path.trim_end_matches('/'));
    let flavour = format!(
        "{}/{{definition_id}}/{{reference}}",
        urls.flavour_path.trim_end_matches('/')
    );

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/resources",
            post(upload_routes::upload_resource)
                .layer(DefaultBodyLimit::max(upload_routes::MAX_UPLOAD_SIZE)),
        )
        .route(
            "/api/resources/{reference}",
            post(upload_routes::upload_revision)
                .layer(DefaultBodyLimit::max(upload_routes::MAX_UPLOAD_SIZE)),
        )
        .route("/api/attachments/view", post(attachment_routes::view))
        .route("/api/attachments/ai", post(attachment_routes::ai))
        .route("/api/attachments/ai/batch", post(attachment_routes::ai_batch))
        .route(&urls.plugin_download_path, get(delivery_routes::plugin_download))
        .route(&delivery, get(delivery_routes::deliver))
        .route(&flavour, get(delivery_routes::flavour))
        .route(&format!("{flavour}/{{page}}"), get(delivery_routes::flavour_page));

    if store != delivery {
        router = router.route(&store, get(delivery_routes::deliver));
    }

    #[cfg(feature = "prometheus")]
    {
        router = router.route(
            "/metrics",
            get(crate::metrics_routes::prometheus_metrics_handler),
        );
    }

    #[cfg(feature = "metrics")]
    {
        router = router.route_layer(axum::middleware::from_fn(
            crate::metrics_middleware::http_metrics_middleware,
        ));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { gateway: state })
}

/// Start the gateway HTTP server.
pub async fn start_gateway(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.bind, state.config.server.port).parse()?;
    let app = build_gateway_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "attache gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
    }))
}
