//! HTTP surface for attachment resolution.
//!
//! Serves uploads, the original and derived bytes behind every URL the
//! resolver emits, and the view / AI resolution endpoints.

pub mod attachment_routes;
pub mod delivery_routes;
pub mod metrics_middleware;
pub mod metrics_routes;
pub mod server;
pub mod state;
pub mod upload_routes;

pub use {
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
};
