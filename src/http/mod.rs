//! HTTP Shim (spec §6): five REST endpoints for non-LSP editor
//! integrations, each mapped onto Dispatcher/Multiplexer operations and
//! wrapped in a per-endpoint deadline (spec §5).

mod handlers;
mod view_state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::timeout::TimeoutLayer;

use crate::bridge::Bridge;
pub use view_state::{ViewStateProvider, ViewStateSnapshot};

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
    pub view_state_provider: Option<Arc<dyn ViewStateProvider>>,
}

/// Build the axum router for the HTTP shim, with each route wrapped in its
/// own deadline per spec §5/§6.
pub fn router(state: AppState) -> Router {
    let inline_complete = Router::new()
        .route("/inline_complete", post(handlers::inline_complete))
        .layer(TimeoutLayer::new(Duration::from_secs(60)));

    let propose_edits = Router::new()
        .route("/propose_edits", post(handlers::propose_edits))
        .layer(TimeoutLayer::new(Duration::from_secs(90)));

    let apply_edits = Router::new()
        .route("/apply_edits", post(handlers::apply_edits))
        .layer(TimeoutLayer::new(Duration::from_secs(60)));

    let status = Router::new()
        .route("/status", post(handlers::status))
        .layer(TimeoutLayer::new(Duration::from_secs(15)));

    let view_state = Router::new()
        .route("/view_state", get(handlers::view_state))
        .layer(TimeoutLayer::new(Duration::from_secs(5)));

    Router::new()
        .merge(inline_complete)
        .merge(propose_edits)
        .merge(apply_edits)
        .merge(status)
        .merge(view_state)
        .with_state(state)
}
