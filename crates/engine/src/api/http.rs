//! HTTP router.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;

use super::auth::{require_identity, SharedSecret};
use super::error::report_errors;
use super::{hud, modules};
use crate::app::App;

/// Builds the full router.
///
/// `/api` sits behind identity verification; `/hud/*` relies on the session
/// cookie instead.
pub fn routes(app: Arc<App>) -> Router {
    let secret = SharedSecret::new(app.config.shared_secret.as_bytes());
    let environment = app.config.environment;
    let interface_path = match app.config.hud_interface_path.trim() {
        path if path.starts_with('/') => path.to_string(),
        path => format!("/{path}"),
    };

    let in_world = Router::new()
        .route("/api", get(modules::dispatch).post(modules::dispatch))
        .route_layer(from_fn_with_state(secret, require_identity));

    Router::new()
        .route("/health", get(health))
        .route("/hud/launch", get(hud::launch))
        .route(&interface_path, get(hud::interface))
        .merge(in_world)
        .layer(from_fn_with_state(environment, report_errors))
        .with_state(app)
}

async fn health() -> &'static str {
    "OK"
}
