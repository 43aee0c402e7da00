//! Router assembly for the ingest server (§4.1, External Interfaces).

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_context::ServerContext;
use crate::http::handlers;
use crate::http::state::AppState;

pub fn build_router(context: ServerContext) -> Router {
    let state = AppState::new(context);

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/vote", post(handlers::submit_vote))
        .route("/api/v1/results", get(handlers::get_results))
        .route("/api/v1/auth/:provider", post(handlers::mint_auth_token))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
}
