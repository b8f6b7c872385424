//! HTTP service through which build workers discover and claim pull requests.

pub mod auth;
pub mod claims;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use claims::{BuildVerdict, ClaimCoordinator, ClaimResult, ClaimSettings, OutcomeResult};

use crate::config::HttpAuthConfig;

pub const API_PREFIX: &str = "/automerge/api/v1.0";

/// Every API route requires the shared credentials; `/health` does not.
pub fn router(coordinator: ClaimCoordinator, credentials: HttpAuthConfig) -> Router {
    let api = Router::new()
        .route("/pr/", get(handlers::list_pull_requests))
        .route("/pr/build_ready", get(handlers::list_build_ready))
        .route(
            "/pr/:id",
            get(handlers::get_pull_request).post(handlers::update_pull_request),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ))
        .with_state(coordinator);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(API_PREFIX, api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
}
