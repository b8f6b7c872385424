use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::HttpAuthConfig;

/// Rejects any request that does not carry the shared basic-auth credentials.
pub async fn require_basic_auth(
    State(expected): State<Arc<HttpAuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match credentials(request.headers()) {
        Some((username, password)) if credentials_match(&expected, &username, &password) => {
            next.run(request).await
        }
        Some((username, _)) => {
            warn!("Rejected request to {} from user {}", request.uri(), username);
            unauthorized()
        }
        None => {
            warn!("Rejected unauthenticated request to {}", request.uri());
            unauthorized()
        }
    }
}

/// Compares both fields without short-circuiting on the first differing byte.
fn credentials_match(expected: &HttpAuthConfig, username: &str, password: &str) -> bool {
    let username = username.as_bytes().ct_eq(expected.username.as_bytes());
    let password = password.as_bytes().ct_eq(expected.password.as_bytes());
    (username & password).into()
}

fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized access" })),
    )
        .into_response()
}
