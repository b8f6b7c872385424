use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::claims::{BuildVerdict, ClaimCoordinator};
use crate::error::MergerError;

/// Body of `POST /pr/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    pub operation: Option<String>,
    pub s3_arn: Option<String>,
    /// Worker identity; the peer address is used when absent.
    pub node: Option<String>,
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "merge-batcher",
        "timestamp": chrono::Utc::now()
    }))
}

pub async fn list_pull_requests(
    State(coordinator): State<ClaimCoordinator>,
) -> (StatusCode, Json<Value>) {
    match coordinator.list_open().await {
        Ok(prs) => (StatusCode::OK, Json(json!({ "prs": prs }))),
        Err(e) => internal_error("list pull requests", e),
    }
}

pub async fn list_build_ready(
    State(coordinator): State<ClaimCoordinator>,
) -> (StatusCode, Json<Value>) {
    match coordinator.list_claimable().await {
        Ok(prs) => (StatusCode::OK, Json(json!({ "prs": prs }))),
        Err(e) => internal_error("list claimable pull requests", e),
    }
}

pub async fn get_pull_request(
    State(coordinator): State<ClaimCoordinator>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    match coordinator.get(id).await {
        Ok(Some(pr)) => (StatusCode::OK, Json(json!({ "prs": [pr] }))),
        Ok(None) => not_found(id),
        Err(e) => internal_error("fetch pull request", e),
    }
}

pub async fn update_pull_request(
    State(coordinator): State<ClaimCoordinator>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Path(id): Path<i64>,
    body: Option<Json<UpdateRequest>>,
) -> (StatusCode, Json<Value>) {
    let pr = match coordinator.get(id).await {
        Ok(Some(pr)) => pr,
        Ok(None) => return not_found(id),
        Err(e) => return internal_error("fetch pull request", e),
    };

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let Some(operation) = request.operation.as_deref() else {
        return result("No operation specified");
    };

    let node = match request
        .node
        .clone()
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
    {
        Some(node) => node,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Worker identity required" })),
            )
        }
    };
    info!("{} requested {} on pull request {}", node, operation, id);

    match operation {
        "claim_build" => match coordinator.claim(&pr, &node).await {
            Ok(outcome) => result(outcome.as_str()),
            Err(e) => internal_error("claim pull request", e),
        },
        "build_success" => {
            let Some(artifact) = request.s3_arn.clone() else {
                return result("No artifact specified");
            };
            report(&coordinator, id, &node, BuildVerdict::Success { artifact }).await
        }
        "build_failed" => report(&coordinator, id, &node, BuildVerdict::Failure).await,
        _ => result("Invalid operation specified"),
    }
}

async fn report(
    coordinator: &ClaimCoordinator,
    id: i64,
    node: &str,
    verdict: BuildVerdict,
) -> (StatusCode, Json<Value>) {
    match coordinator.report_outcome(id, node, verdict).await {
        Ok(outcome) => result(outcome.as_str()),
        Err(e) => internal_error("record build outcome", e),
    }
}

fn result(value: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "result": value })))
}

fn not_found(id: i64) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Pull request {} not found", id) })),
    )
}

fn internal_error(action: &str, e: MergerError) -> (StatusCode, Json<Value>) {
    error!("Failed to {}: {}", action, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}
