use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{HttpAuthConfig, WorkerConfig};
use crate::coordinator::{ClaimResult, OutcomeResult, API_PREFIX};
use crate::database::models::PullRequest;
use crate::error::MergerError;

#[derive(Debug, Deserialize)]
struct PullRequestList {
    prs: Vec<PullRequest>,
}

#[derive(Debug, Deserialize)]
struct OperationResult {
    result: String,
}

/// Client side of the claim protocol, identifying itself as `node`.
#[derive(Clone)]
pub struct CoordinatorClient {
    client: Client,
    base_url: String,
    auth: HttpAuthConfig,
    node: String,
}

impl CoordinatorClient {
    pub fn new(coordinator_url: &str, auth: HttpAuthConfig, node: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}{}", coordinator_url.trim_end_matches('/'), API_PREFIX),
            auth,
            node: node.to_string(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.coordinator_url, config.auth.clone(), &config.node_name)
    }

    pub async fn build_ready(&self) -> Result<Vec<PullRequest>, MergerError> {
        let list: PullRequestList = self.get("/pr/build_ready").await?;
        Ok(list.prs)
    }

    /// Returns the coordinator's result string, e.g. `"success"` or `"already claimed"`.
    pub async fn claim(&self, pr_id: i64) -> Result<String, MergerError> {
        self.operation(pr_id, json!({ "operation": "claim_build", "node": self.node }))
            .await
    }

    pub async fn report_success(&self, pr_id: i64, artifact: &str) -> Result<String, MergerError> {
        self.operation(
            pr_id,
            json!({ "operation": "build_success", "node": self.node, "s3_arn": artifact }),
        )
        .await
    }

    pub async fn report_failure(&self, pr_id: i64) -> Result<String, MergerError> {
        self.operation(pr_id, json!({ "operation": "build_failed", "node": self.node }))
            .await
    }

    /// Claim the first buildable pull request that has a number, trying each in
    /// turn until one claim succeeds.
    pub async fn claim_next(&self) -> Result<Option<PullRequest>, MergerError> {
        for pr in self.build_ready().await? {
            if pr.number.is_none() {
                continue;
            }
            let result = self.claim(pr.id).await?;
            if result == ClaimResult::Success.as_str() {
                info!("{} claimed pull request {}", self.node, pr.id);
                return Ok(Some(pr));
            }
            debug!("Claim of pull request {} by {}: {}", pr.id, self.node, result);
        }
        Ok(None)
    }

    pub fn is_success(result: &str) -> bool {
        result == OutcomeResult::Success.as_str()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, MergerError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn operation(&self, pr_id: i64, body: Value) -> Result<String, MergerError> {
        let response = self
            .client
            .post(format!("{}/pr/{}", self.base_url, pr_id))
            .basic_auth(&self.auth.username, Some(&self.auth.password))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let result: OperationResult = response.json().await?;
        Ok(result.result)
    }
}
