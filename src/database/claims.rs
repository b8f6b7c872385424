//! Build-claim transitions on `pull_request`.
//!
//! Every transition is a single conditional `UPDATE`, so concurrent callers are
//! serialised by the store itself: exactly one claim can match `build_node IS NULL`.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::models::ClaimUpdate;
use super::Database;
use crate::error::MergerError;

impl Database {
    /// Tentatively claim `pr_id` for `node`. Returns `AlreadyClaimed` when the
    /// update matched no row.
    pub async fn claim_build(
        &self,
        pr_id: i64,
        node: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimUpdate, MergerError> {
        self.claim_build_with_lease(pr_id, node, now, None).await
    }

    /// Like [Database::claim_build], but a claim taken before `stale_before`
    /// that never produced an artifact is taken over in the same statement.
    pub async fn claim_build_with_lease(
        &self,
        pr_id: i64,
        node: &str,
        now: DateTime<Utc>,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<ClaimUpdate, MergerError> {
        let result = sqlx::query(
            r#"
            UPDATE pull_request
            SET build_node = ?, claimed_at = ?
            WHERE id = ?
              AND (
                build_node IS NULL
                OR (? IS NOT NULL AND s3_arn IS NULL AND claimed_at < ?)
              )
            "#,
        )
        .bind(node)
        .bind(now)
        .bind(pr_id)
        .bind(stale_before)
        .bind(stale_before)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            info!("Pull request {} already claimed, {} lost the race", pr_id, node);
            Ok(ClaimUpdate::AlreadyClaimed)
        } else {
            info!("Pull request {} claimed by {}", pr_id, node);
            Ok(ClaimUpdate::Claimed)
        }
    }

    /// Record the host-side assignee once the claim has been confirmed remotely.
    pub async fn confirm_claim(
        &self,
        pr_id: i64,
        node: &str,
        assignee: &str,
    ) -> Result<bool, MergerError> {
        let result = sqlx::query(
            "UPDATE pull_request SET assignee_login = ? WHERE id = ? AND build_node = ?",
        )
        .bind(assignee)
        .bind(pr_id)
        .bind(node)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop a claim held by `node`. Claims held by anyone else are left alone.
    pub async fn release_claim(&self, pr_id: i64, node: &str) -> Result<bool, MergerError> {
        let result = sqlx::query(
            r#"
            UPDATE pull_request
            SET build_node = NULL, claimed_at = NULL, assignee_login = NULL
            WHERE id = ? AND build_node = ?
            "#,
        )
        .bind(pr_id)
        .bind(node)
        .execute(self.pool())
        .await?;

        let released = result.rows_affected() == 1;
        if !released {
            warn!("Pull request {} is not claimed by {}, nothing released", pr_id, node);
        }
        Ok(released)
    }

    /// Store the artifact of a successful build. The claim stays in place so
    /// the pull request is not offered for building again.
    pub async fn record_build_success(
        &self,
        pr_id: i64,
        node: &str,
        artifact_location: &str,
    ) -> Result<bool, MergerError> {
        let result = sqlx::query(
            "UPDATE pull_request SET s3_arn = ?, test_node = ? WHERE id = ? AND build_node = ?",
        )
        .bind(artifact_location)
        .bind(node)
        .bind(pr_id)
        .bind(node)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Release claims taken before `cutoff` that never produced an artifact.
    pub async fn expire_stale_claims(&self, cutoff: DateTime<Utc>) -> Result<u64, MergerError> {
        let result = sqlx::query(
            r#"
            UPDATE pull_request
            SET build_node = NULL, claimed_at = NULL, assignee_login = NULL
            WHERE build_node IS NOT NULL
              AND s3_arn IS NULL
              AND claimed_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            warn!("Expired {} stale build claims older than {}", expired, cutoff);
        }
        Ok(expired)
    }
}
