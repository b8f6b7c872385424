use tracing::debug;

use crate::database::queries::{PendingPullRequest, Queries};
use crate::database::Database;
use crate::error::MergerError;

/// Pull requests with approved, unmerged commits, ordered by upstream merge
/// time then id, each listed once.
pub async fn select_candidates(
    database: &Database,
) -> Result<Vec<PendingPullRequest>, MergerError> {
    let candidates = Queries::pending_pull_requests(database.pool()).await?;
    debug!(
        "Selected {} candidate pull requests: {:?}",
        candidates.len(),
        candidates.iter().map(|c| c.pr_id).collect::<Vec<_>>()
    );
    Ok(candidates)
}
