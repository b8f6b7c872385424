pub mod claims;
pub mod models;
pub mod queries;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::MergerError;
use models::NewPullRequest;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, MergerError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Database { pool })
    }

    /// Single-connection in-memory database; the connection is never recycled
    /// because dropping it would discard the data.
    pub async fn new_in_memory() -> Result<Self, MergerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), MergerError> {
        sqlx::raw_sql(schema::INITIAL_SCHEMA)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a pull request, or refresh its mutable fields if already known.
    ///
    /// Claim fields and the commits of the pull request are left untouched.
    pub async fn upsert_pull_request(&self, pr: &NewPullRequest) -> Result<(), MergerError> {
        upsert_pull_request(&self.pool, pr).await?;
        debug!("Upserted pull request {} ({})", pr.id, pr.project);
        Ok(())
    }

    /// Record the commits of a pull request in replay order, ordinality starting at 1.
    ///
    /// Existing rows are kept as they are, so approval and merge flags survive a re-import.
    pub async fn insert_commits(&self, pr_id: i64, shas: &[String]) -> Result<u64, MergerError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for (index, sha) in shas.iter().enumerate() {
            let result = sqlx::query(
                r#"
                INSERT INTO pull_request_commit (pr_id, ordinality, sha)
                VALUES (?, ?, ?)
                ON CONFLICT (pr_id, ordinality) DO NOTHING
                "#,
            )
            .bind(pr_id)
            .bind(index as i64 + 1)
            .bind(sha)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Approve commits for inclusion in a batch.
    pub async fn mark_commits_to_merge(&self, shas: &[String]) -> Result<u64, MergerError> {
        self.set_commit_flag("to_merge", shas).await
    }

    /// Flag commits as already present downstream, e.g. merged by hand.
    pub async fn mark_commits_merged(&self, shas: &[String]) -> Result<u64, MergerError> {
        self.set_commit_flag("merged", shas).await
    }

    async fn set_commit_flag(
        &self,
        column: &'static str,
        shas: &[String],
    ) -> Result<u64, MergerError> {
        let statement = format!("UPDATE pull_request_commit SET {} = 1 WHERE sha = ?", column);
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for sha in shas {
            let result = sqlx::query(&statement).bind(sha).execute(&mut *tx).await?;
            updated += result.rows_affected();
        }
        tx.commit().await?;
        info!("Set {} on {} commit rows", column, updated);
        Ok(updated)
    }

    /// Store a freshly raised batch pull request and mark every pending approved
    /// commit of `pr_ids` as merged into it, atomically.
    pub async fn record_published_batch(
        &self,
        raised: &NewPullRequest,
        pr_ids: &[i64],
    ) -> Result<u64, MergerError> {
        let mut tx = self.pool.begin().await?;

        upsert_pull_request(&mut *tx, raised).await?;

        let mut updated = 0;
        for pr_id in pr_ids {
            let result = sqlx::query(
                r#"
                UPDATE pull_request_commit
                SET merged = 1, raised_pr_id = ?
                WHERE pr_id = ? AND to_merge = 1 AND merged = 0
                "#,
            )
            .bind(raised.id)
            .bind(pr_id)
            .execute(&mut *tx)
            .await?;
            updated += result.rows_affected();
        }

        tx.commit().await?;
        info!(
            "Recorded batch pull request {} covering {:?} ({} commits)",
            raised.id, pr_ids, updated
        );
        Ok(updated)
    }
}

async fn upsert_pull_request<'e, E>(executor: E, pr: &NewPullRequest) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO pull_request
            (id, number, project, url, html_url, state, title, user_login, assignee_login,
             milestone_title, base_ref, body, created_at, merged_at, merge_commit_sha)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            number = excluded.number,
            html_url = excluded.html_url,
            state = excluded.state,
            title = excluded.title,
            assignee_login = excluded.assignee_login,
            milestone_title = excluded.milestone_title,
            merged_at = excluded.merged_at,
            merge_commit_sha = excluded.merge_commit_sha
        "#,
    )
    .bind(pr.id)
    .bind(pr.number)
    .bind(&pr.project)
    .bind(&pr.url)
    .bind(&pr.html_url)
    .bind(pr.state.as_str())
    .bind(&pr.title)
    .bind(&pr.user_login)
    .bind(&pr.assignee_login)
    .bind(&pr.milestone_title)
    .bind(&pr.base_ref)
    .bind(&pr.body)
    .bind(pr.created_at)
    .bind(pr.merged_at)
    .bind(&pr.merge_commit_sha)
    .execute(executor)
    .await?;
    Ok(())
}
