//! The set of submissions whose comments have already been counted.

use anyhow::{Context, Result};
use sqlx::{Executor, Sqlite};
use tracing::debug;

/// Whether the submission's comments have already been counted.
pub async fn has_processed<'e, E>(executor: E, post_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?)")
        .bind(post_id)
        .fetch_one(executor)
        .await
        .context("Failed to check post ledger")?;
    Ok(exists != 0)
}

/// Record a submission as fully processed.
///
/// Returns `false` if it was already recorded; a repeat is a no-op.
pub async fn mark_processed<'e, E>(executor: E, post_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    debug!(post_id, "Inserting post");
    let result = sqlx::query("INSERT INTO posts (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
        .bind(post_id)
        .execute(executor)
        .await
        .context("Failed to insert post")?;
    Ok(result.rows_affected() == 1)
}

pub async fn processed_count<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(executor)
        .await
        .context("Failed to count posts")
}

/// All processed submission ids, sorted.
pub async fn processed_ids<'e, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT id FROM posts ORDER BY id")
        .fetch_all(executor)
        .await
        .context("Failed to list posts")
}
