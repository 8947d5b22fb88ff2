//! Per-user comment counts.

use anyhow::{Context, Result};
use sqlx::{Executor, Sqlite};
use tracing::trace;

use super::models::{RecordOutcome, UserActivity};

/// Count one comment towards its author.
///
/// A single upsert creates the user with a count of one or bumps the count;
/// `last_seen` only ever moves forward, so out-of-order comments never pull
/// it back. A `None` author is skipped without touching the database.
pub async fn record_comment<'e, E>(
    executor: E,
    author: Option<&str>,
    comment_time: i64,
) -> Result<RecordOutcome>
where
    E: Executor<'e, Database = Sqlite>,
{
    let Some(name) = author else {
        return Ok(RecordOutcome::Skipped);
    };

    let seen_count: i64 = sqlx::query_scalar(
        r"
        INSERT INTO users (name, post_count, last_seen)
        VALUES (?, 1, ?)
        ON CONFLICT(name) DO UPDATE SET
            post_count = post_count + 1,
            last_seen = MAX(last_seen, excluded.last_seen)
        RETURNING post_count
        ",
    )
    .bind(name)
    .bind(comment_time)
    .fetch_one(executor)
    .await
    .with_context(|| format!("Failed to record comment by {name}"))?;

    trace!(name, seen_count, "Recorded comment");

    Ok(if seen_count == 1 {
        RecordOutcome::Created
    } else {
        RecordOutcome::Updated
    })
}

pub async fn get_user<'e, E>(executor: E, name: &str) -> Result<Option<UserActivity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT name, post_count, last_seen FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await
        .context("Failed to fetch user")
}

pub async fn count_users<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(executor)
        .await
        .context("Failed to count users")
}

/// Most active users first; ties broken by most recently seen, then name.
pub async fn top_users<'e, E>(executor: E, limit: i64) -> Result<Vec<UserActivity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        r"
        SELECT name, post_count, last_seen FROM users
        ORDER BY post_count DESC, last_seen DESC, name
        LIMIT ?
        ",
    )
    .bind(limit)
    .fetch_all(executor)
    .await
    .context("Failed to fetch top users")
}

/// Every user, ordered by name.
pub async fn all_users<'e, E>(executor: E) -> Result<Vec<UserActivity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT name, post_count, last_seen FROM users ORDER BY name")
        .fetch_all(executor)
        .await
        .context("Failed to list users")
}
