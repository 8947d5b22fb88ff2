use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Databases written by earlier tooling already have these tables; the
    // IF NOT EXISTS keeps their rows.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            name TEXT PRIMARY KEY,
            post_count INTEGER NOT NULL CHECK (post_count >= 1),
            last_seen INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    Ok(())
}

/// Upgrade the count-only `users(name, seen)` layout, which had no timestamp.
async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('users')")
        .fetch_all(pool)
        .await
        .context("Failed to inspect users table")?;

    let is_legacy = columns.iter().any(|c| c == "seen")
        && !columns.iter().any(|c| c == "last_seen");
    if !is_legacy {
        debug!("Migration v2: users table already has timestamps");
        return Ok(());
    }

    info!("Upgrading count-only users table; existing users get last_seen = 0");

    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin users upgrade transaction")?;

    sqlx::query("ALTER TABLE users RENAME TO users_count_only")
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r"
        CREATE TABLE users (
            name TEXT PRIMARY KEY,
            post_count INTEGER NOT NULL CHECK (post_count >= 1),
            last_seen INTEGER NOT NULL
        )
        ",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        r"
        INSERT INTO users (name, post_count, last_seen)
        SELECT name, MAX(seen, 1), 0 FROM users_count_only
        ",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query("DROP TABLE users_count_only")
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .context("Failed to commit users upgrade")?;
    Ok(())
}
