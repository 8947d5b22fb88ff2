use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use snoo_watch::config::{Cli, Config, LogLevel};
use snoo_watch::db::Database;
use snoo_watch::extract::extract_commenters;
use snoo_watch::reddit::RedditClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_level)?;

    debug!(?cli, "Arguments");

    let config = Config::from_cli(&cli).context("config: failed to load configuration")?;
    config.validate().context("config: invalid configuration")?;

    info!("Setting up Reddit API");
    let client = RedditClient::new(&config).context("auth: failed to build Reddit client")?;
    client
        .authenticate()
        .await
        .context("auth: Reddit rejected the application credentials")?;

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!(
                    "storage: failed to create database directory: {}",
                    parent.display()
                )
            })?;
        }
    }
    let db = Database::new(&config.database_path)
        .await
        .context("storage: failed to initialize database")?;

    info!(subreddit = %config.subreddit, "Getting subreddit");
    let result = extract_commenters(&client, &db, &config.extract_options()).await;
    db.close().await;

    match result {
        Ok(summary) => {
            info!(
                processed = summary.submissions_processed,
                skipped = summary.submissions_skipped,
                comments = summary.comments_recorded,
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            if e.is_transient() {
                warn!("Failure looks transient; re-running is safe, finished submissions will be skipped");
            }
            let phase = e.phase();
            Err(anyhow::Error::new(e)
                .context(format!("{phase}: extraction from r/{} failed", config.subreddit)))
        }
    }
}

fn init_tracing(level: Option<LogLevel>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("{},sqlx=warn", level.directive())),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
