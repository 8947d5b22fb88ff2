//! The extraction pass: top submissions in, per-user activity out.

use anyhow::Context;
use futures_util::{pin_mut, StreamExt};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{self, Database, RecordOutcome};
use crate::reddit::{top_submissions, ApiError, RedditApi, Submission, TimeWindow};

/// Progress is logged this many times per submission.
const PROGRESS_STEPS: usize = 5;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Provider(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl WatchError {
    /// Which phase of the run failed.
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Provider(ApiError::Auth(_)) => "auth",
            Self::Provider(_) => "fetch",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether re-running the job later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_transient())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub subreddit: String,
    pub window: TimeWindow,
    /// Maximum submissions to look at; `None` walks the whole listing.
    pub limit: Option<usize>,
    /// Maximum "load more" stubs to expand per submission; `None` expands all.
    pub expand_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub submissions_seen: usize,
    pub submissions_skipped: usize,
    pub submissions_processed: usize,
    pub comments_recorded: usize,
    pub comments_skipped: usize,
    pub users_created: usize,
}

#[derive(Debug, Default)]
struct SubmissionStats {
    comments_recorded: usize,
    comments_skipped: usize,
    users_created: usize,
}

/// Walk the subreddit's top submissions and count every new comment.
///
/// Submissions already in the ledger are skipped without fetching their
/// comments. Each new submission is counted in its own transaction, so a
/// failure leaves it unmarked and uncounted for the next run to retry.
///
/// # Errors
///
/// Stops at the first provider or storage error.
pub async fn extract_commenters(
    api: &dyn RedditApi,
    db: &Database,
    options: &ExtractOptions,
) -> Result<RunSummary, WatchError> {
    info!(
        subreddit = %options.subreddit,
        window = %options.window,
        limit = ?options.limit,
        "Scanning top submissions"
    );

    let mut summary = RunSummary::default();
    let submissions = top_submissions(api, &options.subreddit, options.window, options.limit);
    pin_mut!(submissions);

    while let Some(submission) = submissions.next().await {
        let submission = submission?;
        summary.submissions_seen += 1;
        info!(id = %submission.id, title = %submission.title, "Checking submission");

        if db::has_processed(db.pool(), &submission.id).await? {
            debug!(id = %submission.id, "Submission already processed, skipping");
            summary.submissions_skipped += 1;
            continue;
        }

        let stats = process_submission(api, db, &submission, options.expand_limit).await?;
        summary.submissions_processed += 1;
        summary.comments_recorded += stats.comments_recorded;
        summary.comments_skipped += stats.comments_skipped;
        summary.users_created += stats.users_created;
    }

    info!(
        seen = summary.submissions_seen,
        skipped = summary.submissions_skipped,
        processed = summary.submissions_processed,
        comments = summary.comments_recorded,
        anonymous = summary.comments_skipped,
        new_users = summary.users_created,
        "Extraction complete"
    );
    Ok(summary)
}

async fn process_submission(
    api: &dyn RedditApi,
    db: &Database,
    submission: &Submission,
    expand_limit: Option<usize>,
) -> Result<SubmissionStats, WatchError> {
    let mut forest = api.comment_tree(&submission.id).await?;
    let expanded = forest.replace_more(api, expand_limit).await?;
    let comments = forest.list();
    let total = comments.len();
    debug!(id = %submission.id, total, expanded, "Comment tree loaded");

    let step = (total / PROGRESS_STEPS).max(1);
    let mut stats = SubmissionStats::default();
    let mut tx = db
        .pool()
        .begin()
        .await
        .context("Failed to begin submission transaction")?;

    for (i, comment) in comments.iter().enumerate() {
        if i % step == 0 {
            info!(id = %submission.id, "Processing comment {} / {}", i + 1, total);
        }

        match db::record_comment(&mut *tx, comment.author.as_deref(), comment.created_utc).await? {
            RecordOutcome::Skipped => {
                debug!(comment = %comment.id, "Commenter is empty, skipping");
                stats.comments_skipped += 1;
            }
            outcome => {
                debug!(
                    comment = %comment.id,
                    author = comment.author.as_deref().unwrap_or_default(),
                    at = %format_timestamp(comment.created_utc),
                    new_user = outcome == RecordOutcome::Created,
                    "Recorded comment"
                );
                stats.comments_recorded += 1;
                if outcome == RecordOutcome::Created {
                    stats.users_created += 1;
                }
            }
        }
    }

    db::mark_processed(&mut *tx, &submission.id).await?;
    tx.commit()
        .await
        .context("Failed to commit submission transaction")?;

    Ok(stats)
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0).map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_phase() {
        assert_eq!(
            WatchError::from(ApiError::Auth("nope".to_string())).phase(),
            "auth"
        );
        assert_eq!(
            WatchError::from(ApiError::RateLimited { retry_after: Some(5) }).phase(),
            "fetch"
        );
        assert_eq!(
            WatchError::from(anyhow::anyhow!("disk full")).phase(),
            "storage"
        );
    }

    #[test]
    fn test_transient_only_for_provider_errors() {
        assert!(WatchError::from(ApiError::RateLimited { retry_after: None }).is_transient());
        assert!(!WatchError::from(anyhow::anyhow!("locked")).is_transient());
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
