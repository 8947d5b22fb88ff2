//! Reddit as a data provider.
//!
//! The rest of the crate only sees the [`RedditApi`] trait: a paginated
//! listing of top submissions and, per submission, a comment forest that can
//! be expanded and flattened. [`RedditClient`] implements it over HTTP.

mod client;
mod forest;
mod models;

pub use client::RedditClient;
pub use forest::{CommentForest, CommentNode, MoreComments, MORE_CHILDREN_BATCH};

use std::fmt;
use std::str::FromStr;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

/// Largest page the listing endpoints will return.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited by reddit (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("{url} returned status {status}")]
    Http { url: String, status: u16 },
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    /// Whether re-running the whole job later has a fair chance of success.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Auth(_) | Self::Decode { .. } => false,
        }
    }
}

/// Time aggregation for a subreddit's top listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeWindow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            _ => Err(format!(
                "unknown time window '{s}', expected hour, day, week, month, year or all"
            )),
        }
    }
}

/// A top-level post in a subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Base-36 id without the `t3_` prefix.
    pub id: String,
    pub title: String,
    pub num_comments: i64,
    pub created_utc: i64,
}

impl Submission {
    #[must_use]
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.id)
    }
}

/// A single comment, detached from its position in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    /// Fullname of the parent: `t3_...` for top-level comments, `t1_...` otherwise.
    pub parent_id: String,
    /// `None` when the account was deleted or the comment removed.
    pub author: Option<String>,
    pub created_utc: i64,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub submissions: Vec<Submission>,
    pub after: Option<String>,
}

/// Everything the extractor needs from Reddit.
#[async_trait]
pub trait RedditApi: Send + Sync {
    /// Fetch one page of a subreddit's top submissions.
    async fn top_page(
        &self,
        subreddit: &str,
        window: TimeWindow,
        after: Option<&str>,
        page_size: usize,
    ) -> Result<Page, ApiError>;

    /// Fetch the initial comment tree of a submission, including any
    /// unexpanded "load more" stubs.
    async fn comment_tree(&self, submission_id: &str) -> Result<CommentForest, ApiError>;

    /// Resolve the comment ids behind a "load more" stub. At most
    /// [`MORE_CHILDREN_BATCH`] ids are passed per call.
    async fn more_children(
        &self,
        submission_id: &str,
        children: &[String],
    ) -> Result<Vec<CommentNode>, ApiError>;

    /// Fetch the subtree rooted at `comment_id`, for "continue this thread"
    /// stubs that carry no child ids.
    async fn comment_thread(
        &self,
        submission_id: &str,
        comment_id: &str,
    ) -> Result<Vec<CommentNode>, ApiError>;
}

/// Lazily walk a subreddit's top listing, following `after` cursors until
/// the listing ends or `limit` submissions have been yielded.
pub fn top_submissions<'a>(
    api: &'a dyn RedditApi,
    subreddit: &'a str,
    window: TimeWindow,
    limit: Option<usize>,
) -> impl Stream<Item = Result<Submission, ApiError>> + 'a {
    try_stream! {
        let mut after: Option<String> = None;
        let mut yielded = 0usize;

        loop {
            let remaining = limit.map(|l| l.saturating_sub(yielded));
            if remaining == Some(0) {
                break;
            }
            let page_size = remaining.map_or(PAGE_SIZE, |r| r.min(PAGE_SIZE));

            let page = api
                .top_page(subreddit, window, after.as_deref(), page_size)
                .await?;
            let exhausted = page.submissions.is_empty();

            for submission in page.submissions {
                if limit.is_some_and(|l| yielded >= l) {
                    break;
                }
                yielded += 1;
                yield submission;
            }

            match page.after {
                Some(next) if !exhausted => after = Some(next),
                _ => break,
            }
        }
    }
}

/// Map Reddit's author field to a usable username.
///
/// Deleted accounts and removed comments come through as `[deleted]` or
/// `[removed]` rather than a missing field.
#[must_use]
pub fn resolve_author(raw: Option<String>) -> Option<String> {
    raw.filter(|name| {
        let name = name.trim();
        !name.is_empty() && name != "[deleted]" && name != "[removed]"
    })
}
