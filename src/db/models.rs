use serde::{Deserialize, Serialize};

/// Aggregated activity of one commenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserActivity {
    pub name: String,
    /// Number of comments seen from this user across all runs.
    #[sqlx(rename = "post_count")]
    pub seen_count: i64,
    /// Unix timestamp of the newest comment seen.
    #[sqlx(rename = "last_seen")]
    pub last_seen_time: i64,
}

/// What [`record_comment`](super::record_comment) did with a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First comment ever seen from this user.
    Created,
    Updated,
    /// The author was deleted or anonymised; nothing was written.
    Skipped,
}
