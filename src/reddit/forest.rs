use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use super::{ApiError, Comment, RedditApi};

/// Most comment ids the `morechildren` endpoint accepts in one request.
pub const MORE_CHILDREN_BATCH: usize = 100;

/// A placeholder for comments Reddit did not include in the initial tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreComments {
    pub id: String,
    pub parent_id: String,
    pub count: i64,
    pub children: Vec<String>,
}

impl MoreComments {
    /// "Continue this thread" stubs carry no ids; the subtree has to be
    /// fetched from the parent comment's own page instead.
    #[must_use]
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

/// A node as delivered by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentNode {
    Comment {
        comment: Comment,
        replies: Vec<CommentNode>,
    },
    More(MoreComments),
}

impl CommentNode {
    #[must_use]
    pub fn leaf(comment: Comment) -> Self {
        Self::Comment {
            comment,
            replies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    comment: Comment,
    replies: Vec<String>,
}

/// The comment tree of one submission.
///
/// Comments are kept in an arena keyed by id, so "load more" results can be
/// attached under parents found anywhere in the tree, and a comment delivered
/// twice is only stored once.
#[derive(Debug, Clone)]
pub struct CommentForest {
    submission_id: String,
    top_level: Vec<String>,
    entries: HashMap<String, Entry>,
    more: Vec<MoreComments>,
}

impl CommentForest {
    #[must_use]
    pub fn new(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            top_level: Vec::new(),
            entries: HashMap::new(),
            more: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_nodes(submission_id: &str, nodes: Vec<CommentNode>) -> Self {
        let mut forest = Self::new(submission_id);
        forest.extend(nodes);
        forest
    }

    #[must_use]
    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    /// Number of distinct comments currently in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of "load more" stubs not yet replaced.
    #[must_use]
    pub fn pending_more(&self) -> usize {
        self.more.len()
    }

    fn extend(&mut self, nodes: Vec<CommentNode>) {
        for node in nodes {
            self.insert(node);
        }
    }

    fn insert(&mut self, node: CommentNode) {
        match node {
            CommentNode::More(more) => self.more.push(more),
            CommentNode::Comment { comment, replies } => {
                if !self.entries.contains_key(&comment.id) {
                    let id = comment.id.clone();
                    match comment
                        .parent_id
                        .strip_prefix("t1_")
                        .and_then(|parent| self.entries.get_mut(parent))
                    {
                        Some(parent) => parent.replies.push(id.clone()),
                        None => self.top_level.push(id.clone()),
                    }
                    self.entries.insert(
                        id,
                        Entry {
                            comment,
                            replies: Vec::new(),
                        },
                    );
                }
                // Replies of an already-known comment may still be new.
                self.extend(replies);
            }
        }
    }

    /// Replace "load more" stubs with the comments behind them.
    ///
    /// Stubs are expanded largest first. With `Some(limit)`, at most `limit`
    /// stubs are replaced and the rest are discarded; with `None` expansion
    /// continues until no stubs remain. Returns the number of stubs replaced.
    ///
    /// # Errors
    ///
    /// Returns the first error from the API; the forest is left partially
    /// expanded.
    pub async fn replace_more(
        &mut self,
        api: &dyn RedditApi,
        limit: Option<usize>,
    ) -> Result<usize, ApiError> {
        let mut replaced = 0usize;
        let mut expanded: HashSet<(String, String)> = HashSet::new();

        while !self.more.is_empty() {
            if limit.is_some_and(|l| replaced >= l) {
                debug!(
                    submission = %self.submission_id,
                    discarded = self.more.len(),
                    "Expansion limit reached, dropping remaining stubs"
                );
                self.more.clear();
                break;
            }

            let stub = self.take_largest_stub();
            if !expanded.insert((stub.id.clone(), stub.parent_id.clone())) {
                trace!(stub = %stub.id, "Stub already expanded, ignoring");
                continue;
            }

            let nodes = if stub.is_continue_thread() {
                let Some(comment_id) = stub.parent_id.strip_prefix("t1_") else {
                    continue;
                };
                api.comment_thread(&self.submission_id, comment_id).await?
            } else {
                let mut nodes = Vec::new();
                for chunk in stub.children.chunks(MORE_CHILDREN_BATCH) {
                    nodes.extend(api.more_children(&self.submission_id, chunk).await?);
                }
                nodes
            };

            trace!(stub = %stub.id, count = stub.count, fetched = nodes.len(), "Replaced stub");
            self.extend(nodes);
            replaced += 1;
        }

        Ok(replaced)
    }

    fn take_largest_stub(&mut self) -> MoreComments {
        let mut best = 0;
        for (i, stub) in self.more.iter().enumerate() {
            if stub.count > self.more[best].count {
                best = i;
            }
        }
        self.more.remove(best)
    }

    /// Flatten the tree breadth-first: all top-level comments in order, then
    /// their replies, and so on.
    #[must_use]
    pub fn list(&self) -> Vec<&Comment> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut queue: VecDeque<&str> = self.top_level.iter().map(String::as_str).collect();

        while let Some(id) = queue.pop_front() {
            if let Some(entry) = self.entries.get(id) {
                out.push(&entry.comment);
                queue.extend(entry.replies.iter().map(String::as_str));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::reddit::{Page, TimeWindow};

    fn comment(id: &str, parent: &str, author: &str) -> Comment {
        Comment {
            id: id.to_string(),
            parent_id: parent.to_string(),
            author: Some(author.to_string()),
            created_utc: 1_700_000_000,
        }
    }

    fn more(id: &str, parent: &str, children: &[&str]) -> CommentNode {
        CommentNode::More(MoreComments {
            id: id.to_string(),
            parent_id: parent.to_string(),
            count: children.len() as i64,
            children: children.iter().map(ToString::to_string).collect(),
        })
    }

    fn ids(forest: &CommentForest) -> Vec<&str> {
        forest.list().iter().map(|c| c.id.as_str()).collect()
    }

    /// Answers `more_children` with one leaf per requested id.
    #[derive(Default)]
    struct Expander {
        more_calls: Mutex<Vec<usize>>,
        thread_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RedditApi for Expander {
        async fn top_page(
            &self,
            _subreddit: &str,
            _window: TimeWindow,
            _after: Option<&str>,
            _page_size: usize,
        ) -> Result<Page, ApiError> {
            Ok(Page::default())
        }

        async fn comment_tree(&self, submission_id: &str) -> Result<CommentForest, ApiError> {
            Ok(CommentForest::new(submission_id))
        }

        async fn more_children(
            &self,
            _submission_id: &str,
            children: &[String],
        ) -> Result<Vec<CommentNode>, ApiError> {
            self.more_calls.lock().unwrap().push(children.len());
            Ok(children
                .iter()
                .map(|id| CommentNode::leaf(comment(id, "t3_post", "loaded")))
                .collect())
        }

        async fn comment_thread(
            &self,
            _submission_id: &str,
            comment_id: &str,
        ) -> Result<Vec<CommentNode>, ApiError> {
            self.thread_calls.lock().unwrap().push(comment_id.to_string());
            Ok(vec![CommentNode::Comment {
                comment: comment(comment_id, "t1_ignored", "again"),
                replies: vec![CommentNode::leaf(comment(
                    "deep",
                    &format!("t1_{comment_id}"),
                    "diver",
                ))],
            }])
        }
    }

    #[test]
    fn test_list_is_breadth_first() {
        let forest = CommentForest::from_nodes(
            "post",
            vec![
                CommentNode::Comment {
                    comment: comment("a", "t3_post", "alice"),
                    replies: vec![CommentNode::Comment {
                        comment: comment("a1", "t1_a", "bob"),
                        replies: vec![CommentNode::leaf(comment("a1x", "t1_a1", "carol"))],
                    }],
                },
                CommentNode::Comment {
                    comment: comment("b", "t3_post", "dave"),
                    replies: vec![CommentNode::leaf(comment("b1", "t1_b", "erin"))],
                },
            ],
        );

        assert_eq!(ids(&forest), vec!["a", "b", "a1", "b1", "a1x"]);
        assert_eq!(forest.len(), 5);
    }

    #[test]
    fn test_duplicate_comments_are_stored_once() {
        let forest = CommentForest::from_nodes(
            "post",
            vec![
                CommentNode::leaf(comment("a", "t3_post", "alice")),
                CommentNode::leaf(comment("a", "t3_post", "alice")),
            ],
        );
        assert_eq!(ids(&forest), vec!["a"]);
    }

    #[test]
    fn test_orphans_are_kept_at_top_level() {
        let forest =
            CommentForest::from_nodes("post", vec![CommentNode::leaf(comment("x", "t1_gone", "z"))]);
        assert_eq!(ids(&forest), vec!["x"]);
    }

    #[tokio::test]
    async fn test_replace_more_unbounded() {
        let mut forest = CommentForest::from_nodes(
            "post",
            vec![
                CommentNode::leaf(comment("a", "t3_post", "alice")),
                more("m1", "t3_post", &["c", "d"]),
                more("m2", "t1_a", &["e"]),
            ],
        );
        assert_eq!(forest.pending_more(), 2);

        let api = Expander::default();
        let replaced = forest.replace_more(&api, None).await.unwrap();

        assert_eq!(replaced, 2);
        assert_eq!(forest.pending_more(), 0);
        assert_eq!(forest.len(), 4);
        // Largest stub first.
        assert_eq!(*api.more_calls.lock().unwrap(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_replace_more_limit_discards_the_rest() {
        let mut forest = CommentForest::from_nodes(
            "post",
            vec![
                more("small", "t3_post", &["s"]),
                more("big", "t3_post", &["b1", "b2", "b3"]),
            ],
        );

        let api = Expander::default();
        let replaced = forest.replace_more(&api, Some(1)).await.unwrap();

        assert_eq!(replaced, 1);
        assert_eq!(forest.pending_more(), 0);
        assert_eq!(ids(&forest), vec!["b1", "b2", "b3"]);
    }

    #[tokio::test]
    async fn test_replace_more_zero_limit_only_drops_stubs() {
        let mut forest = CommentForest::from_nodes(
            "post",
            vec![
                CommentNode::leaf(comment("a", "t3_post", "alice")),
                more("m", "t3_post", &["x"]),
            ],
        );
        let api = Expander::default();
        assert_eq!(forest.replace_more(&api, Some(0)).await.unwrap(), 0);
        assert_eq!(ids(&forest), vec!["a"]);
        assert!(api.more_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_more_batches_large_stubs() {
        let children: Vec<String> = (0..250).map(|i| format!("c{i}")).collect();
        let refs: Vec<&str> = children.iter().map(String::as_str).collect();
        let mut forest = CommentForest::from_nodes("post", vec![more("m", "t3_post", &refs)]);

        let api = Expander::default();
        forest.replace_more(&api, None).await.unwrap();

        assert_eq!(*api.more_calls.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(forest.len(), 250);
    }

    #[tokio::test]
    async fn test_continue_thread_fetches_parent_subtree() {
        let mut forest = CommentForest::from_nodes(
            "post",
            vec![CommentNode::Comment {
                comment: comment("a", "t3_post", "alice"),
                replies: vec![more("_", "t1_a", &[])],
            }],
        );

        let api = Expander::default();
        forest.replace_more(&api, None).await.unwrap();

        assert_eq!(*api.thread_calls.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(ids(&forest), vec!["a", "deep"]);
        // The focal comment is not re-added with the refetched author.
        assert_eq!(forest.list()[0].author.as_deref(), Some("alice"));
    }
}
