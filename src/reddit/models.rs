//! Wire types for Reddit's JSON API.

use serde::{Deserialize, Deserializer};

use super::{resolve_author, Comment, CommentNode, MoreComments, Submission};

/// Reddit wraps every object as `{"kind": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Thing {
    Listing(Listing),
    #[serde(rename = "t1")]
    Comment(Box<RawComment>),
    #[serde(rename = "t3")]
    Link(RawLink),
    #[serde(rename = "more")]
    More(RawMore),
}

#[derive(Debug, Default, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
pub struct RawComment {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub author: Option<String>,
    pub created_utc: f64,
    #[serde(default, deserialize_with = "deserialize_replies")]
    pub replies: Option<Listing>,
}

#[derive(Debug, Deserialize)]
pub struct RawLink {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawMore {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub children: Vec<String>,
}

/// Response of `/api/morechildren?api_type=json`.
#[derive(Debug, Deserialize)]
pub struct MoreChildrenResponse {
    pub json: MoreChildrenBody,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenBody {
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<Thing>,
}

/// Response of `/api/v1/access_token`.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `replies` is an empty string when a comment has none.
fn deserialize_replies<'de, D>(deserializer: D) -> Result<Option<Listing>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Replies {
        Thing(Thing),
        Empty(String),
    }

    Ok(match Option::<Replies>::deserialize(deserializer)? {
        Some(Replies::Thing(Thing::Listing(listing))) => Some(listing),
        _ => None,
    })
}

impl From<RawLink> for Submission {
    fn from(raw: RawLink) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            num_comments: raw.num_comments,
            created_utc: raw.created_utc as i64,
        }
    }
}

impl From<RawMore> for MoreComments {
    fn from(raw: RawMore) -> Self {
        Self {
            id: raw.id,
            parent_id: raw.parent_id,
            count: raw.count,
            children: raw.children,
        }
    }
}

impl Listing {
    /// Submissions in listing order; anything else is ignored.
    pub fn into_submissions(self) -> Vec<Submission> {
        self.children
            .into_iter()
            .filter_map(|thing| match thing {
                Thing::Link(link) => Some(link.into()),
                _ => None,
            })
            .collect()
    }

    pub fn into_nodes(self) -> Vec<CommentNode> {
        into_nodes(self.children)
    }
}

/// Convert comment and "more" things into tree nodes, recursing into replies.
pub fn into_nodes(things: Vec<Thing>) -> Vec<CommentNode> {
    things
        .into_iter()
        .filter_map(|thing| match thing {
            Thing::Comment(raw) => {
                let RawComment {
                    id,
                    parent_id,
                    author,
                    created_utc,
                    replies,
                } = *raw;
                Some(CommentNode::Comment {
                    comment: Comment {
                        id,
                        parent_id,
                        author: resolve_author(author),
                        created_utc: created_utc as i64,
                    },
                    replies: replies.map(Listing::into_nodes).unwrap_or_default(),
                })
            }
            Thing::More(more) => Some(CommentNode::More(more.into())),
            Thing::Listing(_) | Thing::Link(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENT_PAGE: &str = r#"[
      {"kind": "Listing", "data": {"after": null, "children": [
        {"kind": "t3", "data": {"id": "abc123", "title": "Hello", "num_comments": 4, "created_utc": 1700000000.0}}
      ]}},
      {"kind": "Listing", "data": {"after": null, "children": [
        {"kind": "t1", "data": {
          "id": "c1", "parent_id": "t3_abc123", "author": "alice", "created_utc": 1700000100.0,
          "replies": {"kind": "Listing", "data": {"after": null, "children": [
            {"kind": "t1", "data": {"id": "c2", "parent_id": "t1_c1", "author": "[deleted]",
              "created_utc": 1700000200, "replies": ""}},
            {"kind": "more", "data": {"id": "c9", "parent_id": "t1_c1", "count": 3,
              "children": ["c9", "c10", "c11"]}}
          ]}}
        }},
        {"kind": "t1", "data": {"id": "c3", "parent_id": "t3_abc123", "author": "bob",
          "created_utc": 1700000300.5, "replies": ""}}
      ]}}
    ]"#;

    #[test]
    fn test_parse_comment_page() {
        let things: Vec<Thing> = serde_json::from_str(COMMENT_PAGE).unwrap();
        assert_eq!(things.len(), 2);

        let mut things = things.into_iter();
        let Some(Thing::Listing(links)) = things.next() else {
            panic!("expected link listing");
        };
        let submissions = links.into_submissions();
        assert_eq!(submissions[0].id, "abc123");
        assert_eq!(submissions[0].num_comments, 4);

        let Some(Thing::Listing(comments)) = things.next() else {
            panic!("expected comment listing");
        };
        let nodes = comments.into_nodes();
        assert_eq!(nodes.len(), 2);

        let CommentNode::Comment { comment, replies } = &nodes[0] else {
            panic!("expected comment");
        };
        assert_eq!(comment.author.as_deref(), Some("alice"));
        assert_eq!(comment.created_utc, 1_700_000_100);
        assert_eq!(replies.len(), 2);

        let CommentNode::Comment { comment: deleted, .. } = &replies[0] else {
            panic!("expected comment");
        };
        assert_eq!(deleted.author, None);

        let CommentNode::More(more) = &replies[1] else {
            panic!("expected more stub");
        };
        assert_eq!(more.count, 3);
        assert_eq!(more.children, vec!["c9", "c10", "c11"]);

        let CommentNode::Comment { comment: bob, .. } = &nodes[1] else {
            panic!("expected comment");
        };
        assert_eq!(bob.created_utc, 1_700_000_300);
    }

    #[test]
    fn test_parse_more_children_response() {
        let body = r#"{"json": {"errors": [], "data": {"things": [
            {"kind": "t1", "data": {"id": "c9", "parent_id": "t1_c1", "author": "carol",
              "created_utc": 1700000400.0, "replies": ""}},
            {"kind": "more", "data": {"id": "_", "parent_id": "t1_c9", "count": 0, "children": []}}
        ]}}}"#;
        let response: MoreChildrenResponse = serde_json::from_str(body).unwrap();
        assert!(response.json.errors.is_empty());
        let nodes = into_nodes(response.json.data.unwrap().things);
        assert_eq!(nodes.len(), 2);
        assert!(matches!(&nodes[1], CommentNode::More(m) if m.is_continue_thread()));
    }

    #[test]
    fn test_missing_author_field() {
        let body = r#"{"kind": "t1", "data": {"id": "x", "parent_id": "t3_p", "created_utc": 1.0}}"#;
        let thing: Thing = serde_json::from_str(body).unwrap();
        let nodes = into_nodes(vec![thing]);
        let CommentNode::Comment { comment, replies } = &nodes[0] else {
            panic!("expected comment");
        };
        assert_eq!(comment.author, None);
        assert!(replies.is_empty());
    }
}
