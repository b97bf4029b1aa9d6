use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A reply inside a comment thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    #[serde(rename = "reply_id")]
    pub id: String,
    pub comment_id: String,
    pub author: Option<Author>,
    pub created_at: Option<DateTime<Utc>>,
    pub content: String,
    #[serde(skip)]
    pub deleted: bool,
}

/// A top-level comment with its replies in thread order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    #[serde(rename = "comment_id")]
    pub id: String,
    /// Raw anchor as stored by the remote; opaque to the core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    pub author: Option<Author>,
    pub created_at: Option<DateTime<Utc>>,
    pub content: String,
    /// Text the comment was attached to, when the remote still knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_text: Option<String>,
    pub resolved: bool,
    pub replies: Vec<Reply>,
    #[serde(skip)]
    pub deleted: bool,
}

impl Comment {
    /// Live (not deleted) reply with the given ID.
    pub fn live_reply(&self, reply_id: &str) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == reply_id && !r.deleted)
    }
}

/// Caller-supplied anchor range in the editable index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorRequest {
    pub offset: usize,
    pub length: usize,
    /// Total characters in the anchored region; defaults to `length`.
    pub total_length: Option<usize>,
}

/// Anchor bound to the revision it was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub revision: String,
    pub offset: usize,
    pub length: usize,
    pub total_length: usize,
}

/// One page of comments plus the token for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(id: &str, deleted: bool) -> Reply {
        Reply {
            id: id.to_string(),
            comment_id: "c1".to_string(),
            author: None,
            created_at: None,
            content: "ok".to_string(),
            deleted,
        }
    }

    #[test]
    fn live_reply_ignores_deleted() {
        let comment = Comment {
            id: "c1".into(),
            anchor: None,
            author: None,
            created_at: None,
            content: "note".into(),
            quoted_text: None,
            resolved: false,
            replies: vec![reply("r1", true), reply("r2", false)],
            deleted: false,
        };

        assert!(comment.live_reply("r1").is_none());
        assert!(comment.live_reply("r2").is_some());
        assert!(comment.live_reply("r3").is_none());
    }

    #[test]
    fn serializes_with_tool_facing_names() {
        let comment = Comment {
            id: "c1".into(),
            anchor: None,
            author: Some(Author {
                display_name: "Ada".into(),
                email: None,
            }),
            created_at: None,
            content: "note".into(),
            quoted_text: None,
            resolved: false,
            replies: vec![reply("r2", false)],
            deleted: false,
        };

        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["comment_id"], "c1");
        assert_eq!(json["replies"][0]["reply_id"], "r2");
        assert!(json.get("deleted").is_none());
        assert!(json["author"].get("email").is_none());
    }
}
