use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public projection of a user. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub name_tag: Option<String>,
    pub avatar: Option<String>,
}

/// A comment with its author and aggregated reply count, ready to render
/// without a follow-up fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub parent_comment: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub children_comment_count: i64,
    #[serde(rename = "User")]
    pub user: UserSummary,
}

impl CommentView {
    /// Top-level comments have no parent.
    pub fn is_parent(&self) -> bool {
        self.parent_comment.is_none()
    }
}

/// A persisted one-to-one message. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}
