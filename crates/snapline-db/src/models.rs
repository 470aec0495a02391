//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the snapline-types API models; the `From` impls below are
//! the only place the two meet.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use snapline_types::models::{CommentView, DirectMessage, Like, UserSummary};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub name_tag: Option<String>,
    pub avatar: Option<String>,
    pub created_at: String,
}

pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub caption: Option<String>,
    pub created_at: String,
}

/// A comment joined with its author and its reply count.
#[derive(Debug)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub parent_comment: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub children_comment_count: i64,
    pub author_username: String,
    pub author_name_tag: Option<String>,
    pub author_avatar: Option<String>,
}

pub struct LikeRow {
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub message: String,
    pub created_at: String,
}

/// Timestamps are written as RFC 3339; rows created by hand in the sqlite
/// shell may carry the bare `datetime('now')` format instead.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl From<UserRow> for UserSummary {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            name_tag: row.name_tag,
            avatar: row.avatar,
        }
    }
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            content: row.content,
            parent_comment: row.parent_comment,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            children_comment_count: row.children_comment_count,
            user: UserSummary {
                id: row.user_id,
                username: row.author_username,
                name_tag: row.author_name_tag,
                avatar: row.author_avatar,
            },
        }
    }
}

impl From<LikeRow> for Like {
    fn from(row: LikeRow) -> Self {
        Self {
            user_id: row.user_id,
            post_id: row.post_id,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<MessageRow> for DirectMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            source_id: row.source_id,
            target_id: row.target_id,
            message: row.message,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
