use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::{InvalidId, optional_id};
use crate::models::{CommentView, DirectMessage, Like};

// -- Errors --

/// Body of every non-2xx REST response, and of plain acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: Option<String>,
    /// Kept raw so a malformed value can be told apart from "no parent"
    #[serde(default)]
    pub parent_comment: Option<Value>,
}

impl CreateCommentRequest {
    pub fn parent_id(&self) -> Result<Option<i64>, InvalidId> {
        optional_id(self.parent_comment.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct EditCommentRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPage {
    pub data: Vec<CommentView>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub item_count: i64,
    pub take: i64,
    pub page: i64,
    pub page_count: i64,
    pub has_next_page: bool,
}

impl PageMeta {
    /// `take` must be positive.
    pub fn new(item_count: i64, page: i64, take: i64) -> Self {
        let page_count = (item_count + take - 1) / take;
        Self {
            item_count,
            take,
            page,
            page_count,
            has_next_page: page < page_count,
        }
    }
}

// -- Likes --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikesCountResponse {
    pub likes_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeListResponse {
    pub likes: i64,
    pub data: Vec<Like>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub data: Vec<DirectMessage>,
}
