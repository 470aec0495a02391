use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use snapline_db::queries::ParentNotFound;
use snapline_gateway::RoomKey;
use snapline_types::api::{CommentPage, CreateCommentRequest, EditCommentRequest, MessageBody, PageMeta};
use snapline_types::coerce::parse_id;
use snapline_types::events::GatewayEvent;
use snapline_types::models::CommentView;

use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on `take` for comment listing.
const MAX_TAKE: i64 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQuery {
    pub post_id: Option<String>,
    pub user_id: Option<String>,
    pub page: Option<String>,
    pub take: Option<String>,
}

fn id_param(raw: &Option<String>) -> Option<i64> {
    raw.as_deref().and_then(parse_id)
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|c| !c.is_empty()).map(str::to_string)
}

/// GET /comments?postId&page&take -- top-level comments, oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = id_param(&query.post_id).ok_or_else(|| ApiError::validation("Required postId in query"))?;
    let page = id_param(&query.page).unwrap_or(1);
    let take = id_param(&query.take)
        .unwrap_or(state.comment_page_size)
        .clamp(1, MAX_TAKE);
    let offset = (page - 1).saturating_mul(take);

    let (item_count, rows) = state
        .run_db(move |db| Ok(db.page_top_level_comments(post_id, take, offset)?))
        .await?;

    Ok(Json(CommentPage {
        data: rows.into_iter().map(CommentView::from).collect(),
        meta: PageMeta::new(item_count, page, take),
    }))
}

/// POST /comments?postId&userId
pub async fn add_comment(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let (Some(post_id), Some(user_id), Some(content)) = (
        id_param(&query.post_id),
        id_param(&query.user_id),
        non_blank(req.content.as_deref()),
    ) else {
        return Err(ApiError::validation("Required postId, userId and non-empty content"));
    };
    let parent_comment = req
        .parent_id()
        .map_err(|_| ApiError::validation("parentComment must be a comment id"))?;

    let comment: CommentView = state
        .run_db(move |db| {
            db.get_user(user_id)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            db.get_post(post_id)?
                .ok_or_else(|| ApiError::not_found("Post not found"))?;
            let row = db
                .insert_comment(post_id, user_id, &content, parent_comment)
                .map_err(|e| {
                    // Parent existence is checked inside the insert transaction
                    if e.is::<ParentNotFound>() {
                        ApiError::not_found("Parent comment not found")
                    } else {
                        ApiError::Persistence(e)
                    }
                })?;
            Ok(row.into())
        })
        .await?;

    info!("comment {} created on post {} by user {}", comment.id, post_id, user_id);

    state
        .notify(
            RoomKey::post(post_id),
            GatewayEvent::CommentCreated {
                post_id,
                is_parent: comment.is_parent(),
                comment: comment.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /comments/{comment_id}?userId -- owner only.
pub async fn edit_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Query(query): Query<CommentQuery>,
    payload: Result<Json<EditCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let (Some(comment_id), Some(user_id), Some(content)) = (
        parse_id(&comment_id),
        id_param(&query.user_id),
        non_blank(req.content.as_deref()),
    ) else {
        return Err(ApiError::validation("Required userId, comment_id and non-empty content"));
    };

    let comment: CommentView = state
        .run_db(move |db| {
            let existing = db
                .get_comment(comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;
            if existing.user_id != user_id {
                return Err(ApiError::permission_denied());
            }
            db.update_comment_content(comment_id, &content)?
                .map(CommentView::from)
                .ok_or_else(|| ApiError::not_found("Comment not found"))
        })
        .await?;

    state
        .notify(
            RoomKey::post(comment.post_id),
            GatewayEvent::CommentUpdated {
                post_id: comment.post_id,
                is_parent: comment.is_parent(),
                comment: comment.clone(),
            },
        )
        .await;

    Ok(Json(comment))
}

/// DELETE /comments/{comment_id}?userId&postId -- the comment owner or the
/// author of the post the comment belongs to.
///
/// Post ownership is checked against the comment's own post; a `postId`
/// query value is accepted for compatibility but not trusted.
pub async fn remove_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Query(query): Query<CommentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(comment_id), Some(user_id)) = (parse_id(&comment_id), id_param(&query.user_id)) else {
        return Err(ApiError::validation("Required userId in query and comment_id in path"));
    };

    let (post_id, is_parent) = state
        .run_db(move |db| {
            let comment = db
                .get_comment(comment_id)?
                .ok_or_else(|| ApiError::not_found("Comment not found"))?;

            if comment.user_id != user_id {
                let post_author = db.get_post(comment.post_id)?.map(|post| post.user_id);
                if post_author != Some(user_id) {
                    return Err(ApiError::permission_denied());
                }
            }

            // Captured before the row goes away
            let is_parent = comment.parent_comment.is_none();
            if !db.delete_comment(comment_id)? {
                return Err(ApiError::not_found("Comment not found"));
            }
            Ok((comment.post_id, is_parent))
        })
        .await?;

    info!("comment {} deleted from post {} by user {}", comment_id, post_id, user_id);

    state
        .notify(
            RoomKey::post(post_id),
            GatewayEvent::CommentDeleted {
                post_id,
                comment_id,
                is_parent,
            },
        )
        .await;

    Ok(Json(MessageBody {
        message: "Deleted".into(),
    }))
}
