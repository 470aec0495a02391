use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};

use snapline_gateway::RoomKey;
use snapline_types::api::{LikeListResponse, LikesCountResponse};
use snapline_types::coerce::parse_id;
use snapline_types::events::{GatewayEvent, LikeAction};
use snapline_types::models::Like;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeQuery {
    pub post_id: Option<String>,
    pub user_id: Option<String>,
}

impl LikeQuery {
    fn post_id(&self) -> Option<i64> {
        self.post_id.as_deref().and_then(parse_id)
    }

    fn pair(&self) -> Result<(i64, i64), ApiError> {
        match (self.user_id.as_deref().and_then(parse_id), self.post_id()) {
            (Some(user_id), Some(post_id)) => Ok((user_id, post_id)),
            _ => Err(ApiError::validation("postId and userId is required")),
        }
    }
}

/// GET /likes?postId
pub async fn get_likes(
    State(state): State<AppState>,
    Query(query): Query<LikeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = query.post_id().ok_or_else(|| ApiError::validation("postId is required"))?;

    let rows = state.run_db(move |db| Ok(db.get_likes(post_id)?)).await?;
    let data: Vec<Like> = rows.into_iter().map(Like::from).collect();

    Ok(Json(LikeListResponse {
        likes: data.len() as i64,
        data,
    }))
}

/// POST /likes?userId&postId
///
/// A second like from the same user is absorbed by the (user, post) key:
/// the current count is returned and nothing is broadcast.
pub async fn add_like(
    State(state): State<AppState>,
    Query(query): Query<LikeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, post_id) = query.pair()?;

    let (inserted, likes_count) = state
        .run_db(move |db| {
            db.get_user(user_id)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            db.get_post(post_id)?
                .ok_or_else(|| ApiError::not_found("Post not found"))?;
            Ok(db.add_like(user_id, post_id)?)
        })
        .await?;

    if inserted {
        info!("user {} liked post {} ({} likes)", user_id, post_id, likes_count);
        state
            .notify(
                RoomKey::post(post_id),
                GatewayEvent::LikeUpdated {
                    post_id,
                    likes_count,
                    actor_id: user_id,
                    action: LikeAction::Like,
                },
            )
            .await;
    } else {
        debug!("user {} already likes post {}", user_id, post_id);
    }

    Ok(Json(LikesCountResponse { likes_count }))
}

/// DELETE /likes?userId&postId
pub async fn remove_like(
    State(state): State<AppState>,
    Query(query): Query<LikeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, post_id) = query.pair()?;

    let (removed, likes_count) = state
        .run_db(move |db| Ok(db.remove_like(user_id, post_id)?))
        .await?;

    if !removed {
        return Err(ApiError::not_found("Like not found"));
    }

    info!("user {} unliked post {} ({} likes)", user_id, post_id, likes_count);
    state
        .notify(
            RoomKey::post(post_id),
            GatewayEvent::LikeUpdated {
                post_id,
                likes_count,
                actor_id: user_id,
                action: LikeAction::Unlike,
            },
        )
        .await;

    Ok(Json(LikesCountResponse { likes_count }))
}
