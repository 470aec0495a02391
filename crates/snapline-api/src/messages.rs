use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use snapline_types::api::{ConversationResponse, SendMessageRequest};
use snapline_types::coerce::parse_id;
use snapline_types::models::DirectMessage;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub user_id: Option<String>,
    pub peer_id: Option<String>,
}

impl MessageQuery {
    fn pair(&self) -> Result<(i64, i64), ApiError> {
        match (
            self.user_id.as_deref().and_then(parse_id),
            self.peer_id.as_deref().and_then(parse_id),
        ) {
            (Some(user_id), Some(peer_id)) => Ok((user_id, peer_id)),
            _ => Err(ApiError::validation("Required userId and peerId in query string")),
        }
    }
}

/// GET /messages?userId&peerId -- both directions, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, peer_id) = query.pair()?;

    let rows = state
        .run_db(move |db| Ok(db.get_conversation(user_id, peer_id)?))
        .await?;

    Ok(Json(ConversationResponse {
        data: rows.into_iter().map(DirectMessage::from).collect(),
    }))
}

/// POST /messages?userId&peerId -- REST twin of the `send_message` socket
/// event. Same fan-out, but failures are reported to the caller.
pub async fn send_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (user_id, peer_id) = query.pair()?;
    let content = req
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation("Required non-empty content"))?;

    let message: DirectMessage = state
        .run_db(move |db| {
            db.get_user(user_id)?
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            db.get_user(peer_id)?
                .ok_or_else(|| ApiError::not_found("Peer not found"))?;
            Ok(db.insert_message(user_id, peer_id, &content)?.into())
        })
        .await?;

    info!("message {} from user {} to user {}", message.id, user_id, peer_id);
    state.notify_message(message.clone()).await;

    Ok((StatusCode::CREATED, Json(message)))
}
