use axum::{
    Router,
    routing::{get, put},
};

use crate::state::AppState;
use crate::{comments, likes, messages};

/// REST surface for comments, likes and messages. Mounted by the server
/// under `/api/v1`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/comments", get(comments::list_comments).post(comments::add_comment))
        .route(
            "/comments/{comment_id}",
            put(comments::edit_comment).delete(comments::remove_comment),
        )
        .route(
            "/likes",
            get(likes::get_likes).post(likes::add_like).delete(likes::remove_like),
        )
        .route(
            "/messages",
            get(messages::get_conversation).post(messages::send_message),
        )
        .with_state(state)
}
