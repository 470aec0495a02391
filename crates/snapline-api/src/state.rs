use std::sync::Arc;

use tracing::{debug, error};

use snapline_db::Database;
use snapline_gateway::{Dispatcher, RoomKey};
use snapline_types::events::GatewayEvent;
use snapline_types::models::DirectMessage;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    /// Realtime handle. When absent, mutations still succeed and only the
    /// notification is skipped.
    pub dispatcher: Option<Dispatcher>,
    /// `take` used by comment listing when the client sends none
    pub comment_page_size: i64,
}

impl AppStateInner {
    /// Run blocking DB work off the async runtime.
    pub async fn run_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Persistence(e.into())
            })?
    }

    /// Best-effort fan-out to one room. Runs after the mutation committed and
    /// never fails the request.
    pub async fn notify(&self, room: RoomKey, event: GatewayEvent) {
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.emit_to_room(&room, event).await;
            }
            None => debug!("no gateway attached, skipping {} -> {}", event.name(), room),
        }
    }

    /// Best-effort fan-out of a direct message to both participants.
    pub async fn notify_message(&self, message: DirectMessage) {
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.deliver_message(message).await;
            }
            None => debug!("no gateway attached, skipping new_message {}", message.id),
        }
    }
}
