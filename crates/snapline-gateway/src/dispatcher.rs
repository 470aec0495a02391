use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use snapline_types::events::GatewayEvent;
use snapline_types::models::DirectMessage;

use crate::ConnId;
use crate::presence::PresenceRegistry;
use crate::rooms::{RoomKey, RoomRouter};

/// Owns every piece of realtime state in the process: connection outboxes,
/// presence and room membership. Construct one per process and clone the
/// handle into whatever needs to emit.
///
/// Emits are best-effort: they report how many connections were handed the
/// event and never fail. A connection whose outbox is closed is skipped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Per-connection outbox: conn_id -> sender drained by the socket task
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<GatewayEvent>>>,

    presence: RwLock<PresenceRegistry>,

    rooms: RwLock<RoomRouter>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
                presence: RwLock::new(PresenceRegistry::new()),
                rooms: RwLock::new(RoomRouter::new()),
            }),
        }
    }

    /// Register a new connection. Users get a presence entry and are joined
    /// to their own `user:<id>` room. Returns (conn_id, outbox receiver).
    pub async fn connect(&self, user_id: Option<i64>) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);

        if let Some(user_id) = user_id {
            if let Some(displaced) = self.inner.presence.write().await.on_connect(Some(user_id), conn_id) {
                debug!("user {} rebound from {} to {}", user_id, displaced, conn_id);
            }
            self.inner.rooms.write().await.join(conn_id, RoomKey::user(user_id));
        }

        (conn_id, rx)
    }

    /// Tear down a connection: outbox, presence entry and room memberships.
    pub async fn disconnect(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);
        self.inner.presence.write().await.on_disconnect(conn_id);
        let left = self.inner.rooms.write().await.leave_all(conn_id);
        trace!("{} left {} rooms on disconnect", conn_id, left.len());
    }

    /// Join a room. Unknown connections are ignored.
    ///
    /// The connections read guard is held across the insert, so a concurrent
    /// `disconnect` either runs first (and the join is refused) or runs its
    /// `leave_all` after the insert.
    pub async fn join(&self, conn_id: ConnId, room: RoomKey) -> bool {
        let connections = self.inner.connections.read().await;
        if !connections.contains_key(&conn_id) {
            return false;
        }
        let joined = self.inner.rooms.write().await.join(conn_id, room);
        drop(connections);
        joined
    }

    pub async fn leave(&self, conn_id: ConnId, room: &RoomKey) -> bool {
        self.inner.rooms.write().await.leave(conn_id, room)
    }

    /// Deliver to every connection in `room` right now. Returns the number
    /// of connections the event was handed to.
    pub async fn emit_to_room(&self, room: &RoomKey, event: GatewayEvent) -> usize {
        let members = self.inner.rooms.read().await.members(room);
        let delivered = self.deliver(members, &event).await;
        debug!("emit {} -> {} ({} delivered)", event.name(), room, delivered);
        delivered
    }

    /// Deliver once per connection across the union of `rooms`.
    pub async fn emit_to_rooms(&self, rooms: &[RoomKey], event: GatewayEvent) -> usize {
        let members = self.inner.rooms.read().await.members_of_any(rooms);
        let delivered = self.deliver(members, &event).await;
        debug!("emit {} -> {:?} ({} delivered)", event.name(), rooms, delivered);
        delivered
    }

    /// Send an event to a single connection.
    pub async fn send_to_connection(&self, conn_id: ConnId, event: GatewayEvent) -> bool {
        self.deliver([conn_id], &event).await == 1
    }

    /// Fan a persisted direct message out to both participants.
    pub async fn deliver_message(&self, message: DirectMessage) -> usize {
        let rooms = [RoomKey::user(message.source_id), RoomKey::user(message.target_id)];
        self.emit_to_rooms(&rooms, GatewayEvent::NewMessage(message)).await
    }

    pub async fn connection_for(&self, user_id: i64) -> Option<ConnId> {
        self.inner.presence.read().await.connection_for(user_id)
    }

    pub async fn online_users(&self) -> Vec<i64> {
        self.inner.presence.read().await.online_users()
    }

    pub async fn room_members(&self, room: &RoomKey) -> Vec<ConnId> {
        self.inner.rooms.read().await.members(room)
    }

    pub async fn rooms_of(&self, conn_id: ConnId) -> Vec<RoomKey> {
        self.inner.rooms.read().await.rooms_of(conn_id)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.read().await.room_count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    async fn deliver(&self, targets: impl IntoIterator<Item = ConnId>, event: &GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in targets {
            match connections.get(&conn_id) {
                Some(tx) if tx.send(event.clone()).is_ok() => delivered += 1,
                _ => trace!("{} gone, skipping {}", conn_id, event.name()),
            }
        }
        delivered
    }
}
