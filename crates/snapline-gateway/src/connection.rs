use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use snapline_db::Database;
use snapline_types::events::{Command, GatewayCommand, GatewayEvent};
use snapline_types::models::DirectMessage;

use crate::ConnId;
use crate::dispatcher::Dispatcher;
use crate::rooms::RoomKey;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Connecting -> Connected -> Disconnected. Disconnected is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Lifecycle of one transport session against the dispatcher.
pub struct Session {
    dispatcher: Dispatcher,
    user_id: Option<i64>,
    conn_id: Option<ConnId>,
    state: ConnectionState,
}

impl Session {
    pub fn new(dispatcher: Dispatcher, user_id: Option<i64>) -> Self {
        Self {
            dispatcher,
            user_id,
            conn_id: None,
            state: ConnectionState::Connecting,
        }
    }

    /// Enter Connected: register with the dispatcher (presence + own user
    /// room). Only valid from Connecting.
    pub async fn connect(&mut self) -> Option<(ConnId, mpsc::UnboundedReceiver<GatewayEvent>)> {
        if self.state != ConnectionState::Connecting {
            return None;
        }
        let (conn_id, outbox) = self.dispatcher.connect(self.user_id).await;
        self.conn_id = Some(conn_id);
        self.state = ConnectionState::Connected;
        Some((conn_id, outbox))
    }

    /// Enter Disconnected and release everything the session held.
    pub async fn disconnect(&mut self) {
        if let Some(conn_id) = self.conn_id.take() {
            self.dispatcher.disconnect(conn_id).await;
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }
}

/// Drive one WebSocket connection until either side goes away.
/// `user_id` comes from the handshake query and may be absent.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Option<i64>,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut session = Session::new(dispatcher.clone(), user_id);
    let Some((conn_id, mut outbox)) = session.connect().await else {
        return;
    };

    match user_id {
        Some(uid) => info!("user {} connected to gateway ({})", uid, conn_id),
        None => info!("anonymous connection to gateway ({})", conn_id),
    }

    dispatcher
        .send_to_connection(conn_id, GatewayEvent::Ready { connection_id: conn_id, user_id })
        .await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward outbox -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbox.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to encode {}: {}", event.name(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping {}", missed_heartbeats, conn_id);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let Some(cmd) = decode_command(conn_id, text.as_str()) else {
                        continue;
                    };
                    match cmd {
                        // Persistence must outlive the socket, so this runs detached
                        cmd @ Command::SendMessage { .. } => {
                            let dispatcher = dispatcher_recv.clone();
                            let db = db.clone();
                            tokio::spawn(async move {
                                handle_command(&dispatcher, &db, conn_id, cmd).await;
                            });
                        }
                        cmd => handle_command(&dispatcher_recv, &db, conn_id, cmd).await,
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish, then make sure the other has fully
    // stopped before memberships are torn down
    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    let straggler = if send_finished { recv_task } else { send_task };
    straggler.abort();
    let _ = straggler.await;

    session.disconnect().await;
    info!("{} disconnected from gateway (user {:?})", conn_id, session.user_id());
}

/// Decode and validate one text frame. Anything malformed is logged and
/// dropped; the client is never told.
pub fn decode_command(conn_id: ConnId, text: &str) -> Option<Command> {
    let cmd = match serde_json::from_str::<GatewayCommand>(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("{} bad command: {} -- raw: {}", conn_id, e, truncate(text, 200));
            return None;
        }
    };
    match cmd.validate() {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            warn!("{} dropped command: {}", conn_id, e);
            None
        }
    }
}

/// Execute a validated command. Best-effort: failures are logged, never
/// reported back to the sender.
pub async fn handle_command(dispatcher: &Dispatcher, db: &Arc<Database>, conn_id: ConnId, cmd: Command) {
    match cmd {
        Command::SendMessage {
            sender_id,
            receiver_id,
            content,
        } => {
            let db = db.clone();
            let result = tokio::task::spawn_blocking(move || db.insert_message(sender_id, receiver_id, &content)).await;
            let row = match result {
                Ok(Ok(row)) => row,
                Ok(Err(e)) => {
                    warn!("send_message {} -> {} dropped: {}", sender_id, receiver_id, e);
                    return;
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return;
                }
            };
            dispatcher.deliver_message(DirectMessage::from(row)).await;
        }

        Command::MarkSeen { user_id, peer_id } => {
            dispatcher
                .emit_to_room(&RoomKey::user(peer_id), GatewayEvent::ConversationSeen { user_id, peer_id })
                .await;
        }

        Command::JoinPost { post_id } => {
            let room = RoomKey::post(post_id);
            debug!("{} join_post => {}", conn_id, room);
            dispatcher.join(conn_id, room).await;
        }

        Command::LeavePost { post_id } => {
            let room = RoomKey::post(post_id);
            debug!("{} leave_post => {}", conn_id, room);
            dispatcher.leave(conn_id, &room).await;
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(n: usize) -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        for i in 1..=n {
            db.create_user(&format!("user{i}"), None, None).unwrap();
        }
        Arc::new(db)
    }

    #[tokio::test]
    async fn session_walks_the_state_machine() {
        let dispatcher = Dispatcher::new();
        let mut session = Session::new(dispatcher.clone(), Some(4));
        assert_eq!(session.state(), ConnectionState::Connecting);

        let (conn_id, _outbox) = session.connect().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(dispatcher.connection_for(4).await, Some(conn_id));
        assert!(session.connect().await.is_none());

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(dispatcher.connection_for(4).await, None);
        assert!(session.connect().await.is_none());
    }

    #[tokio::test]
    async fn send_message_reaches_both_participants_only() {
        let dispatcher = Dispatcher::new();
        let db = db_with_users(3);
        let (a, mut rx_a) = dispatcher.connect(Some(1)).await;
        let (_b, mut rx_b) = dispatcher.connect(Some(2)).await;
        let (_c, mut rx_c) = dispatcher.connect(Some(3)).await;

        let cmd = decode_command(a, r#"{"event":"send_message","data":{"senderId":1,"receiverId":2,"content":"hi"}}"#)
            .unwrap();
        handle_command(&dispatcher, &db, a, cmd).await;

        let GatewayEvent::NewMessage(to_a) = rx_a.try_recv().unwrap() else {
            panic!("expected new_message");
        };
        let GatewayEvent::NewMessage(to_b) = rx_b.try_recv().unwrap() else {
            panic!("expected new_message");
        };
        assert_eq!(to_a, to_b);
        assert_eq!((to_a.source_id, to_a.target_id, to_a.message.as_str()), (1, 2, "hi"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());

        let stored = db.get_conversation(1, 2).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, to_a.id);
    }

    #[tokio::test]
    async fn failed_send_message_is_silent() {
        let dispatcher = Dispatcher::new();
        let db = db_with_users(1);
        let (a, mut rx_a) = dispatcher.connect(Some(1)).await;

        // receiver 99 does not exist, insert fails
        handle_command(
            &dispatcher,
            &db,
            a,
            Command::SendMessage {
                sender_id: 1,
                receiver_id: 99,
                content: "hello?".into(),
            },
        )
        .await;

        assert!(rx_a.try_recv().is_err());
        assert!(db.get_conversation(1, 99).unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_seen_only_reaches_peer() {
        let dispatcher = Dispatcher::new();
        let db = db_with_users(2);
        let (a, mut rx_a) = dispatcher.connect(Some(1)).await;
        let (_b, mut rx_b) = dispatcher.connect(Some(2)).await;

        handle_command(&dispatcher, &db, a, Command::MarkSeen { user_id: 1, peer_id: 2 }).await;

        assert_eq!(
            rx_b.try_recv().unwrap(),
            GatewayEvent::ConversationSeen { user_id: 1, peer_id: 2 }
        );
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_and_leave_post_rooms() {
        let dispatcher = Dispatcher::new();
        let db = db_with_users(0);
        let (conn, _rx) = dispatcher.connect(None).await;

        let join = decode_command(conn, r#"{"event":"join_post","data":{"postId":"42"}}"#).unwrap();
        handle_command(&dispatcher, &db, conn, join).await;
        assert_eq!(dispatcher.rooms_of(conn).await, vec![RoomKey::post(42)]);

        let leave = decode_command(conn, r#"{"event":"leave_post","data":{"postId":42}}"#).unwrap();
        handle_command(&dispatcher, &db, conn, leave).await;
        assert!(dispatcher.rooms_of(conn).await.is_empty());
    }

    #[test]
    fn malformed_frames_decode_to_nothing() {
        let conn = ConnId::new_v4();
        assert!(decode_command(conn, "not json").is_none());
        assert!(decode_command(conn, r#"{"event":"join_post","data":{"postId":0}}"#).is_none());
        assert!(decode_command(conn, r#"{"event":"mark_seen","data":{"userId":1}}"#).is_none());
        assert!(decode_command(conn, r#"{"event":"subscribe","data":{}}"#).is_none());
    }

    #[tokio::test]
    async fn rooms_start_empty_regardless_of_storage() {
        let db = db_with_users(2);
        let author = 1;
        let post = db.create_post(author, None).unwrap();
        db.insert_comment(post, author, "persisted", None).unwrap();
        db.add_like(2, post).unwrap();

        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.room_count().await, 0);
        assert!(dispatcher.room_members(&RoomKey::post(post)).await.is_empty());
    }
}
