//! End-to-end tests: a real server on an ephemeral port, driven through
//! tokio-tungstenite clients and plain HTTP/1.1 requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use snapline_db::Database;
use snapline_gateway::{Dispatcher, RoomKey};
use snapline_server::build_app;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

async fn spawn_server() -> Server {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new();
    let app = build_app(db.clone(), dispatcher.clone(), 6);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server { addr, db, dispatcher }
}

async fn connect(addr: SocketAddr, user_id: Option<i64>) -> (Client, Value) {
    let url = match user_id {
        Some(id) => format!("ws://{addr}/api/v1/message?userId={id}"),
        None => format!("ws://{addr}/api/v1/message"),
    };
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    let ready = next_event(&mut ws).await;
    assert_eq!(ready["event"], "ready");
    (ws, ready)
}

/// Next text frame as JSON, skipping control frames.
async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let waited = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = waited {
        panic!("unexpected frame: {text}");
    }
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Room joins are applied asynchronously; wait until the gateway has them.
async fn wait_for_members(dispatcher: &Dispatcher, room: &RoomKey, count: usize) {
    for _ in 0..100 {
        if dispatcher.room_members(room).await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {room} never reached {count} members");
}

async fn http(addr: SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default().to_string();
    (status, body)
}

#[tokio::test]
async fn health_endpoint() {
    let server = spawn_server().await;
    let (status, body) = http(server.addr, "GET", "/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn ready_carries_identity() {
    let server = spawn_server().await;

    let (_named, ready) = connect(server.addr, Some(7)).await;
    assert_eq!(ready["data"]["userId"], 7);
    assert!(ready["data"]["connectionId"].is_string());

    let (_anon, ready) = connect(server.addr, None).await;
    assert_eq!(ready["data"]["userId"], Value::Null);
}

#[tokio::test]
async fn send_message_reaches_both_parties() {
    let server = spawn_server().await;
    let alice = server.db.create_user("alice", None, None).unwrap();
    let bob = server.db.create_user("bob", None, None).unwrap();

    let (mut ws_alice, _) = connect(server.addr, Some(alice)).await;
    let (mut ws_bob, _) = connect(server.addr, Some(bob)).await;

    send(
        &mut ws_alice,
        json!({
            "event": "send_message",
            "data": { "senderId": alice, "receiverId": bob.to_string(), "content": " hi bob " }
        }),
    )
    .await;

    for ws in [&mut ws_alice, &mut ws_bob] {
        let event = next_event(ws).await;
        assert_eq!(event["event"], "new_message");
        assert_eq!(event["data"]["sourceId"], alice);
        assert_eq!(event["data"]["targetId"], bob);
        assert_eq!(event["data"]["message"], "hi bob");
    }

    assert_eq!(server.db.get_conversation(alice, bob).unwrap().len(), 1);
}

#[tokio::test]
async fn mark_seen_only_reaches_peer() {
    let server = spawn_server().await;
    let (mut ws_one, _) = connect(server.addr, Some(1)).await;
    let (mut ws_two, _) = connect(server.addr, Some(2)).await;

    send(&mut ws_one, json!({ "event": "mark_seen", "data": { "userId": 1, "peerId": 2 } })).await;

    let event = next_event(&mut ws_two).await;
    assert_eq!(event, json!({ "event": "conversation_seen", "data": { "userId": 1, "peerId": 2 } }));
    assert_silent(&mut ws_one).await;
}

#[tokio::test]
async fn post_room_receives_rest_like_updates() {
    let server = spawn_server().await;
    let author = server.db.create_user("author", None, None).unwrap();
    let fan = server.db.create_user("fan", None, None).unwrap();
    let post = server.db.create_post(author, None).unwrap();

    let (mut viewer_a, _) = connect(server.addr, None).await;
    let (mut viewer_b, _) = connect(server.addr, None).await;
    let (mut elsewhere, _) = connect(server.addr, None).await;

    send(&mut viewer_a, json!({ "event": "join_post", "data": { "postId": post } })).await;
    send(&mut viewer_b, json!({ "event": "join_post", "data": { "postId": post.to_string() } })).await;
    wait_for_members(&server.dispatcher, &RoomKey::post(post), 2).await;

    let (status, body) = http(server.addr, "POST", &format!("/api/v1/likes?userId={fan}&postId={post}")).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["likesCount"], 1);

    for ws in [&mut viewer_a, &mut viewer_b] {
        let event = next_event(ws).await;
        assert_eq!(event["event"], "like:updated");
        assert_eq!(event["data"]["likesCount"], 1);
        assert_eq!(event["data"]["actorId"], fan);
        assert_eq!(event["data"]["action"], "like");
    }
    assert_silent(&mut elsewhere).await;

    send(&mut viewer_b, json!({ "event": "leave_post", "data": { "postId": post } })).await;
    wait_for_members(&server.dispatcher, &RoomKey::post(post), 1).await;

    http(server.addr, "DELETE", &format!("/api/v1/likes?userId={fan}&postId={post}")).await;
    let event = next_event(&mut viewer_a).await;
    assert_eq!(event["data"]["action"], "unlike");
    assert_eq!(event["data"]["likesCount"], 0);
    assert_silent(&mut viewer_b).await;
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = spawn_server().await;
    let (mut ws, _) = connect(server.addr, Some(3)).await;

    ws.send(Message::text("not json")).await.unwrap();
    send(&mut ws, json!({ "event": "join_post", "data": { "postId": "abc" } })).await;
    send(&mut ws, json!({ "event": "self_destruct", "data": {} })).await;
    assert_silent(&mut ws).await;

    // Connection is still usable afterwards
    send(&mut ws, json!({ "event": "join_post", "data": { "postId": 5 } })).await;
    wait_for_members(&server.dispatcher, &RoomKey::post(5), 1).await;
}

#[tokio::test]
async fn disconnect_releases_rooms_and_presence() {
    let server = spawn_server().await;
    let (mut ws, _) = connect(server.addr, Some(9)).await;
    send(&mut ws, json!({ "event": "join_post", "data": { "postId": 1 } })).await;
    wait_for_members(&server.dispatcher, &RoomKey::post(1), 1).await;
    assert!(server.dispatcher.connection_for(9).await.is_some());

    ws.close(None).await.unwrap();
    drop(ws);

    wait_for_members(&server.dispatcher, &RoomKey::post(1), 0).await;
    wait_for_members(&server.dispatcher, &RoomKey::user(9), 0).await;
    assert!(server.dispatcher.connection_for(9).await.is_none());
    assert_eq!(server.dispatcher.connection_count().await, 0);
}
