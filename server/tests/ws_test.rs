//! Integration tests for the chat WebSocket endpoints: fan-out, history
//! replay, presence snapshots, heartbeats, and malformed input.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use shopchat_server::chat::store::SqliteMessageStore;
use shopchat_server::config::ChatConfig;
use shopchat_server::state::ChatState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    start_test_server_with(ChatConfig::default()).await
}

async fn start_test_server_with(chat: ChatConfig) -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let store = SqliteMessageStore::open(&data_dir).expect("Failed to open message store");
    let state = ChatState::new(Arc::new(store), chat);

    let app = shopchat_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

async fn connect_customer(addr: SocketAddr, user_id: &str) -> WsStream {
    let url = format!("ws://{}/ws?userId={}", addr, user_id);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect customer socket");
    ws
}

async fn connect_admin(addr: SocketAddr, user_id: &str) -> WsStream {
    let url = format!("ws://{}/ws/admin?userId={}", addr, user_id);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect admin socket");
    // Every admin gets a presence snapshot right after binding
    wait_for(&mut ws, "active-users").await;
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON event on the socket, skipping control frames. `None` on timeout or close.
async fn next_event(ws: &mut WsStream, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("server sent invalid JSON"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Wait for an event with the given name, ignoring others. Returns its `data`.
async fn wait_for(ws: &mut WsStream, event: &str) -> Value {
    loop {
        let frame = next_event(ws, Duration::from_secs(3))
            .await
            .unwrap_or_else(|| panic!("timed out waiting for {}", event));
        if frame["event"] == event {
            return frame["data"].clone();
        }
    }
}

/// Customer ids currently listed by the presence endpoint.
async fn online_users(base_url: &str) -> Value {
    let presence: Value = reqwest::get(format!("{}/api/presence", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    presence["users"].clone()
}

/// Assert that no chat message arrives within a short window.
async fn assert_no_message(ws: &mut WsStream) {
    while let Some(frame) = next_event(ws, Duration::from_millis(300)).await {
        assert_ne!(frame["event"], "receive-message", "unexpected delivery: {}", frame);
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (base_url, _addr) = start_test_server().await;
    let body = reqwest::get(format!("{}/health", base_url))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_customer_message_fans_out_to_all_admins() {
    let (base_url, addr) = start_test_server().await;
    let mut a1 = connect_admin(addr, "alice").await;
    let mut a2 = connect_admin(addr, "bob").await;

    let mut customer = connect_customer(addr, "cust-1").await;
    // Both admins see the customer come online
    for admin in [&mut a1, &mut a2] {
        let users = wait_for(admin, "active-users").await;
        assert_eq!(users[0]["userId"], "cust-1");
        assert!(users[0]["socketId"].is_string());
    }

    send_json(
        &mut customer,
        json!({"event": "send-message", "data": {"text": "hello", "id": "local-1"}}),
    )
    .await;

    for admin in [&mut a1, &mut a2] {
        let msg = wait_for(admin, "receive-message").await;
        assert_eq!(msg["text"], "hello");
        assert_eq!(msg["from"], "user");
        assert_eq!(msg["senderId"], "cust-1");
        assert_eq!(msg["isRead"], false);
    }

    let ack = wait_for(&mut customer, "message-sent").await;
    assert_eq!(ack["clientId"], "local-1");
    assert_eq!(ack["message"]["text"], "hello");

    let history: Vec<Value> = reqwest::get(format!("{}/api/conversations/cust-1/admin", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["id"], ack["message"]["id"]);
}

#[tokio::test]
async fn test_admin_reply_replayed_after_reconnect() {
    let (_base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;

    // Customer is offline while the admin answers
    send_json(
        &mut admin,
        json!({
            "event": "admin-message-sent",
            "data": {"sender": "alice", "receiver": "cust-2", "text": "your order shipped", "id": "a-1"}
        }),
    )
    .await;
    let ack = wait_for(&mut admin, "message-sent").await;
    assert_eq!(ack["message"]["from"], "admin");
    assert_eq!(ack["message"]["senderId"], "admin");
    assert_eq!(ack["message"]["receiverId"], "cust-2");

    let mut customer = connect_customer(addr, "cust-2").await;
    send_json(
        &mut customer,
        json!({"event": "seleted-user-messages", "data": {"senderId": "admin"}}),
    )
    .await;

    let history = wait_for(&mut customer, "previous-messages").await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["text"], "your order shipped");
}

#[tokio::test]
async fn test_anonymous_connection_cannot_send() {
    let (base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;

    let (mut anon, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Anonymous upgrade should still succeed");

    send_json(&mut anon, json!({"event": "send-message", "data": {"text": "hi", "id": "x"}})).await;

    let err = wait_for(&mut anon, "error").await;
    assert_eq!(err["kind"], "unauthenticated");
    assert_eq!(err["clientId"], "x");

    assert_no_message(&mut admin).await;

    let presence: Value = reqwest::get(format!("{}/api/presence", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(presence["users"], json!([]));
}

#[tokio::test]
async fn test_concurrent_history_requests_agree() {
    let (base_url, addr) = start_test_server().await;
    let client = reqwest::Client::new();
    for i in 0..5 {
        let resp = client
            .post(format!("{}/api/messages", base_url))
            .json(&json!({"senderId": "cust-3", "receiverId": "admin", "text": format!("line {}", i)}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let mut a1 = connect_admin(addr, "alice").await;
    let mut a2 = connect_admin(addr, "bob").await;
    let request = json!({"event": "request-history", "data": {"senderId": "cust-3"}});
    send_json(&mut a1, request.clone()).await;
    send_json(&mut a2, request).await;

    let (h1, h2) = tokio::join!(
        wait_for(&mut a1, "previous-messages"),
        wait_for(&mut a2, "previous-messages")
    );
    assert_eq!(h1, h2);

    let texts: Vec<&str> = h1
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["line 0", "line 1", "line 2", "line 3", "line 4"]);
}

#[tokio::test]
async fn test_admin_reply_reaches_every_customer_tab() {
    let (_base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;
    let mut tab1 = connect_customer(addr, "cust-4").await;
    let mut tab2 = connect_customer(addr, "cust-4").await;

    // Make sure both tabs are registered before replying
    wait_for(&mut admin, "active-users").await;
    wait_for(&mut admin, "active-users").await;

    send_json(
        &mut admin,
        json!({"event": "admin-message-sent", "data": {"receiver": "cust-4", "text": "thanks"}}),
    )
    .await;

    for tab in [&mut tab1, &mut tab2] {
        let msg = wait_for(tab, "receive-message").await;
        assert_eq!(msg["text"], "thanks");
        assert_eq!(msg["from"], "admin");
    }
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let (_base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;
    let mut customer = connect_customer(addr, "cust-5").await;
    wait_for(&mut admin, "active-users").await;

    send_json(&mut customer, json!({"event": "send-message", "data": {"text": "   "}})).await;

    let err = wait_for(&mut customer, "error").await;
    assert_eq!(err["kind"], "validation");
    assert_no_message(&mut admin).await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (_base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;
    let mut customer = connect_customer(addr, "cust-6").await;
    wait_for(&mut admin, "active-users").await;

    customer.send(Message::Text("not json".into())).await.unwrap();
    let err = wait_for(&mut customer, "error").await;
    assert_eq!(err["kind"], "malformed");

    send_json(&mut customer, json!({"event": "no-such-event", "data": {}})).await;
    let err = wait_for(&mut customer, "error").await;
    assert_eq!(err["kind"], "malformed");

    customer.send(Message::Binary(vec![0u8, 1, 2].into())).await.unwrap();
    let err = wait_for(&mut customer, "error").await;
    assert_eq!(err["kind"], "malformed");

    send_json(&mut customer, json!({"event": "send-message", "data": {"text": "still here"}})).await;
    let msg = wait_for(&mut admin, "receive-message").await;
    assert_eq!(msg["text"], "still here");
}

#[tokio::test]
async fn test_disconnect_updates_admin_presence() {
    let (base_url, addr) = start_test_server().await;
    let mut admin = connect_admin(addr, "alice").await;

    let mut customer = connect_customer(addr, "cust-7").await;
    let users = wait_for(&mut admin, "active-users").await;
    assert_eq!(users.as_array().unwrap().len(), 1);

    customer.close(None).await.unwrap();

    let users = wait_for(&mut admin, "active-users").await;
    assert_eq!(users, json!([]));

    let presence: Value = reqwest::get(format!("{}/api/presence", base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(presence["admins"], json!(["alice"]));
    assert_eq!(presence["users"], json!([]));
    assert_eq!(presence["connections"], 1);
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (_base_url, addr) = start_test_server().await;
    let mut customer = connect_customer(addr, "cust-8").await;

    customer.send(Message::Ping(vec![9, 9].into())).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match customer.next().await {
                Some(Ok(Message::Pong(data))) => return data,
                Some(Ok(_)) => continue,
                other => panic!("connection ended before pong: {:?}", other),
            }
        }
    })
    .await
    .expect("Timed out waiting for pong");
    assert_eq!(&result[..], &[9u8, 9]);
}

#[tokio::test]
async fn test_server_sends_heartbeat_pings() {
    let chat = ChatConfig {
        ping_interval_secs: 1,
        ..ChatConfig::default()
    };
    let (_base_url, addr) = start_test_server_with(chat).await;
    let mut customer = connect_customer(addr, "cust-9").await;

    let got_ping = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match customer.next().await {
                Some(Ok(Message::Ping(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(got_ping, "Expected a server heartbeat ping");
}

#[tokio::test]
async fn test_silent_peer_released_after_pong_timeout() {
    let chat = ChatConfig {
        ping_interval_secs: 1,
        pong_timeout_secs: 1,
        ..ChatConfig::default()
    };
    let (base_url, addr) = start_test_server_with(chat).await;

    // Never polled, so the client never answers the server's pings
    let _ghost = connect_customer(addr, "ghost").await;

    let registered = tokio::time::timeout(Duration::from_secs(2), async {
        while online_users(&base_url).await != json!(["ghost"]) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(registered.is_ok(), "Customer never registered");

    let released = tokio::time::timeout(Duration::from_secs(8), async {
        loop {
            if online_users(&base_url).await == json!([]) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "Silent peer still registered after pong timeout");
}
