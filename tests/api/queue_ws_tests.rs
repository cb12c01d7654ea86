//! Queue WebSocket Tests
//!
//! Real upgrades against a bound server backed by the in-process store.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use waiting_room::config::Settings;
use waiting_room::domain::entities::StatusUpdate;
use waiting_room::infrastructure::queue::MemoryQueueStore;
use waiting_room::startup::Application;

use crate::common::{test_settings, wait_until};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the full application on an ephemeral port
async fn spawn_app(settings: Settings) -> (String, Arc<MemoryQueueStore>) {
    let store = Arc::new(MemoryQueueStore::new());
    let app = Application::build_with_store(settings, store.clone())
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();
    tokio::spawn(app.run_until_stopped());
    // Let the workers subscribe to arrivals
    tokio::task::yield_now().await;

    (format!("ws://{}", addr), store)
}

/// No workers, status pushed every second
fn waiting_only() -> Settings {
    let mut settings = test_settings();
    settings.queue.max_workers = 0;
    settings.queue.status_interval_secs = 1;
    settings
}

async fn connect(base: &str, path: &str) -> Client {
    let (ws, _) = connect_async(format!("{}{}", base, path)).await.unwrap();
    ws
}

async fn send_action(ws: &mut Client, frame: serde_json::Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn next_status(ws: &mut Client) -> StatusUpdate {
    loop {
        let frame = timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("no frame in time")
            .expect("socket ended before a status frame")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(_) => panic!("socket closed before a status frame"),
            _ => {}
        }
    }
}

async fn expect_closed(ws: &mut Client) {
    loop {
        match timeout(FRAME_TIMEOUT, ws.next()).await.expect("socket not closed in time") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => {}
        }
    }
}

#[tokio::test]
async fn test_newclient_is_offered_token_then_closed() {
    let (base, store) = spawn_app(test_settings()).await;
    let mut ws = connect(&base, "/on-queue").await;

    send_action(&mut ws, json!({ "action": "newclient" })).await;

    let status = next_status(&mut ws).await;
    assert!(status.is_ready_to_buy);
    assert!(!status.client_id.is_empty());
    assert!(!status.token_to_buy.is_empty());
    expect_closed(&mut ws).await;

    let store_ref = store.clone();
    wait_until(move || {
        let store = store_ref.clone();
        async move { store.is_empty() }
    })
    .await;
}

#[tokio::test]
async fn test_waiting_client_gets_status_and_leaves() {
    let (base, store) = spawn_app(waiting_only()).await;
    let mut ws = connect(&base, "/on-queue").await;

    send_action(&mut ws, json!({ "action": "newclient" })).await;
    let status = next_status(&mut ws).await;
    assert!(!status.is_ready_to_buy);
    assert_eq!(status.position, 1);
    assert_eq!(status.time_left, 30);

    send_action(&mut ws, json!({ "action": "alive" })).await;
    send_action(&mut ws, json!({ "action": "finished" })).await;
    expect_closed(&mut ws).await;

    // Workers own removal; the record stays until one retires it
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_reconnect_resumes_over_new_socket() {
    let (base, store) = spawn_app(waiting_only()).await;

    let mut first = connect(&base, "/on-queue").await;
    send_action(&mut first, json!({ "action": "newclient" })).await;
    let client_id = next_status(&mut first).await.client_id;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = connect(&base, "/reconnect").await;
    send_action(
        &mut second,
        json!({ "action": "reconnect", "client_id": client_id }),
    )
    .await;

    let status = next_status(&mut second).await;
    assert_eq!(status.client_id, client_id);
    assert_eq!(status.position, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_malformed_frame_closes_socket() {
    let (base, _store) = spawn_app(waiting_only()).await;
    let mut ws = connect(&base, "/on-queue").await;

    ws.send(Message::Text("not json".into())).await.unwrap();

    expect_closed(&mut ws).await;
}
