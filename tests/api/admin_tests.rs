//! Administrative Endpoint Tests

use std::sync::Arc;

use axum::http::StatusCode;
use futures::channel::mpsc as inbound_channel;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use waiting_room::presentation::websocket::{
    ClientAction, CloseReason, ConnectionSession, Inbound, Outbound,
};

use crate::common::{json_body, wait_until, TestApp};

#[tokio::test]
async fn test_finish_queue_with_no_sessions() {
    let app = TestApp::new().await;

    for response in [app.get("/finish-queue").await, app.post("/finish-queue").await] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "finished": 0 }));
    }
}

#[tokio::test]
async fn test_finish_queue_closes_every_session() {
    let app = TestApp::new().await;

    let mut sessions = Vec::new();
    for _ in 0..5 {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = inbound_channel::unbounded();
        let session = ConnectionSession::new(app.state.session_context(), out_tx);
        in_tx
            .unbounded_send(Inbound::Action(ClientAction::NewClient))
            .unwrap();
        sessions.push((tokio::spawn(session.run(in_rx)), in_tx, out_rx));
    }

    let registry = Arc::clone(&app.state.registry);
    wait_until(|| {
        let registry = Arc::clone(&registry);
        async move { registry.len() == 5 }
    })
    .await;

    let response = app.post("/finish-queue").await;
    assert_eq!(json_body(response).await["finished"], 5);

    for (task, _in_tx, mut out_rx) in sessions {
        assert_eq!(task.await.unwrap(), CloseReason::ClosedByAdmin);
        let mut closed = false;
        while let Ok(frame) = out_rx.try_recv() {
            closed |= frame == Outbound::Close;
        }
        assert!(closed);
    }
    assert!(app.state.registry.is_empty());
    // Records stay queued for the workers
    assert_eq!(app.store.len(), 5);
}
