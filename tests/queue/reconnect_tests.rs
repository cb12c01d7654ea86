//! Reconnect Scenarios

use chrono::{Duration as ChronoDuration, Utc};
use futures::channel::mpsc as inbound_channel;
use futures::{stream, StreamExt};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use waiting_room::domain::entities::{QueueStore, WaitingRecord};
use waiting_room::presentation::websocket::{
    ClientAction, CloseReason, ConnectionSession, Inbound, Outbound,
};

use crate::common::{wait_until, TestApp};

/// Queue a client through a session that then drops its transport
async fn queue_and_disconnect(app: &TestApp) -> String {
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let client_id = session.client_id().to_string();

    let reason = session
        .run(stream::iter(vec![Inbound::Action(ClientAction::NewClient)]))
        .await;
    assert_eq!(reason, CloseReason::Disconnected);
    client_id
}

#[tokio::test]
async fn test_reconnect_keeps_place_in_line() {
    let app = TestApp::new().await;

    let x = queue_and_disconnect(&app).await;
    let later = queue_and_disconnect(&app).await;
    let birthday = app.store.find(&x).await.unwrap().unwrap().birthday;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = inbound_channel::unbounded();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    assert_ne!(session.client_id(), x);
    let task = tokio::spawn(session.run(in_rx));

    in_tx
        .unbounded_send(Inbound::Action(ClientAction::Reconnect { client_id: x.clone() }))
        .unwrap();

    let registry = app.state.registry.clone();
    let resumed = x.clone();
    wait_until(move || {
        let found = registry.lookup(&resumed).is_some();
        async move { found }
    })
    .await;

    // No duplicate record, order and birthday unchanged
    let queue = app.store.list().await.unwrap();
    let ids: Vec<_> = queue.iter().map(|r| r.client_id.as_str()).collect();
    assert_eq!(ids, vec![x.as_str(), later.as_str()]);
    assert_eq!(queue[0].birthday, birthday);

    // The resumed session receives status under the adopted id
    assert_eq!(app.state.registry.broadcast_status(&queue), 1);
    let Some(Outbound::Status(status)) = out_rx.recv().await else {
        panic!("expected status");
    };
    assert_eq!(status.client_id, x);
    assert_eq!(status.position, 1);
    assert_eq!(status.time_left, 30);

    drop(in_tx);
    assert_eq!(task.await.unwrap(), CloseReason::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_max_alive_is_refused() {
    let app = TestApp::new().await;
    let stale = WaitingRecord::arriving("stale", Utc::now() - ChronoDuration::minutes(2));
    app.store.enqueue(&stale).await.unwrap();

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let reason = session
        .run(stream::iter(vec![Inbound::Action(ClientAction::Reconnect {
            client_id: "stale".into(),
        })]))
        .await;

    assert_eq!(reason, CloseReason::Expired);
    assert_eq!(app.store.list().await.unwrap(), vec![stale]);
    assert!(app.state.registry.is_empty());
}

#[tokio::test]
async fn test_newclient_after_reconnect_is_ignored() {
    let app = TestApp::new().await;
    let x = queue_and_disconnect(&app).await;

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let reason = session
        .run(stream::iter(vec![
            Inbound::Action(ClientAction::Reconnect { client_id: x.clone() }),
            Inbound::Action(ClientAction::NewClient),
            Inbound::Action(ClientAction::Alive),
        ]))
        .await;

    assert_eq!(reason, CloseReason::Disconnected);
    let ids: Vec<_> = app
        .store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.client_id)
        .collect();
    assert_eq!(ids, vec![x]);
}

#[tokio::test]
async fn test_malformed_frame_keeps_record_for_resume() {
    let app = TestApp::new().await;

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let client_id = session.client_id().to_string();
    let reason = session
        .run(
            stream::iter(vec![
                Inbound::Action(ClientAction::NewClient),
                Inbound::from_text("{\"act"),
            ])
            .boxed(),
        )
        .await;

    assert_eq!(reason, CloseReason::ProtocolViolation);
    assert!(app.store.find(&client_id).await.unwrap().is_some());
}
