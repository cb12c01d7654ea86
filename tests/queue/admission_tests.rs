//! Admission Scenarios
//!
//! Sessions and workers meeting over the in-process store.

use std::sync::Arc;
use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::timeout;

use waiting_room::application::services::{AdmissionOutcome, AdmissionSettings, AdmissionWorker};
use waiting_room::domain::entities::QueueStore;
use waiting_room::domain::rendezvous;
use waiting_room::presentation::websocket::{
    ClientAction, CloseReason, ConnectionSession, Inbound, Outbound,
};

use crate::common::{wait_until, TestApp};

fn admission(window: Duration) -> AdmissionSettings {
    AdmissionSettings {
        purchase_window: window,
        max_alive: Duration::from_secs(60),
    }
}

/// Start a worker already listening for arrivals
async fn start_worker(app: &TestApp, index: usize, window: Duration) {
    let store: Arc<dyn QueueStore> = app.store.clone();
    let arrivals = store.subscribe(rendezvous::ARRIVAL_TOPIC).await.unwrap();
    let worker = AdmissionWorker::new(index, store, admission(window), rendezvous::ARRIVAL_TOPIC);
    tokio::spawn(async move { worker.process_arrivals(arrivals).await });
}

/// Inbound frames followed by an open, silent transport
fn then_idle(actions: Vec<ClientAction>) -> impl Stream<Item = Inbound> + Unpin {
    stream::iter(actions.into_iter().map(Inbound::Action)).chain(stream::pending())
}

async fn wait_for_empty_store(app: &TestApp) {
    let store = app.store.clone();
    wait_until(|| {
        let store = store.clone();
        async move { store.is_empty() }
    })
    .await;
}

#[tokio::test]
async fn test_client_is_admitted_and_record_retired() {
    let app = TestApp::new().await;
    start_worker(&app, 0, Duration::from_secs(5)).await;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let client_id = session.client_id().to_string();

    let reason = session.run(then_idle(vec![ClientAction::NewClient])).await;

    assert_eq!(reason, CloseReason::Sold);
    let Some(Outbound::Status(status)) = out_rx.recv().await else {
        panic!("expected purchase status");
    };
    assert!(status.is_ready_to_buy);
    assert_eq!(status.client_id, client_id);
    assert_eq!(app.state.tokens.verify(&status.token_to_buy).unwrap().sub, client_id);
    assert_eq!(out_rx.recv().await, Some(Outbound::Close));

    wait_for_empty_store(&app).await;
}

#[tokio::test]
async fn test_competing_workers_offer_once() {
    let app = TestApp::new().await;
    start_worker(&app, 0, Duration::from_secs(5)).await;
    start_worker(&app, 1, Duration::from_secs(5)).await;

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let mut offers = app
        .store
        .subscribe(&rendezvous::sell_session(session.client_id()))
        .await
        .unwrap();

    let reason = session.run(then_idle(vec![ClientAction::NewClient])).await;

    assert_eq!(reason, CloseReason::Sold);
    assert!(offers.next().await.is_some());
    assert!(timeout(Duration::from_millis(200), offers.next()).await.is_err());
    wait_for_empty_store(&app).await;
}

#[tokio::test]
async fn test_unanswered_offer_is_force_finished() {
    let app = TestApp::new().await;

    // Client queues, then drops its transport without `finished`
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let client_id = session.client_id().to_string();
    let reason = session
        .run(stream::iter(vec![Inbound::Action(ClientAction::NewClient)]))
        .await;
    assert_eq!(reason, CloseReason::Disconnected);
    assert_eq!(app.store.len(), 1);

    let mut force_finish = app
        .store
        .subscribe(&rendezvous::finish_session(&client_id))
        .await
        .unwrap();

    // Replay the arrival to a worker with a short purchase window
    let record = app.store.find(&client_id).await.unwrap().unwrap();
    let worker = AdmissionWorker::new(
        0,
        app.store.clone(),
        admission(Duration::from_millis(100)),
        rendezvous::ARRIVAL_TOPIC,
    );
    let outcome = worker
        .process_arrival(&record.to_json().unwrap())
        .await
        .unwrap();

    assert_eq!(outcome, AdmissionOutcome::TimedOut);
    assert_eq!(force_finish.next().await.unwrap(), client_id);
    assert!(app.store.is_empty());

    // The record is gone, so resuming it fails
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let reason = session
        .run(stream::iter(vec![Inbound::Action(ClientAction::Reconnect {
            client_id: client_id.clone(),
        })]))
        .await;
    assert_eq!(reason, CloseReason::Expired);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_client_leaving_mid_offer_is_force_finished_after_window() {
    let app = TestApp::new().await;
    let store: Arc<dyn QueueStore> = app.store.clone();

    // Queue a client, then answer its offer with `finished` on its behalf
    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let session = ConnectionSession::new(app.state.session_context(), out_tx);
    let client_id = session.client_id().to_string();
    let reason = session
        .run(stream::iter(vec![Inbound::Action(ClientAction::NewClient)]))
        .await;
    assert_eq!(reason, CloseReason::Disconnected);

    let mut offers = store.subscribe(&rendezvous::sell_session(&client_id)).await.unwrap();
    let mut force_finish = store
        .subscribe(&rendezvous::finish_session(&client_id))
        .await
        .unwrap();

    let payload = app.store.find(&client_id).await.unwrap().unwrap().to_json().unwrap();
    let worker = AdmissionWorker::new(
        0,
        Arc::clone(&store),
        admission(Duration::from_millis(200)),
        rendezvous::ARRIVAL_TOPIC,
    );
    let attempt = tokio::spawn(async move { worker.process_arrival(&payload).await });

    offers.next().await.unwrap();
    store
        .publish(&rendezvous::finish_worker(&client_id), &client_id)
        .await
        .unwrap();

    let outcome = attempt.await.unwrap().unwrap();
    assert_eq!(outcome, AdmissionOutcome::TimedOut);
    assert_eq!(force_finish.next().await.unwrap(), client_id);
    assert!(app.store.is_empty());
}
