//! Connection Session
//!
//! Per-connection client state machine:
//!
//! ```text
//! Connecting --newclient--> Queued --offer--> AwaitingPurchase --> Sold
//!     |                       |
//!     +--reconnect (valid)----+--force finish--> TimedOutFinished
//! ```
//!
//! On every terminal transition the session leaves the registry and the
//! transport is closed. The state left behind is the one named by
//! [`CloseReason::final_state`]; endings without a lifecycle state of their
//! own settle in `Closed`. The waiting record is never removed here; workers
//! own removal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::messages::{ClientAction, Inbound, Outbound};
use super::registry::{QueueRegistry, SessionHandle};
use crate::application::services::{TokenError, TokenService};
use crate::domain::entities::{QueueStore, StatusUpdate, Subscription, WaitingRecord};
use crate::domain::rendezvous;
use crate::infrastructure::metrics;
use crate::shared::error::StoreError;

/// Client lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Connected, not yet queued. Only liveness is tracked.
    Connecting,
    Queued,
    /// Purchase offer received, token being issued
    AwaitingPurchase,
    Sold,
    TimedOutFinished,
    /// Left voluntarily
    Finished,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Purchase token delivered and sale confirmed
    Sold,
    /// Client sent `finished`
    Left,
    /// Worker force-finished the admission
    ForceFinished,
    /// Finish-all or a newer session for the same client id
    ClosedByAdmin,
    /// Reconnect target unknown or past the max-alive window
    Expired,
    /// Transport closed without `finished`
    Disconnected,
    /// Malformed inbound frame
    ProtocolViolation,
    /// Store, token or transport failure
    Failed,
}

impl CloseReason {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sold => "sold",
            Self::Left => "left",
            Self::ForceFinished => "force_finished",
            Self::ClosedByAdmin => "closed_by_admin",
            Self::Expired => "expired",
            Self::Disconnected => "disconnected",
            Self::ProtocolViolation => "protocol_violation",
            Self::Failed => "failed",
        }
    }

    /// Lifecycle state a session ending this way settles in
    pub fn final_state(&self) -> ClientState {
        match self {
            Self::Sold => ClientState::Sold,
            Self::ForceFinished => ClientState::TimedOutFinished,
            Self::Left => ClientState::Finished,
            _ => ClientState::Closed,
        }
    }
}

/// Session-level failures. Each one closes the session that hit it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Shared collaborators of every session
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn QueueStore>,
    pub registry: Arc<QueueRegistry>,
    pub tokens: Arc<TokenService>,
    /// Heartbeat age past which a waiting record can't be resumed
    pub max_alive: Duration,
}

enum SessionEvent {
    Inbound(Option<Inbound>),
    PurchaseOffered(Option<String>),
    ForceFinished(Option<String>),
    ClosedByAdmin,
}

/// One connected client
pub struct ConnectionSession {
    ctx: SessionContext,
    client_id: String,
    state: ClientState,
    heartbeat_at: DateTime<Utc>,
    birthday: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Outbound>,
    handle: Option<Arc<SessionHandle>>,
    offers: Option<Subscription>,
    force_finish: Option<Subscription>,
}

impl ConnectionSession {
    /// New session in `Connecting` with a freshly allocated client id.
    pub fn new(ctx: SessionContext, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        let now = Utc::now();
        Self {
            ctx,
            client_id: Uuid::now_v7().to_string(),
            state: ClientState::Connecting,
            heartbeat_at: now,
            birthday: now,
            outbound,
            handle: None,
            offers: None,
            force_finish: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Drive the session until a terminal transition.
    ///
    /// `inbound` ends when the transport is closed by the peer.
    #[instrument(skip_all, fields(client_id = %self.client_id))]
    pub async fn run<S>(mut self, mut inbound: S) -> CloseReason
    where
        S: Stream<Item = Inbound> + Unpin,
    {
        debug!("Session started");

        let reason = loop {
            let event = tokio::select! {
                frame = inbound.next() => SessionEvent::Inbound(frame),
                signal = next_signal(&mut self.offers) => SessionEvent::PurchaseOffered(signal),
                signal = next_signal(&mut self.force_finish) => SessionEvent::ForceFinished(signal),
                () = closed(&self.handle) => SessionEvent::ClosedByAdmin,
            };

            match self.handle_event(event).await {
                Ok(None) => {}
                Ok(Some(reason)) => break reason,
                Err(SessionError::ProtocolViolation(detail)) => {
                    warn!(detail = %detail, "Malformed frame, closing session");
                    break CloseReason::ProtocolViolation;
                }
                Err(e) => {
                    warn!(error = %e, state = ?self.state, "Session failed");
                    break CloseReason::Failed;
                }
            }
        };

        self.shutdown(reason);
        reason
    }

    async fn handle_event(&mut self, event: SessionEvent) -> Result<Option<CloseReason>, SessionError> {
        match event {
            SessionEvent::Inbound(None) => {
                debug!("Transport closed by peer");
                Ok(Some(CloseReason::Disconnected))
            }
            SessionEvent::Inbound(Some(Inbound::Malformed(detail))) => {
                Err(SessionError::ProtocolViolation(detail))
            }
            SessionEvent::Inbound(Some(Inbound::Action(action))) => self.handle_action(action).await,
            SessionEvent::PurchaseOffered(Some(_)) => self.sell().await.map(Some),
            SessionEvent::ForceFinished(Some(_)) => {
                debug!("Admission force-finished");
                Ok(Some(CloseReason::ForceFinished))
            }
            SessionEvent::PurchaseOffered(None) | SessionEvent::ForceFinished(None) => Err(
                StoreError::Subscription("rendezvous subscription ended".into()).into(),
            ),
            SessionEvent::ClosedByAdmin => {
                debug!("Session closed through the registry");
                Ok(Some(CloseReason::ClosedByAdmin))
            }
        }
    }

    async fn handle_action(&mut self, action: ClientAction) -> Result<Option<CloseReason>, SessionError> {
        self.heartbeat_at = Utc::now();

        match (action, self.state) {
            (ClientAction::NewClient, ClientState::Connecting) => {
                self.join_queue().await?;
                Ok(None)
            }
            (ClientAction::Reconnect { client_id }, ClientState::Connecting) => {
                self.resume(client_id).await
            }
            (ClientAction::Alive, _) => {
                self.refresh_heartbeat().await;
                Ok(None)
            }
            (ClientAction::Finished, _) => {
                self.leave().await;
                Ok(Some(CloseReason::Left))
            }
            (ClientAction::Unknown(name), _) => {
                debug!(action = %name, "Ignoring unknown action");
                Ok(None)
            }
            (action, state) => {
                debug!(?action, ?state, "Ignoring action outside Connecting");
                Ok(None)
            }
        }
    }

    /// Connecting -> Queued for a brand new client.
    async fn join_queue(&mut self) -> Result<(), SessionError> {
        self.birthday = self.heartbeat_at;
        // Listen before enqueueing so an idle worker's offer can't be missed
        self.subscribe_rendezvous().await?;
        self.register();

        let record = WaitingRecord {
            client_id: self.client_id.clone(),
            heartbeat_at: self.heartbeat_at,
            birthday: self.birthday,
        };
        self.ctx.store.enqueue(&record).await?;

        self.state = ClientState::Queued;
        info!("Client queued");
        Ok(())
    }

    /// Connecting -> Queued by re-attaching to an existing waiting record.
    async fn resume(&mut self, client_id: String) -> Result<Option<CloseReason>, SessionError> {
        let Some(record) = self.ctx.store.find(&client_id).await? else {
            info!(previous_client_id = %client_id, "Reconnect target not found");
            return Ok(Some(CloseReason::Expired));
        };

        if record.is_expired(self.heartbeat_at, self.ctx.max_alive) {
            info!(previous_client_id = %client_id, "Reconnect target expired");
            return Ok(Some(CloseReason::Expired));
        }

        self.client_id = record.client_id.clone();
        tracing::Span::current().record("client_id", self.client_id.as_str());
        self.birthday = record.birthday;

        self.ctx
            .store
            .replace(&record.with_heartbeat(self.heartbeat_at))
            .await?;
        self.subscribe_rendezvous().await?;
        self.register();

        self.state = ClientState::Queued;
        info!("Client reconnected");
        Ok(None)
    }

    /// Push the new heartbeat into the waiting record. Failures are logged only.
    async fn refresh_heartbeat(&mut self) {
        if self.state != ClientState::Queued {
            return;
        }

        let record = WaitingRecord {
            client_id: self.client_id.clone(),
            heartbeat_at: self.heartbeat_at,
            birthday: self.birthday,
        };
        match self.ctx.store.replace(&record).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => debug!("Waiting record already retired"),
            Err(e) => warn!(error = %e, "Failed to refresh heartbeat"),
        }
    }

    /// Release a worker that may be holding this client's admission.
    async fn leave(&mut self) {
        info!("Client left");
        if let Err(e) = self
            .ctx
            .store
            .publish(&rendezvous::finish_worker(&self.client_id), &self.client_id)
            .await
        {
            warn!(error = %e, "Failed to publish finish signal");
        }
    }

    /// Hand the purchase token to the client and confirm the sale.
    async fn sell(&mut self) -> Result<CloseReason, SessionError> {
        self.state = ClientState::AwaitingPurchase;

        let token = self.ctx.tokens.issue(&self.client_id)?;
        self.outbound
            .send(Outbound::Status(StatusUpdate::ready_to_buy(
                &self.client_id,
                token.token,
            )))
            .map_err(|_| SessionError::TransportClosed)?;

        self.ctx
            .store
            .publish(&rendezvous::sell_worker(&self.client_id), &self.client_id)
            .await?;

        info!("Purchase token delivered");
        Ok(CloseReason::Sold)
    }

    async fn subscribe_rendezvous(&mut self) -> Result<(), SessionError> {
        let store = &self.ctx.store;
        self.offers = Some(store.subscribe(&rendezvous::sell_session(&self.client_id)).await?);
        self.force_finish = Some(
            store
                .subscribe(&rendezvous::finish_session(&self.client_id))
                .await?,
        );
        Ok(())
    }

    fn register(&mut self) {
        let handle = Arc::new(SessionHandle::new(&self.client_id, self.outbound.clone()));
        self.ctx.registry.register(Arc::clone(&handle));
        self.handle = Some(handle);
    }

    fn shutdown(&mut self, reason: CloseReason) {
        if let Some(handle) = self.handle.take() {
            self.ctx.registry.deregister(&handle);
        }
        self.offers = None;
        self.force_finish = None;
        let _ = self.outbound.send(Outbound::Close);

        self.state = reason.final_state();
        metrics::record_session_closed(reason.as_str());
        info!(reason = reason.as_str(), state = ?self.state, "Session closed");
    }
}

async fn next_signal(subscription: &mut Option<Subscription>) -> Option<String> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn closed(handle: &Option<Arc<SessionHandle>>) {
    match handle {
        Some(handle) => handle.closed().await,
        None => std::future::pending().await,
    }
}
