//! Queue Registry
//!
//! Process-wide bookkeeping of connected waiting sessions. Pushes periodic
//! queue status to every registered session and routes administrative
//! finish-all requests to the session finisher.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::messages::Outbound;
use crate::domain::entities::{QueueStore, StatusUpdate, WaitingRecord};
use crate::domain::services::PositionEstimator;
use crate::infrastructure::metrics;

/// The finisher task is gone, so finish requests can't be delivered
#[derive(Debug, thiserror::Error)]
#[error("Session finisher is not running")]
pub struct FinisherStopped;

/// Registry's view of one connected session
#[derive(Debug)]
pub struct SessionHandle {
    client_id: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: Notify,
}

impl SessionHandle {
    pub fn new(client_id: impl Into<String>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            client_id: client_id.into(),
            outbound,
            closing: Notify::new(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Push a status update. Returns `false` if the transport writer is gone.
    pub fn send_status(&self, status: StatusUpdate) -> bool {
        self.outbound.send(Outbound::Status(status)).is_ok()
    }

    /// Ask the session to terminate and close its transport.
    pub fn close(&self) {
        self.closing.notify_one();
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Resolves once [`SessionHandle::close`] has been called.
    pub async fn closed(&self) {
        self.closing.notified().await;
    }
}

/// Registry of active sessions, keyed by client id
pub struct QueueRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    finished_tx: mpsc::Sender<Arc<SessionHandle>>,
    estimator: PositionEstimator,
}

impl QueueRegistry {
    /// Create a registry and the finisher that closes retired sessions.
    ///
    /// `capacity` bounds the number of finish requests in flight.
    pub fn new(estimator: PositionEstimator, capacity: usize) -> (Arc<Self>, SessionFinisher) {
        let (finished_tx, finished_rx) = mpsc::channel(capacity.max(1));
        let registry = Arc::new(Self {
            sessions: DashMap::new(),
            finished_tx,
            estimator,
        });
        let finisher = SessionFinisher {
            registry: Arc::clone(&registry),
            finished_rx,
        };
        (registry, finisher)
    }

    pub fn register(&self, session: Arc<SessionHandle>) {
        let client_id = session.client_id.clone();
        if let Some(previous) = self.sessions.insert(client_id.clone(), session) {
            // Two live transports for one client id; the newer one wins
            warn!(client_id = %client_id, "Replacing registered session");
            previous.close();
        }
        metrics::set_sessions_registered(self.sessions.len());
        debug!(client_id = %client_id, "Session registered");
    }

    /// Remove a session by identity. Removing an absent session is a no-op.
    pub fn deregister(&self, session: &Arc<SessionHandle>) -> bool {
        let removed = self
            .sessions
            .remove_if(&session.client_id, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            metrics::set_sessions_registered(self.sessions.len());
            debug!(client_id = %session.client_id, "Session deregistered");
        }
        removed
    }

    pub fn lookup(&self, client_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Push status computed from one waiting list snapshot to every session.
    pub fn broadcast_status(&self, queue: &[WaitingRecord]) -> usize {
        let mut delivered = 0;
        for session in self.snapshot() {
            let estimate = self.estimator.estimate(queue, &session.client_id);
            if session.send_status(StatusUpdate::waiting(&session.client_id, estimate)) {
                delivered += 1;
            } else {
                debug!(client_id = %session.client_id, "Status not delivered, transport closed");
            }
        }
        delivered
    }

    /// Periodic status broadcaster. Runs until the process stops.
    pub async fn run_status_broadcaster(self: Arc<Self>, store: Arc<dyn QueueStore>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.is_empty() {
                continue;
            }

            match store.list().await {
                Ok(queue) => {
                    let delivered = self.broadcast_status(&queue);
                    metrics::record_status_broadcast();
                    debug!(sessions = delivered, queued = queue.len(), "Sent periodic status");
                }
                Err(e) => {
                    error!(error = %e, "Failed to list waiting queue");
                }
            }
        }
    }

    /// Request termination of every registered session.
    ///
    /// Returns the number of sessions handed to the finisher.
    pub async fn finish_all(&self) -> Result<usize, FinisherStopped> {
        let sessions = self.snapshot();
        let requested = sessions.len();
        for session in sessions {
            self.finished_tx.send(session).await.map_err(|_| {
                error!("Session finisher is not running");
                FinisherStopped
            })?;
        }
        info!(sessions = requested, "Finishing all sessions");
        Ok(requested)
    }
}

/// Deregisters and closes sessions retired through the registry
pub struct SessionFinisher {
    registry: Arc<QueueRegistry>,
    finished_rx: mpsc::Receiver<Arc<SessionHandle>>,
}

impl SessionFinisher {
    pub async fn run(mut self) {
        while let Some(session) = self.finished_rx.recv().await {
            debug!(client_id = %session.client_id, "Closing session");
            if !self.registry.deregister(&session) {
                debug!(client_id = %session.client_id, "Session already deregistered");
            }
            session.close();
        }
    }
}
