//! Admission Worker
//!
//! Drains the arrival topic one client at a time. For each arrival the
//! worker claims the client, offers it the purchase over the rendezvous
//! topics, then waits for whichever comes first: the sale confirmation or
//! the end of the purchase window. Workers share no state except through the
//! queue store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::QueueSettings;
use crate::domain::entities::{QueueStore, Subscription, WaitingRecord};
use crate::domain::rendezvous;
use crate::infrastructure::metrics;
use crate::shared::error::StoreError;

/// Delay before resubscribing to the arrival topic after a failure
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Timing rules applied by every worker
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSettings {
    /// Time a claimed client has to confirm its purchase
    pub purchase_window: Duration,
    /// Heartbeat age after which a record counts as abandoned
    pub max_alive: Duration,
}

impl AdmissionSettings {
    /// Lifetime of an admission claim. Outlives the purchase window so a
    /// duplicate delivery of the same arrival can't be claimed mid-sale.
    pub fn claim_ttl(&self) -> Duration {
        self.purchase_window.saturating_add(self.max_alive)
    }
}

impl From<&QueueSettings> for AdmissionSettings {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            purchase_window: settings.purchase_window(),
            max_alive: settings.max_alive(),
        }
    }
}

/// What happened to one delivered arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Record already retired, or the payload was unreadable
    Skipped,
    /// Another worker holds the claim
    Contended,
    /// Heartbeat older than the max-alive window; force-finished without an offer
    Expired,
    /// Sale confirmed; record removed
    Sold,
    /// Purchase window elapsed; force-finished and record removed
    TimedOut,
}

impl AdmissionOutcome {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Contended => "contended",
            Self::Expired => "expired",
            Self::Sold => "sold",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Result of the purchase rendezvous race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rendezvous {
    Sold,
    TimedOut,
}

/// One admission worker
pub struct AdmissionWorker {
    id: String,
    store: Arc<dyn QueueStore>,
    settings: AdmissionSettings,
    arrival_topic: String,
}

impl AdmissionWorker {
    /// Create worker number `index`
    pub fn new(
        index: usize,
        store: Arc<dyn QueueStore>,
        settings: AdmissionSettings,
        arrival_topic: impl Into<String>,
    ) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("worker-{}-{}", index, &suffix[..8]),
            store,
            settings,
            arrival_topic: arrival_topic.into(),
        }
    }

    /// Worker identifier, also used as claim owner
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Main loop. Never returns; a lost subscription is re-established.
    pub async fn run(self) {
        info!(worker_id = %self.id, "Admission worker started");
        loop {
            match self.store.subscribe(&self.arrival_topic).await {
                Ok(arrivals) => {
                    self.process_arrivals(arrivals).await;
                    warn!(worker_id = %self.id, "Arrival subscription ended, resubscribing");
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to subscribe to arrivals");
                }
            }
            sleep(RESUBSCRIBE_DELAY).await;
        }
    }

    /// Process arrivals until the subscription ends.
    ///
    /// A store failure on one arrival abandons that arrival only.
    pub async fn process_arrivals(&self, mut arrivals: Subscription) {
        while let Some(payload) = arrivals.next().await {
            match self.process_arrival(&payload).await {
                Ok(outcome) => metrics::record_admission(outcome.as_str()),
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Abandoning arrival after store error");
                    metrics::record_admission("abandoned");
                }
            }
        }
    }

    /// Run the admission protocol for one arrival payload.
    #[instrument(skip(self, payload), fields(worker_id = %self.id, client_id))]
    pub async fn process_arrival(&self, payload: &str) -> Result<AdmissionOutcome, StoreError> {
        let client_id = match WaitingRecord::from_json(payload) {
            Ok(announced) => announced.client_id,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed arrival");
                return Ok(AdmissionOutcome::Skipped);
            }
        };
        tracing::Span::current().record("client_id", client_id.as_str());

        let Some(record) = self.store.find(&client_id).await? else {
            debug!("Arrival already retired");
            return Ok(AdmissionOutcome::Skipped);
        };

        if !self
            .store
            .claim(&client_id, &self.id, self.settings.claim_ttl())
            .await?
        {
            debug!("Arrival claimed by another worker");
            return Ok(AdmissionOutcome::Contended);
        }

        if record.is_expired(Utc::now(), self.settings.max_alive) {
            debug!("Client exceeded max time alive");
            self.force_finish(&client_id).await;
            self.retire(&client_id).await?;
            return Ok(AdmissionOutcome::Expired);
        }

        // Listen before offering so the confirmation can't be missed
        let sold = self
            .store
            .subscribe(&rendezvous::sell_worker(&client_id))
            .await?;
        let finished = self
            .store
            .subscribe(&rendezvous::finish_worker(&client_id))
            .await?;

        debug!("Offering purchase");
        self.store
            .publish(&rendezvous::sell_session(&client_id), &client_id)
            .await?;

        match self.await_purchase(sold, finished).await {
            Rendezvous::Sold => {
                self.retire(&client_id).await?;
                info!("Purchase confirmed");
                Ok(AdmissionOutcome::Sold)
            }
            Rendezvous::TimedOut => {
                debug!("Purchase window elapsed");
                self.force_finish(&client_id).await;
                self.retire(&client_id).await?;
                Ok(AdmissionOutcome::TimedOut)
            }
        }
    }

    /// Race the sale confirmation against the purchase window.
    ///
    /// A voluntary leave does not end the wait: the window still runs out
    /// and the client is force-finished, exactly as on a plain timeout.
    async fn await_purchase(&self, mut sold: Subscription, mut finished: Subscription) -> Rendezvous {
        let deadline = sleep(self.settings.purchase_window);
        tokio::pin!(deadline);
        let mut left = false;

        loop {
            tokio::select! {
                Some(_) = sold.next() => return Rendezvous::Sold,
                Some(_) = finished.next(), if !left => {
                    debug!("Client left, waiting out the purchase window");
                    left = true;
                }
                () = &mut deadline => return Rendezvous::TimedOut,
            }
        }
    }

    /// Tell the client's session, wherever it lives, that its turn is over.
    async fn force_finish(&self, client_id: &str) {
        if let Err(e) = self
            .store
            .publish(&rendezvous::finish_session(client_id), client_id)
            .await
        {
            warn!(error = %e, "Failed to publish force finish");
        }
    }

    async fn retire(&self, client_id: &str) -> Result<(), StoreError> {
        if !self.store.remove(client_id).await? {
            warn!("Waiting record was already removed");
        }
        Ok(())
    }
}
