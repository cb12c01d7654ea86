//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::application::services::{AdmissionSettings, AdmissionWorker, TokenService};
use crate::config::Settings;
use crate::domain::entities::QueueStore;
use crate::domain::services::PositionEstimator;
use crate::infrastructure::queue;
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{QueueRegistry, SessionContext, SessionFinisher};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QueueStore>,
    pub registry: Arc<QueueRegistry>,
    pub tokens: Arc<TokenService>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Build the shared state. The returned finisher must be spawned for
    /// finish-all requests to take effect.
    pub fn new(settings: Settings, store: Arc<dyn QueueStore>) -> (Self, SessionFinisher) {
        let estimator = PositionEstimator::new(
            settings.queue.group_size,
            settings.queue.purchase_window(),
        );
        let (registry, finisher) = QueueRegistry::new(estimator, settings.queue.queue_size);
        let tokens = Arc::new(TokenService::new(&settings.jwt));

        let state = Self {
            store,
            registry,
            tokens,
            settings: Arc::new(settings),
        };
        (state, finisher)
    }

    /// Collaborators handed to each connection session
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            tokens: Arc::clone(&self.tokens),
            max_alive: self.settings.queue.max_alive(),
        }
    }
}

/// Spawn the session finisher, the status broadcaster and the worker pool.
pub fn spawn_background_tasks(state: &AppState, finisher: SessionFinisher) {
    tokio::spawn(finisher.run());

    tokio::spawn(Arc::clone(&state.registry).run_status_broadcaster(
        Arc::clone(&state.store),
        state.settings.queue.status_interval(),
    ));

    let admission = AdmissionSettings::from(&state.settings.queue);
    for index in 0..state.settings.queue.max_workers {
        let worker = AdmissionWorker::new(
            index,
            Arc::clone(&state.store),
            admission,
            state.settings.redis.arrival_topic.clone(),
        );
        tokio::spawn(worker.run());
    }
    tracing::info!(workers = state.settings.queue.max_workers, "Admission workers started");
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        let store = queue::create_queue_store(&settings).await?;
        Self::build_with_store(settings, store).await
    }

    /// Build the application around an existing queue store
    pub async fn build_with_store(settings: Settings, store: Arc<dyn QueueStore>) -> Result<Self> {
        let cors_settings = settings.cors.clone();
        let addr = settings.server_addr();

        let (state, finisher) = AppState::new(settings, store);
        spawn_background_tasks(&state, finisher);

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&cors_settings));

        // Bind to address
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
