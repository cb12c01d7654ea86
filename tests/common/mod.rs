//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use tower::ServiceExt;

use waiting_room::config::{
    CorsSettings, JwtSettings, QueueSettings, RedisSettings, ServerSettings, Settings,
    StoreBackend, WebSocketSettings,
};
use waiting_room::domain::rendezvous;
use waiting_room::infrastructure::queue::MemoryQueueStore;
use waiting_room::presentation::http::routes;
use waiting_room::startup::AppState;

/// Settings for an in-process deployment with small windows
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".into(),
            waiting_list: rendezvous::WAITING_LIST.into(),
            arrival_topic: rendezvous::ARRIVAL_TOPIC.into(),
            claim_prefix: "claim:".into(),
        },
        jwt: JwtSettings {
            secret: "integration-test-secret-0123456789abcdef".into(),
            purchase_token_expiry_minutes: 60,
        },
        queue: QueueSettings {
            backend: StoreBackend::Memory,
            group_size: 3,
            max_workers: 2,
            queue_size: 16,
            time_buying_secs: 30,
            max_time_alive_minutes: 1,
            status_interval_secs: 10,
        },
        websocket: WebSocketSettings {
            max_message_size: 64 * 1024,
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        environment: "test".into(),
    }
}

/// Test application backed by the in-process store. Workers are not
/// started; scenarios drive them explicitly.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryQueueStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryQueueStore::new());
        let (state, finisher) = AppState::new(test_settings(), store.clone());
        tokio::spawn(finisher.run());

        Self {
            router: routes::create_router(state.clone()),
            state,
            store,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request("GET", uri).await
    }

    /// Make a POST request without a body
    pub async fn post(&self, uri: &str) -> axum::response::Response {
        self.request("POST", uri).await
    }

    async fn request(&self, method: &str, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

/// Read a response body as JSON
pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
