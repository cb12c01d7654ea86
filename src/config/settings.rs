//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::rendezvous;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Purchase token signing settings
    pub jwt: JwtSettings,

    /// Admission queue settings
    pub queue: QueueSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,

    /// List holding the serialized waiting records
    pub waiting_list: String,

    /// Topic on which arrivals are announced to workers
    pub arrival_topic: String,

    /// Key prefix for admission claims
    pub claim_prefix: String,
}

/// Purchase token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing purchase tokens
    pub secret: String,

    /// Purchase token expiry in minutes
    pub purchase_token_expiry_minutes: i64,
}

/// Which queue store backs the waiting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance (multi-process deployments)
    Redis,
    /// In-process store (single process, development, tests)
    Memory,
}

/// Admission queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Queue store backend
    pub backend: StoreBackend,

    /// Clients admitted per group (position estimation)
    pub group_size: usize,

    /// Number of admission workers
    pub max_workers: usize,

    /// Capacity of the finished-session queue
    pub queue_size: usize,

    /// Purchase window in seconds
    pub time_buying_secs: u64,

    /// Max-alive window in minutes
    pub max_time_alive_minutes: u64,

    /// Interval between status broadcasts in seconds
    pub status_interval_secs: u64,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (empty = any)
    pub allowed_origins: Vec<String>,
}

/// Minimum required length for the signing secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. Built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. `APP__SECTION__KEY` environment variables
    /// 5. Flat variables (`SERVER_PORT`, `REDIS_ADDRESS`, `JWT_KEY`, `MAX_WORKERS`, ...)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if it fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let redis_url = std::env::var("REDIS_URL").ok().or_else(|| {
            std::env::var("REDIS_ADDRESS")
                .ok()
                .map(|address| format!("redis://{}", address))
        });
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .or_else(|| std::env::var("JWT_KEY").ok());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.waiting_list", rendezvous::WAITING_LIST)?
            .set_default("redis.arrival_topic", rendezvous::ARRIVAL_TOPIC)?
            .set_default("redis.claim_prefix", "claim:")?
            .set_default("jwt.purchase_token_expiry_minutes", 60)?
            .set_default("queue.backend", "redis")?
            .set_default("queue.group_size", 10)?
            .set_default("queue.max_workers", 10)?
            .set_default("queue.queue_size", 1024)?
            .set_default("queue.time_buying_secs", 300)?
            .set_default("queue.max_time_alive_minutes", 5)?
            .set_default("queue.status_interval_secs", 10)?
            .set_default("websocket.max_message_size", 65536_i64)? // 64KB
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__QUEUE__MAX_WORKERS=20 -> queue.max_workers = 20
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map flat environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("redis.url", redis_url)?
            .set_override_option("jwt.secret", jwt_secret)?
            .set_override_option("queue.max_workers", std::env::var("MAX_WORKERS").ok())?
            .set_override_option("queue.group_size", std::env::var("CLIENTS_PER_GROUP").ok())?
            .set_override_option("queue.queue_size", std::env::var("QUEUE_SIZE").ok())?
            .set_override_option("queue.time_buying_secs", std::env::var("TIME_BUYING").ok())?
            .set_override_option(
                "queue.max_time_alive_minutes",
                std::env::var("MAX_TIME_ALIVE").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| settings.validate().map(|()| settings))
    }

    /// Check invariants the rest of the service relies on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first invalid option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }

        let non_zero = [
            ("queue.group_size", self.queue.group_size as u64),
            ("queue.max_workers", self.queue.max_workers as u64),
            ("queue.queue_size", self.queue.queue_size as u64),
            ("queue.time_buying_secs", self.queue.time_buying_secs),
            ("queue.max_time_alive_minutes", self.queue.max_time_alive_minutes),
            ("queue.status_interval_secs", self.queue.status_interval_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl QueueSettings {
    /// Time a claimed client has to complete its purchase.
    pub fn purchase_window(&self) -> Duration {
        Duration::from_secs(self.time_buying_secs)
    }

    /// Time a silent client's record stays eligible for resumption.
    pub fn max_alive(&self) -> Duration {
        Duration::from_secs(self.max_time_alive_minutes.saturating_mul(60))
    }

    /// Interval between status broadcasts.
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}
