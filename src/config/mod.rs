//! # Configuration Module
//!
//! This module handles application configuration loading and management.
//! Configuration can be loaded from:
//! - Environment variables (prefixed with APP__, plus the flat legacy names)
//! - Configuration files (config/default.toml, config/{environment}.toml)
//! - .env files (via dotenvy)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waiting_room::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Admitting {} clients per group", settings.queue.group_size);
//! ```

mod settings;

pub use settings::*;
