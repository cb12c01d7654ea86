//! Application Layer
//!
//! Contains the services that drive admission: purchase tokens and the
//! admission workers. This layer orchestrates the flow of data between the
//! presentation and domain layers.

pub mod services;
