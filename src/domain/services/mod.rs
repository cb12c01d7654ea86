//! # Domain Services
//!
//! Domain services encapsulate queue rules that don't naturally belong to a
//! single entity.
//!
//! ## Services
//!
//! - **PositionEstimator**: queue position and time-left estimation

mod position_service;

pub use position_service::*;
