//! Application Services
//!
//! ## Available Services
//!
//! - **TokenService**: Signed purchase tokens handed to admitted clients
//! - **AdmissionWorker**: Claims arrivals and runs the purchase rendezvous

pub mod admission_worker;
pub mod token_service;

pub use admission_worker::{AdmissionOutcome, AdmissionSettings, AdmissionWorker};
pub use token_service::{PurchaseClaims, PurchaseToken, TokenError, TokenService};
