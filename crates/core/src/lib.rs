//! Shared domain types for the Drawbridge broker.
//!
//! Pure types, constants and validation used by both the broker engine
//! and the API server. Has no internal workspace dependencies.

pub mod error;
pub mod generation;
pub mod types;
