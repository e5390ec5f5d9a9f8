//! Shared types for the fulfillment console
//!
//! Data models and utility types used by both the console server and its
//! clients. DB row types derive `sqlx::FromRow` behind the `db` feature so
//! frontend consumers don't pull in sqlx.

pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
