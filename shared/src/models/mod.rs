//! Data models
//!
//! Shared between console-server and the vendor frontend (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY), all timestamps Unix millis.

pub mod import_job;
pub mod order;
pub mod shipment;
pub mod shop;

// Re-exports
pub use import_job::*;
pub use order::*;
pub use shipment::*;
pub use shop::*;
