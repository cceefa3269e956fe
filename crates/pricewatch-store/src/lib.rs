//! Pricewatch analytical store
//!
//! SQLite-backed catalog of product types, stores and products for the
//! retail-price monitor:
//! - Schema and analytics indexes (`schema`)
//! - Deterministic synthetic dataset generation (`seed`)
//! - The six dashboard analytics reads, fully materialised (`analytics`)
//! - Ordered result records (`value`)

pub mod analytics;
pub mod conn;
pub mod error;
pub mod schema;
pub mod seed;
pub mod value;

pub use conn::{OpenMode, StoreConn};
pub use error::{Result, StoreError};
pub use seed::{seed_catalog, SeedConfig, SeedSummary};
pub use value::{uniform_columns, Record, Value};

pub use rusqlite::Connection;

/// Storage format for `created_at` / `updated_at` columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
