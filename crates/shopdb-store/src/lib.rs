//! # shopdb-store
//!
//! Schema and migrations for the shop's relational store, backed by SQLite.
//!
//! The root migration `init_schema_orders` creates `users`, `orders` and
//! `order_items` with cascading foreign keys.  The crate exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection`, a
//! small linear revision tracker, and introspection helpers that check a
//! live database against the table descriptors.

pub mod config;
pub mod database;
pub mod inspect;
pub mod migrations;
pub mod schema;

mod error;

pub use config::{Environment, StoreConfig};
pub use database::Database;
pub use error::{Result, StoreError};
pub use migrations::{Migration, Migrator};
