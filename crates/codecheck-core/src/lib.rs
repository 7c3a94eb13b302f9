//! CodeCheck Core - shared abstractions for the database layer
//!
//! This crate provides the types every other CodeCheck database crate
//! depends on:
//!
//! - `Connection` - Trait implemented by database drivers
//! - `DatabaseConfig` - Canonical connection and pool settings
//! - `DbError` - Error taxonomy surfaced to callers
//! - Common types like `Value`, `Row`, `QueryResult`

mod config;
mod connection;
mod error;
pub mod security;
mod types;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use security::*;
pub use types::*;
