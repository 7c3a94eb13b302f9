//! PostgreSQL connection factory
//!
//! Opens `tokio-postgres` connections with the TLS mode, statement timeout
//! and idle-in-transaction timeout from a [`codecheck_core::DatabaseConfig`]
//! applied at creation time.

mod connection;
mod convert;
mod factory;
mod tls;

pub use connection::PostgresConnection;
pub use factory::PostgresConnectionFactory;
pub use tls::{PostgresTlsConnector, TlsError};
