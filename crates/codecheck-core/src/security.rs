//! Security-related configuration types for database connections
//!
//! This module provides the TLS/SSL settings applied to every pooled
//! connection.

mod tls_config;

pub use tls_config::*;
