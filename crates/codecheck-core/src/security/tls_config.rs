//! TLS/SSL Configuration Types
//!
//! Defines configuration types for TLS/SSL connections to PostgreSQL.

use crate::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// TLS/SSL mode for database connections
///
/// These modes follow PostgreSQL's `sslmode` conventions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Disable TLS entirely (not recommended for production)
    Disable,
    /// Try unencrypted first, use TLS if the server insists
    Allow,
    /// Prefer TLS, but allow unencrypted connections
    #[default]
    Prefer,
    /// Require TLS, but don't verify the server certificate
    Require,
    /// Require TLS and verify the server certificate against the CA
    VerifyCa,
    /// Require TLS, verify CA, and verify the server hostname matches
    VerifyFull,
}

impl TlsMode {
    /// Returns true if this mode requires encryption
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull
        )
    }

    /// Returns true if this mode requires certificate verification
    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    /// Returns true if this mode requires hostname verification
    pub fn requires_hostname_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }

    /// The PostgreSQL `sslmode` spelling of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsMode::Disable => "disable",
            TlsMode::Allow => "allow",
            TlsMode::Prefer => "prefer",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            "allow" => Ok(TlsMode::Allow),
            "prefer" => Ok(TlsMode::Prefer),
            "require" => Ok(TlsMode::Require),
            "verify-ca" | "verify_ca" => Ok(TlsMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(TlsMode::VerifyFull),
            other => Err(DbError::Configuration(format!(
                "unknown SSL mode '{}' (expected disable, allow, prefer, require, verify-ca or verify-full)",
                other
            ))),
        }
    }
}

/// Configuration for TLS/SSL database connections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// TLS mode determining the level of security
    pub mode: TlsMode,
    /// Path to the CA certificate file for server verification
    pub ca_cert: Option<PathBuf>,
    /// Path to the client certificate file for mutual TLS
    pub client_cert: Option<PathBuf>,
    /// Path to the client private key file for mutual TLS
    pub client_key: Option<PathBuf>,
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Create a disabled TLS configuration
    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    /// Set the CA certificate path for server verification
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Set the client certificate for mutual TLS authentication
    pub fn client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<()> {
        for (label, path) in [
            ("CA certificate", &self.ca_cert),
            ("Client certificate", &self.client_cert),
            ("Client key", &self.client_key),
        ] {
            if let Some(path) = path
                && path.as_os_str().is_empty()
            {
                return Err(DbError::Configuration(format!(
                    "{} path cannot be empty",
                    label
                )));
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => Err(DbError::Configuration(
                "Client certificate provided but client key is missing".to_string(),
            )),
            (None, Some(_)) => Err(DbError::Configuration(
                "Client key provided but client certificate is missing".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests;
