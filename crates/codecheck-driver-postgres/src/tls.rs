//! PostgreSQL TLS Support
//!
//! Builds `native-tls` connectors for tokio-postgres from a [`TlsConfig`],
//! following libpq's `sslmode` semantics: `allow`, `prefer` and `require`
//! only verify the server when a root certificate is configured.

use codecheck_core::{DbError, TlsConfig, TlsMode};
use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// Failed to load client certificate
    #[error("Failed to load client certificate from {path}: {source}")]
    ClientCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Failed to load client key
    #[error("Failed to load client key from {path}: {source}")]
    ClientKeyLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid client identity format
    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    /// TLS mode not supported
    #[error("TLS mode {mode} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

impl From<TlsError> for DbError {
    fn from(e: TlsError) -> Self {
        DbError::Tls(e.to_string())
    }
}

/// A PostgreSQL TLS connector builder
#[derive(Debug, Clone)]
pub struct PostgresTlsConnector;

impl PostgresTlsConnector {
    /// Build a TLS connector from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The TLS mode is Disable (use `NoTls` instead)
    /// - Certificate files cannot be read
    /// - Certificate formats are invalid
    pub fn build(config: &TlsConfig) -> Result<MakeTlsConnector, TlsError> {
        config
            .validate()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        if config.mode == TlsMode::Disable {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }

        info!(mode = %config.mode, "building PostgreSQL TLS connector");

        let mut builder = NativeTlsConnector::builder();

        configure_verification(&mut builder, config);

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            apply_client_cert(&mut builder, cert_path, key_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        debug!("TLS connector built successfully");

        Ok(MakeTlsConnector::new(connector))
    }
}

/// Map our mode onto what tokio-postgres negotiates
///
/// tokio-postgres only knows disable/prefer/require; certificate checks for
/// the verify modes happen in the native-tls connector.
pub(crate) fn negotiation_mode(mode: TlsMode) -> tokio_postgres::config::SslMode {
    use tokio_postgres::config::SslMode;

    match mode {
        TlsMode::Disable => SslMode::Disable,
        TlsMode::Allow | TlsMode::Prefer => SslMode::Prefer,
        TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
    }
}

/// Configure certificate verification based on TLS mode
fn configure_verification(builder: &mut TlsConnectorBuilder, config: &TlsConfig) {
    match config.mode {
        TlsMode::Disable => {}
        TlsMode::Allow | TlsMode::Prefer | TlsMode::Require => {
            if config.ca_cert.is_none() {
                debug!("no root certificate configured, skipping server verification");
                builder.danger_accept_invalid_certs(true);
            }
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyCa => {
            debug!("enabling CA verification only (hostname verification disabled)");
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {
            debug!("enabling full certificate verification");
        }
    }
}

/// Load and apply a PEM-encoded CA certificate to the TLS builder
fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;

    builder.add_root_certificate(cert);
    Ok(())
}

/// Load and apply client certificate and key for mutual TLS
fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    debug!(
        cert_path = %cert_path.display(),
        key_path = %key_path.display(),
        "loading client certificate and key"
    );

    let cert_pem = fs::read(cert_path).map_err(|e| TlsError::ClientCertLoadFailed {
        path: cert_path.display().to_string(),
        source: e,
    })?;

    let key_pem = fs::read(key_path).map_err(|e| TlsError::ClientKeyLoadFailed {
        path: key_path.display().to_string(),
        source: e,
    })?;

    // native-tls Identity::from_pkcs8 expects PEM cert and PEM key
    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;

    builder.identity(identity);
    Ok(())
}
