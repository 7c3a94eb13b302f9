//! Database configuration
//!
//! One canonical [`DatabaseConfig`] is resolved at process start, either from
//! a single `DATABASE_URL` or from discrete `DB_*` variables. Pool sizing and
//! timeouts always come from the `DB_*` variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::{DbError, Result, TlsConfig, TlsMode};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_HOST: &str = "DB_HOST";
pub const ENV_PORT: &str = "DB_PORT";
pub const ENV_USER: &str = "DB_USER";
pub const ENV_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_NAME: &str = "DB_NAME";
pub const ENV_SSLMODE: &str = "DB_SSLMODE";
pub const ENV_POOL_MIN: &str = "DB_POOL_MIN";
pub const ENV_POOL_MAX: &str = "DB_POOL_MAX";
pub const ENV_TIMEOUT: &str = "DB_TIMEOUT";
pub const ENV_STATEMENT_TIMEOUT: &str = "DB_STATEMENT_TIMEOUT";
pub const ENV_IDLE_TIMEOUT: &str = "DB_IDLE_TIMEOUT";
pub const ENV_SSLROOTCERT: &str = "DB_SSLROOTCERT";
pub const ENV_SSLCERT: &str = "DB_SSLCERT";
pub const ENV_SSLKEY: &str = "DB_SSLKEY";
pub const ENV_APPLICATION_NAME: &str = "DB_APPLICATION_NAME";

/// Variables that describe the connection target; ignored when a URL is given
const DISCRETE_TARGET_VARS: [&str; 6] = [
    ENV_HOST,
    ENV_PORT,
    ENV_USER,
    ENV_PASSWORD,
    ENV_NAME,
    ENV_SSLMODE,
];

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_USER: &str = "postgres";
const DEFAULT_DATABASE: &str = "codecheck";
const DEFAULT_APPLICATION_NAME: &str = "codecheck-api";

/// Canonical connection and pool settings
///
/// Immutable once built; the `with_*` methods consume and return a new value
/// and are meant for construction only.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    tls: TlsConfig,
    min_connections: usize,
    max_connections: usize,
    connect_timeout: Duration,
    statement_timeout: Duration,
    idle_in_transaction_timeout: Duration,
    application_name: String,
}

impl Default for DatabaseConfig {
    /// Defaults:
    /// - `postgres@localhost:5432/codecheck`, empty password, `sslmode=prefer`
    /// - pool: min 2, max 10
    /// - connect timeout 30s, statement timeout 30s, idle-in-transaction 60s
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            tls: TlsConfig::default(),
            min_connections: 2,
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_millis(30_000),
            idle_in_transaction_timeout: Duration::from_millis(60_000),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from a single connection URL, with default
    /// pool settings
    pub fn from_url(url: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_url(url)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from an arbitrary variable source
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_POOL_MIN) {
            config.min_connections = parse_var(ENV_POOL_MIN, &v)?;
        }
        if let Some(v) = get(ENV_POOL_MAX) {
            config.max_connections = parse_var(ENV_POOL_MAX, &v)?;
        }
        if let Some(v) = get(ENV_TIMEOUT) {
            config.connect_timeout = Duration::from_secs(parse_var(ENV_TIMEOUT, &v)?);
        }
        if let Some(v) = get(ENV_STATEMENT_TIMEOUT) {
            config.statement_timeout = Duration::from_millis(parse_var(ENV_STATEMENT_TIMEOUT, &v)?);
        }
        if let Some(v) = get(ENV_IDLE_TIMEOUT) {
            config.idle_in_transaction_timeout =
                Duration::from_millis(parse_var(ENV_IDLE_TIMEOUT, &v)?);
        }
        if let Some(v) = get(ENV_APPLICATION_NAME) {
            config.application_name = v;
        }
        config.tls.ca_cert = get(ENV_SSLROOTCERT).map(Into::into);
        config.tls.client_cert = get(ENV_SSLCERT).map(Into::into);
        config.tls.client_key = get(ENV_SSLKEY).map(Into::into);

        if let Some(url) = get(ENV_DATABASE_URL) {
            let ignored: Vec<&str> = DISCRETE_TARGET_VARS
                .iter()
                .copied()
                .filter(|key| get(key).is_some())
                .collect();
            if !ignored.is_empty() {
                tracing::warn!(
                    ignored = ?ignored,
                    "DATABASE_URL is set; ignoring discrete connection variables"
                );
            }
            config.apply_url(&url)?;
        } else {
            if let Some(v) = get(ENV_HOST) {
                config.host = v;
            }
            if let Some(v) = get(ENV_PORT) {
                config.port = parse_var(ENV_PORT, &v)?;
            }
            if let Some(v) = get(ENV_USER) {
                config.user = v;
            }
            if let Some(v) = lookup(ENV_PASSWORD) {
                config.password = v;
            }
            if let Some(v) = get(ENV_NAME) {
                config.database = v;
            }
            if let Some(v) = get(ENV_SSLMODE) {
                config.tls.mode = v.parse()?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Overwrite the connection target from a `postgres://` URL
    fn apply_url(&mut self, raw: &str) -> Result<()> {
        let url = Url::parse(raw.trim())
            .map_err(|e| DbError::Configuration(format!("Invalid DATABASE_URL format: {}", e)))?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DbError::Configuration(format!(
                "Invalid DATABASE_URL scheme '{}' (expected postgres or postgresql)",
                url.scheme()
            )));
        }

        self.host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        self.port = url.port().unwrap_or(DEFAULT_PORT);

        let user = decode(url.username())?;
        self.user = if user.is_empty() {
            DEFAULT_USER.to_string()
        } else {
            user
        };
        self.password = url.password().map(decode).transpose()?.unwrap_or_default();

        let database = decode(url.path().trim_start_matches('/'))?;
        self.database = if database.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            database
        };

        let mut sslmode = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "sslmode" => sslmode = Some(value.parse::<TlsMode>()?),
                "sslrootcert" => self.tls.ca_cert = Some(value.into_owned().into()),
                "sslcert" => self.tls.client_cert = Some(value.into_owned().into()),
                "sslkey" => self.tls.client_key = Some(value.into_owned().into()),
                "connect_timeout" => {
                    self.connect_timeout =
                        Duration::from_secs(parse_var("connect_timeout", &value)?);
                }
                "application_name" => self.application_name = value.into_owned(),
                other => tracing::debug!(parameter = %other, "ignoring DATABASE_URL parameter"),
            }
        }
        self.tls.mode = sslmode.unwrap_or(if self.host.contains("amazonaws.com") {
            TlsMode::Require
        } else {
            TlsMode::Prefer
        });

        tracing::info!(target_db = %self.target(), "parsed DATABASE_URL");
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(DbError::Configuration(
                "max pool size must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DbError::Configuration(format!(
                "min pool size ({}) cannot exceed max pool size ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(DbError::Configuration(
                "connect timeout must be greater than 0".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(DbError::Configuration("host cannot be empty".to_string()));
        }
        self.tls.validate()
    }

    /// Set host and port
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set user and password
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the database name
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the TLS configuration
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Set the min and max pool size
    pub fn with_pool_size(mut self, min: usize, max: usize) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the server-side statement timeout
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Set the server-side idle-in-transaction timeout
    pub fn with_idle_in_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.idle_in_transaction_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    pub fn ssl_mode(&self) -> TlsMode {
        self.tls.mode
    }

    pub fn min_connections(&self) -> usize {
        self.min_connections
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    pub fn idle_in_transaction_timeout(&self) -> Duration {
        self.idle_in_transaction_timeout
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// `user@host:port/database`, safe to log
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .field("idle_in_transaction_timeout", &self.idle_in_transaction_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        DbError::Configuration(format!("{} has an invalid value '{}'", key, raw.trim()))
    })
}

fn decode(raw: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| DbError::Configuration(format!("Invalid DATABASE_URL encoding: {}", e)))
}

#[cfg(test)]
mod tests;
