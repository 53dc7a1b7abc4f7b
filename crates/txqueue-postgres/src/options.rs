//! Translation of a [`QueueConfig`] into sqlx connection settings.

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::time::Duration;
use txqueue::config::SID_EXTENSION;
use txqueue::{ConfigurationError, QueueConfig};

/// Extension: connections per capability pool
pub const MAX_CONNECTIONS: &str = "max_connections";

/// Extension: how long the server-side dequeue sleeps between checks
pub const POLL_INTERVAL_MS: &str = "poll_interval_ms";

/// Extension: libpq-style SSL mode
pub const SSL_MODE: &str = "sslmode";

/// Extension: application name reported to the server
pub const APPLICATION_NAME: &str = "application_name";

/// Extension: how often the server checks that a client is still
/// connected while a statement runs. `0` leaves the server setting alone,
/// which servers before PostgreSQL 14 require.
pub const CONNECTION_CHECK_INTERVAL: &str = "client_connection_check_interval";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECTION_CHECK_INTERVAL: &str = "1000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Everything the connector derives from a [`QueueConfig`]
#[derive(Debug, Clone)]
pub struct PgSettings {
    pub connect_options: PgConnectOptions,
    pub max_connections: u32,
    pub poll_interval: Duration,
}

impl PgSettings {
    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigurationError> {
        let max_connections = config.parsed_extension(MAX_CONNECTIONS, DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(invalid(MAX_CONNECTIONS, "must be at least 1"));
        }

        let poll_interval_ms = config.parsed_extension(POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS)?;
        if poll_interval_ms == 0 {
            return Err(invalid(POLL_INTERVAL_MS, "must be at least 1"));
        }

        Ok(Self {
            connect_options: connect_options(config)?,
            max_connections,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }
}

/// Build connection options.
///
/// Unset values fall back to the usual `PG*` environment variables. The
/// service names the database, with the `SID` extension as a fallback;
/// extensions the connector does not consume become server runtime
/// parameters.
pub fn connect_options(config: &QueueConfig) -> Result<PgConnectOptions, ConfigurationError> {
    let mut options = PgConnectOptions::new();

    if let Some(location) = config.location() {
        options = options.host(&location.host).port(location.port);
    }

    if let Some(credentials) = config.credentials() {
        options = options
            .username(credentials.principal())
            .password(credentials.secret());
    }

    let database = config.service().or_else(|| sid(config));
    if let Some(database) = database {
        options = options.database(database);
    }

    if let Some(mode) = config.extension(SSL_MODE) {
        let mode: PgSslMode = mode
            .parse()
            .map_err(|e: sqlx::Error| invalid(SSL_MODE, &e.to_string()))?;
        options = options.ssl_mode(mode);
    }

    if let Some(name) = config.extension(APPLICATION_NAME) {
        options = options.application_name(name);
    }

    let mut runtime: Vec<(&str, &str)> = config
        .extensions()
        .iter()
        .filter(|(key, _)| !is_consumed(key))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    // A blocked dequeue only notices a vanished client through this check
    let check_interval = config
        .extension(CONNECTION_CHECK_INTERVAL)
        .unwrap_or(DEFAULT_CONNECTION_CHECK_INTERVAL);
    if check_interval.trim() != "0" {
        runtime.push((CONNECTION_CHECK_INTERVAL, check_interval));
    }
    if !runtime.is_empty() {
        options = options.options(runtime);
    }

    Ok(options)
}

// Environment variables arrive lower-cased
fn sid(config: &QueueConfig) -> Option<&str> {
    config
        .extension(SID_EXTENSION)
        .or_else(|| config.extension(&SID_EXTENSION.to_ascii_lowercase()))
}

fn is_consumed(key: &str) -> bool {
    [
        MAX_CONNECTIONS,
        POLL_INTERVAL_MS,
        SSL_MODE,
        APPLICATION_NAME,
        CONNECTION_CHECK_INTERVAL,
        SID_EXTENSION,
    ]
    .iter()
        .any(|consumed| consumed.eq_ignore_ascii_case(key))
}

fn invalid(key: &str, message: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
