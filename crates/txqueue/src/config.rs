//! Queue connection configuration.
//!
//! [`QueueConfig`] is an immutable, already-validated value. It is produced
//! either by [`QueueConfigBuilder::build`] or by [`QueueConfig::load`], which
//! layers an optional file under environment variables. Validation happens
//! there and only there, so connectors can rely on every `QueueConfig` they
//! receive being well formed.

use crate::error::ConfigurationError;
use crate::message::QueueName;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Extension key used by [`QueueConfigBuilder::using_sid`]
pub const SID_EXTENSION: &str = "SID";

/// Network address of the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub host: String,
    pub port: u16,
}

/// Principal and secret used to authenticate against the backend
#[derive(Clone)]
pub struct Credentials {
    principal: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

/// Validated, immutable configuration for one queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    queue_name: QueueName,
    location: Option<Location>,
    credentials: Option<Credentials>,
    service: Option<String>,
    extensions: BTreeMap<String, String>,
}

impl QueueConfig {
    /// Start building a configuration for `queue_name`
    pub fn builder(queue_name: impl Into<String>) -> QueueConfigBuilder {
        QueueConfigBuilder::new(queue_name)
    }

    /// Load configuration from an optional file overlaid with environment
    /// variables named `{env_prefix}__NAME`, `{env_prefix}__HOST`, ... and
    /// `{env_prefix}__EXTENSIONS__<KEY>`.
    ///
    /// The file format is inferred from its extension.
    pub fn load(file: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: QueueSettings = builder
            .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
            .build()?
            .try_deserialize()?;

        Self::from_settings(settings)
    }

    /// Validate raw settings into a configuration
    pub fn from_settings(settings: QueueSettings) -> Result<Self, ConfigurationError> {
        let name = settings.name.ok_or_else(|| ConfigurationError::Missing {
            key: "name".to_string(),
        })?;

        let mut builder = QueueConfigBuilder::new(name).with_extensions(settings.extensions);

        match (settings.host, settings.port) {
            (Some(host), Some(port)) => builder = builder.located_at(host, port),
            (None, None) => {}
            (Some(_), None) => {
                return Err(ConfigurationError::Missing {
                    key: "port".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(ConfigurationError::Missing {
                    key: "host".to_string(),
                })
            }
        }

        if let Some(username) = settings.username {
            builder = builder.authenticated_with(username, settings.password.unwrap_or_default());
        }

        if let Some(service) = settings.service {
            builder = builder.using_service(service);
        }

        builder.build()
    }

    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    /// Look up a backend-specific extension value
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    /// Parse an extension value, falling back to `default` when absent
    pub fn parsed_extension<T>(&self, key: &str, default: T) -> Result<T, ConfigurationError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.extension(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigurationError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// Raw, unvalidated settings as read from files or the environment
#[derive(Debug, Default, Deserialize)]
pub struct QueueSettings {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub service: Option<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

/// Builder for [`QueueConfig`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct QueueConfigBuilder {
    queue_name: String,
    location: Option<Location>,
    credentials: Option<Credentials>,
    service: Option<String>,
    extensions: BTreeMap<String, String>,
}

impl QueueConfigBuilder {
    fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            location: None,
            credentials: None,
            service: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn located_at(mut self, host: impl Into<String>, port: u16) -> Self {
        self.location = Some(Location {
            host: host.into(),
            port,
        });
        self
    }

    pub fn authenticated_with(
        mut self,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(principal, secret));
        self
    }

    /// Logical database or service the queue lives in
    pub fn using_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Convenience for the `SID` extension
    pub fn using_sid(self, sid: impl Into<String>) -> Self {
        self.with_extension(SID_EXTENSION, sid)
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    /// Merge extensions; later values replace earlier ones with the same key
    pub fn with_extensions<I, K, V>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extensions
            .extend(extensions.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<QueueConfig, ConfigurationError> {
        let queue_name = QueueName::new(self.queue_name)?;

        if let Some(location) = &self.location {
            if location.host.trim().is_empty() {
                return Err(ConfigurationError::Invalid {
                    key: "host".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        if let Some(credentials) = &self.credentials {
            if credentials.principal().is_empty() {
                return Err(ConfigurationError::Invalid {
                    key: "username".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }

        if self.extensions.keys().any(|key| key.trim().is_empty()) {
            return Err(ConfigurationError::Invalid {
                key: "extensions".to_string(),
                message: "extension keys must not be empty".to_string(),
            });
        }

        Ok(QueueConfig {
            queue_name,
            location: self.location,
            credentials: self.credentials,
            service: self.service.filter(|s| !s.is_empty()),
            extensions: self.extensions,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
