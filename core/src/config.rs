//! Client configuration, endpoint parsing and credentials.
//!
//! # Design
//! `ClientConfig` is plain serde data so it can come from a TOML file or be
//! built in code. Defaults match the service's recommended client settings:
//! 200 pooled connections, 35 second socket and connect timeouts.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service endpoint, e.g. `http://1234.mq.cn-hangzhou.aliyuncs.com`.
    pub endpoint: String,
    /// Maximum number of pooled connections.
    pub pool_size: usize,
    /// Socket timeout. Must exceed any long-poll wait the caller requests.
    pub timeout_secs: u64,
    /// TCP connect timeout, also the longest wait for a pooled connection.
    pub connect_timeout_secs: u64,
    /// Idle pooled connections older than this are dropped instead of reused.
    pub idle_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            pool_size: 200,
            timeout_secs: 35,
            connect_timeout_secs: 35,
            idle_timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        Endpoint::parse(&self.endpoint)?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// A validated service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    host: String,
}

impl Endpoint {
    /// Parse an absolute `http`/`https` URL. Trailing whitespace and slashes
    /// are dropped.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let base = raw.trim_end().trim_end_matches('/');
        let url = Url::parse(base).map_err(|e| ConfigError::Invalid(format!("endpoint {raw:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "endpoint {raw:?}: unsupported scheme {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::Invalid(format!("endpoint {raw:?}: missing host")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            base: base.to_string(),
            host,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Value for the `Host` header.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url_for(&self, canonical_resource: &str) -> String {
        format!("{}{}", self.base, canonical_resource)
    }
}

/// Access credentials. `security_token` is set for temporary (STS)
/// credentials.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: String,
    pub security_token: Option<String>,
}

impl Credentials {
    pub fn new(access_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: access_key.into(),
            security_token: None,
        }
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .field("security_token", &self.security_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
