//! Wrapper configuration and construction-time validation.

use std::path::PathBuf;
use std::time::Duration;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 443;

/// Default per-socket-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default ceiling on attempts for transport failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors raised while building a wrapper from its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Host is empty once any scheme prefix has been removed
    EmptyHost,
    /// Port 0 cannot be connected to
    InvalidPort,
    /// At least one attempt is required
    ZeroAttempts,
    /// A client key was given without the certificate it belongs to
    KeyWithoutCertificate(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyHost => write!(f, "Host must not be empty"),
            ConfigError::InvalidPort => write!(f, "Port must be between 1 and 65535"),
            ConfigError::ZeroAttempts => write!(f, "max_attempts must be at least 1"),
            ConfigError::KeyWithoutCertificate(key) => {
                write!(
                    f,
                    "Client key {} was given without a client certificate",
                    key.display()
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Removes a leading `https://` or `http://` from `host`.
pub fn strip_scheme(host: &str) -> &str {
    host.strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host)
}

/// Scheme, host and port joined into a URL prefix, e.g. `https://example.com:443`.
pub fn base_url(https: bool, host: &str, port: u16) -> String {
    let scheme = if https { "https" } else { "http" };
    format!("{}://{}:{}", scheme, host, port)
}

/// Everything needed to build a [`ConnectionWrapper`](crate::http::ConnectionWrapper).
///
/// Client certificate paths must already be resolved by whoever builds the
/// config; nothing here reads the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperConfig {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub timeout: Duration,
    pub keep_open: bool,
    pub max_attempts: u32,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl WrapperConfig {
    /// Creates a config for `host` with every other option at its default.
    /// `host` may be a URL; its scheme prefix is dropped.
    pub fn new(host: impl AsRef<str>) -> Self {
        Self {
            host: strip_scheme(host.as_ref()).to_string(),
            port: DEFAULT_PORT,
            https: true,
            timeout: DEFAULT_TIMEOUT,
            keep_open: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cert_file: None,
            key_file: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn keep_open(mut self, keep_open: bool) -> Self {
        self.keep_open = keep_open;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn cert_file(mut self, cert_file: Option<PathBuf>) -> Self {
        self.cert_file = cert_file;
        self
    }

    pub fn key_file(mut self, key_file: Option<PathBuf>) -> Self {
        self.key_file = key_file;
        self
    }

    /// Checks the invariants the wrapper relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        // A certificate file alone may hold both the certificate and its key.
        if let (None, Some(key)) = (&self.cert_file, &self.key_file) {
            return Err(ConfigError::KeyWithoutCertificate(key.clone()));
        }
        Ok(())
    }
}
