//! Connection configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via IFSAP_CONFIG)
//! 3. Environment variables

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Client id sent in every request header.
pub const DEFAULT_CLIENT_ID: &str = "IFS.Node.AP";
/// Locale used when none is configured.
pub const DEFAULT_LOCALE: &str = "en-US";
/// Default server-side timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Interface and operation of the PL/SQL gateway.
const INVOKE_OPERATION: &str = "AccessPlsql/Invoke";

/// Gateway generation; selects the URL layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayVersion {
    Ifs8,
    Ifs9,
    #[default]
    Ifs10,
}

impl GatewayVersion {
    /// Path of the PL/SQL gateway below the endpoint root.
    pub fn gateway_path(self) -> &'static str {
        match self {
            GatewayVersion::Ifs10 => "main/compatibility/plsqlgateway",
            GatewayVersion::Ifs8 | GatewayVersion::Ifs9 => "fndext/clientgateway",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayVersion::Ifs8 => "IFS_8",
            GatewayVersion::Ifs9 => "IFS_9",
            GatewayVersion::Ifs10 => "IFS_10",
        }
    }
}

impl fmt::Display for GatewayVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_uppercase();
        match value.as_str() {
            "10" | "IFS10" | "IFS_10" => Ok(GatewayVersion::Ifs10),
            "9" | "IFS9" | "IFS_9" => Ok(GatewayVersion::Ifs9),
            "8" | "IFS8" | "IFS_8" => Ok(GatewayVersion::Ifs8),
            _ => Err(ConfigError::ValidationError(format!(
                "Wrong IFS version {}. Example value: IFS_10.",
                value
            ))),
        }
    }
}

/// TLS settings for `https` endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Server name for SNI (defaults to the endpoint host).
    pub server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(ConfigError::ValidationError(
                "client certificate and key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Gateway root, normalized to `scheme://host[:port]/`.
    #[serde(deserialize_with = "endpoint_serde::deserialize")]
    pub endpoint: String,
    /// Gateway generation.
    #[serde(with = "version_serde")]
    pub version: GatewayVersion,
    /// Login id.
    pub user: String,
    /// Login password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Locale; empty means [`DEFAULT_LOCALE`].
    pub locale: String,
    /// Identity to run as; empty means the login user.
    pub run_as: String,
    /// Client id reported in the request header.
    pub client_id: String,
    /// Server-side timeout in milliseconds (0 = none).
    pub timeout_ms: u64,
    /// Request the gateway debug block.
    pub debug: bool,
    /// Commit or roll back after every standalone PL/SQL call.
    pub auto_commit: bool,
    /// TLS settings.
    pub tls: TlsClientConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            version: GatewayVersion::default(),
            user: String::new(),
            password: String::new(),
            locale: String::new(),
            run_as: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            debug: false,
            auto_commit: true,
            tls: TlsClientConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl AsRef<str>) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint.as_ref()),
            ..Default::default()
        }
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("IFSAP_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ConnectionConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = std::env::var("IFSAP_ENDPOINT") {
            self.endpoint = normalize_endpoint(&endpoint);
        }
        if let Ok(version) = std::env::var("IFSAP_GATEWAY_VERSION") {
            self.version = version.parse()?;
        }
        if let Ok(user) = std::env::var("IFSAP_USER") {
            self.user = user;
        }
        if let Ok(password) = std::env::var("IFSAP_PASSWORD") {
            self.password = password;
        }
        if let Ok(locale) = std::env::var("IFSAP_LOCALE") {
            self.locale = locale;
        }
        if let Ok(run_as) = std::env::var("IFSAP_RUN_AS") {
            self.run_as = run_as;
        }
        if let Ok(client_id) = std::env::var("IFSAP_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Ok(timeout) = std::env::var("IFSAP_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.timeout_ms = ms;
            }
        }
        if let Ok(debug) = std::env::var("IFSAP_DEBUG") {
            self.debug = debug == "1" || debug.to_lowercase() == "true";
        }
        if let Ok(auto_commit) = std::env::var("IFSAP_AUTO_COMMIT") {
            self.auto_commit = auto_commit == "1" || auto_commit.to_lowercase() == "true";
        }
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::ValidationError("endpoint not set".to_string()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "unsupported endpoint scheme: {}",
                self.endpoint
            )));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::ValidationError("client_id not set".to_string()));
        }
        self.tls.validate()
    }

    pub fn with_version(mut self, version: GatewayVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_run_as(mut self, run_as: impl Into<String>) -> Self {
        self.run_as = run_as.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = tls_config;
        self
    }

    /// Full URL of the invoke operation.
    pub fn invoke_url(&self) -> String {
        format!(
            "{}{}/{}",
            normalize_endpoint(&self.endpoint),
            self.version.gateway_path(),
            INVOKE_OPERATION
        )
    }

    /// `Authorization` header value for the configured credentials.
    pub fn authorization(&self) -> String {
        basic_authorization(&self.user, &self.password)
    }

    /// Locale sent to the gateway.
    pub fn effective_locale(&self) -> &str {
        if self.locale.is_empty() {
            DEFAULT_LOCALE
        } else {
            &self.locale
        }
    }

    /// Server-side timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Builds a `Basic` authorization header value.
pub fn basic_authorization(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

/// Reduces an endpoint to `scheme://host[:port]/`.
///
/// A missing scheme defaults to `http://`; any path is dropped.
pub fn normalize_endpoint(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    let mut endpoint = if value.contains("//") {
        value.to_string()
    } else {
        format!("http://{}", value)
    };
    let host_start = endpoint.find("//").map_or(0, |i| i + 2);
    match endpoint[host_start..].find('/') {
        Some(slash) => endpoint.truncate(host_start + slash + 1),
        None => endpoint.push('/'),
    }
    endpoint
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Gateway version as a string in YAML.
mod version_serde {
    use super::GatewayVersion;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &GatewayVersion, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(version.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<GatewayVersion, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod endpoint_serde {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(super::normalize_endpoint(&s))
    }
}
