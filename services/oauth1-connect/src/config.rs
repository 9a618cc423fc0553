//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The consumer secret is loaded from the OAUTH1_CONSUMER_SECRET env var or
//! consumer_secret_file, never stored in the TOML directly to avoid leaking
//! secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use oauth1_auth::ClientIdentity;
use oauth1_client::ConnectionConfig;
use serde::Deserialize;

const SECRET_ENV: &str = "OAUTH1_CONSUMER_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Registered application credentials
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub consumer_key: String,
    #[serde(skip)]
    pub consumer_secret: Option<Secret<String>>,
    /// Path to a file containing the consumer secret (alternative to OAUTH1_CONSUMER_SECRET)
    #[serde(default)]
    pub consumer_secret_file: Option<PathBuf>,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub callback_url: String,
    #[serde(default = "default_discovery_ttl")]
    pub discovery_ttl_secs: u64,
}

/// Outbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Credential file location
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_discovery_ttl() -> u64 {
    oauth1_auth::constants::DISCOVERY_TTL.as_secs()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("oauth1-credentials.json")
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    let url = url::Url::parse(value)
        .map_err(|e| common::Error::Config(format!("{field} is not a valid URL ({e}): {value}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Consumer secret resolution order:
    /// 1. OAUTH1_CONSUMER_SECRET env var
    /// 2. consumer_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.client.consumer_key.trim().is_empty() {
            return Err(common::Error::Config("consumer_key must not be empty".into()));
        }
        require_http_url("base_url", &config.api.base_url)?;
        require_http_url("callback_url", &config.api.callback_url)?;

        if config.http.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.api.discovery_ttl_secs == 0 {
            return Err(common::Error::Config(
                "discovery_ttl_secs must be greater than 0".into(),
            ));
        }

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.client.consumer_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.client.consumer_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read consumer_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.client.consumer_secret = Some(Secret::new(secret));
            }
        }

        if config.client.consumer_secret.as_ref().is_none_or(Secret::is_empty) {
            return Err(common::Error::Config(format!(
                "consumer secret missing: set {SECRET_ENV} or consumer_secret_file"
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth1-connect.toml")
    }

    /// Settings for the lifecycle controller.
    pub fn connection_config(&self) -> common::Result<ConnectionConfig> {
        let secret = self
            .client
            .consumer_secret
            .clone()
            .ok_or_else(|| common::Error::Config("consumer secret not loaded".into()))?;
        let mut connection = ConnectionConfig::new(
            ClientIdentity::new(self.client.consumer_key.clone(), secret),
            self.api.base_url.clone(),
            self.api.callback_url.clone(),
        );
        connection.discovery_ttl = Duration::from_secs(self.api.discovery_ttl_secs);
        Ok(connection)
    }
}
