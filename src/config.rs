//! Configuration management for tenantauth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::auth::callback::{DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT};
use crate::auth::token_cache::TokenCache;
use crate::error::{Result, TenantAuthError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the platform config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Main configuration structure for tenantauth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tenant (project) identifier; required for every command that talks
    /// to the identity provider
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Identity provider base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Loopback port for the OAuth redirect
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// How long to wait for the browser redirect (seconds)
    #[serde(default = "default_callback_timeout_seconds")]
    pub callback_timeout_seconds: u64,

    /// Directory holding cached sessions; the platform config directory
    /// when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Timeout for individual HTTP requests (seconds)
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Service access key; when set, `token` exchanges it instead of
    /// using a cached interactive session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.descope.com".to_string()
}

fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_callback_timeout_seconds() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT.as_secs()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Load configuration from file, then environment, then CLI flags
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit config file path, or `None` for the default location
    /// * `cli` - Parsed command line, applied last
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Configuration`] if the file exists but
    /// cannot be read or parsed.
    pub fn load(path: Option<&Path>, cli: &crate::cli::Cli) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                tracing::warn!("Config file not found at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// `<platform config dir>/config.yaml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "tenantauth", "tenantauth")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TenantAuthError::Configuration(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            TenantAuthError::Configuration(format!("Failed to parse config: {}", e)).into()
        })
    }

    fn apply_env_vars(&mut self) {
        if let Ok(tenant_id) = std::env::var("TENANTAUTH_TENANT_ID") {
            self.tenant_id = Some(tenant_id);
        }

        if let Ok(base_url) = std::env::var("TENANTAUTH_BASE_URL") {
            self.base_url = base_url;
        }

        if let Ok(port) = std::env::var("TENANTAUTH_CALLBACK_PORT") {
            if let Ok(value) = port.parse() {
                self.callback_port = value;
            } else {
                tracing::warn!("Invalid TENANTAUTH_CALLBACK_PORT: {}", port);
            }
        }

        if let Ok(timeout) = std::env::var("TENANTAUTH_CALLBACK_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.callback_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid TENANTAUTH_CALLBACK_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(cache_dir) = std::env::var("TENANTAUTH_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(cache_dir));
        }

        if let Ok(access_key) = std::env::var("TENANTAUTH_ACCESS_KEY") {
            self.access_key = Some(access_key);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(tenant) = &cli.tenant {
            self.tenant_id = Some(tenant.clone());
        }
        if let Some(base_url) = &cli.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(cache_dir) = &cli.cache_dir {
            self.cache_dir = Some(cache_dir.clone());
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Configuration`] if the tenant id is
    /// missing, the base URL is not an http(s) URL, or a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        self.tenant()?;

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            TenantAuthError::Configuration(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TenantAuthError::Configuration(format!(
                "base_url must use http or https: {}",
                self.base_url
            ))
            .into());
        }

        if self.callback_timeout_seconds == 0 {
            return Err(TenantAuthError::Configuration(
                "callback_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.request_timeout_seconds == 0 {
            return Err(TenantAuthError::Configuration(
                "request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// The configured tenant id.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::Configuration`] if none is set.
    pub fn tenant(&self) -> Result<&str> {
        match self.tenant_id.as_deref() {
            Some(tenant) if !tenant.trim().is_empty() => Ok(tenant),
            _ => Err(TenantAuthError::Configuration(
                "No tenant configured. Pass --tenant or set TENANTAUTH_TENANT_ID".to_string(),
            )
            .into()),
        }
    }

    /// The configured access key, if a non-blank one is set.
    pub fn access_key(&self) -> Option<&str> {
        self.access_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// A copy safe to print: the access key, if any, is masked.
    pub fn redacted(&self) -> Self {
        Self {
            access_key: self.access_key().map(|_| "***configured***".to_string()),
            ..self.clone()
        }
    }

    /// Callback wait as a [`Duration`].
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_seconds)
    }

    /// Per-request HTTP timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// The token cache this configuration points at.
    pub fn token_cache(&self) -> Result<TokenCache> {
        match &self.cache_dir {
            Some(dir) => Ok(TokenCache::new(dir)),
            None => TokenCache::default_location(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant_id: None,
            base_url: default_base_url(),
            callback_port: default_callback_port(),
            callback_timeout_seconds: default_callback_timeout_seconds(),
            cache_dir: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            access_key: None,
        }
    }
}
