//! Configuration file handling.
//!
//! This module provides loading and saving of crda-matcher configuration
//! from a TOML file, and turns a configuration into a ready [`CrdaMatcher`].
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/crda-matcher/config.toml`
//! - macOS: `~/Library/Application Support/crda-matcher/config.toml`
//! - Windows: `%APPDATA%\crda-matcher\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! url = "https://gw.api.openshift.io"
//! api_key = "0123456789abcdef"
//! ecosystem = "pypi"
//! concurrency = 10
//! request_timeout_secs = 10
//!
//! [repository]
//! name = "pypi"
//! uri = "https://pypi.org/simple"
//! ```

use anyhow::Result;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::matcher::{
    ComponentAnalysisClient, CrdaMatcher, DEFAULT_CONCURRENCY, DEFAULT_ECOSYSTEM, DEFAULT_TIMEOUT,
    DEFAULT_URL,
};
use crate::model::RepositoryDescriptor;

/// Matcher configuration.
///
/// Every field has a default, so a partial file (or no file) is valid.
///
/// # Example
///
/// ```
/// use crda_matcher::Config;
///
/// let config = Config::from_toml_str("api_key = \"secret\"\nconcurrency = 4").unwrap();
///
/// assert_eq!(config.concurrency, 4);
/// assert_eq!(config.ecosystem, "pypi");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the component analyses service.
    ///
    /// Default: `https://gw.api.openshift.io`
    pub url: String,

    /// Access key sent as the `user_key` query parameter.
    ///
    /// Default: empty (no key is sent)
    pub api_key: String,

    /// Ecosystem whose records the matcher accepts.
    ///
    /// Default: "pypi"
    pub ecosystem: String,

    /// Maximum number of requests in flight per batch.
    ///
    /// Default: 10
    pub concurrency: usize,

    /// Deadline for a single request, in seconds.
    ///
    /// Default: 10
    pub request_timeout_secs: u64,

    /// Canonical source stamped onto every reported vulnerability.
    ///
    /// Default: none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: String::new(),
            ecosystem: DEFAULT_ECOSYSTEM.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            repository: None,
        }
    }
}

impl Config {
    /// Loads configuration from the default config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        Ok(Self::load_from(&path)?)
    }

    /// Loads configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Saves the configuration to the default config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// ```
    /// use crda_matcher::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("crda-matcher/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crda-matcher")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Returns a copy safe to print: a non-empty access key is masked.
    pub fn redacted(&self) -> Self {
        let api_key = if self.api_key.is_empty() {
            String::new()
        } else {
            "********".to_string()
        };
        Self {
            api_key,
            ..self.clone()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks the configuration and returns the parsed service URL.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason,
        };

        let url = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(url)
    }

    /// Builds a matcher from this configuration.
    ///
    /// `client` is used for every request when given; otherwise a client is
    /// built with the configured timeout.
    pub fn build_matcher(
        &self,
        client: Option<reqwest::Client>,
    ) -> Result<CrdaMatcher, ConfigError> {
        let url = self.validate()?;
        let client = match client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.request_timeout())
                .build()?,
        };

        let query = ComponentAnalysisClient::new(url)
            .with_client(client)
            .with_api_key(self.api_key.clone())
            .with_timeout(self.request_timeout())
            .with_repository(self.repository.clone());

        Ok(CrdaMatcher::new(query)
            .with_ecosystem(&self.ecosystem)
            .with_concurrency(self.concurrency))
    }
}
