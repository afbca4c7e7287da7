//! Runtime configuration
//!
//! A single [`TaggerConfig`] is built at startup and handed to every
//! component by reference. Tuning knobs come from an optional TOML file;
//! credentials come from the environment, then from a `.env` file, then from
//! the TOML file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the store domain
pub const STORE_ENV: &str = "SHOPIFY_STORE_NAME";

/// Environment variable holding the admin API access token
pub const TOKEN_ENV: &str = "SHOPIFY_ACCESS_TOKEN";

/// Dotenv file read from the working directory
pub const DOTENV_FILE: &str = ".env";

/// Largest page the store accepts
pub const MAX_PAGE_SIZE: usize = 250;

/// Retry policy for a single GraphQL call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Rate-limit hint used when `Retry-After` is absent
    pub default_retry_after_secs: u64,
    /// Base delay for retrying network and decode failures
    pub transient_backoff_base_ms: u64,
}

impl RetryPolicy {
    /// With max attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// With transient backoff base
    #[inline]
    #[must_use]
    pub fn with_transient_base(mut self, base: Duration) -> Self {
        self.transient_backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after_secs: 5,
            transient_backoff_base_ms: 1000,
        }
    }
}

/// Tagger configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct TaggerConfig {
    /// Store domain, e.g. `example.myshopify.com`
    pub store: String,
    /// Admin API access token
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Admin API version segment of the endpoint URL
    pub api_version: String,
    /// Records requested per page
    pub page_size: usize,
    /// Worker pool width
    pub concurrency: usize,
    /// Per-call retry policy
    pub retry: RetryPolicy,
    /// Timeout for one HTTP request
    pub request_timeout_secs: u64,
    /// Directory for `general.log` and `error.log`
    pub log_dir: PathBuf,
    /// Directory for result files (defaults to `log_dir`)
    pub output_dir: Option<PathBuf>,
}

impl std::fmt::Debug for TaggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggerConfig")
            .field("store", &self.store)
            .field("access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("page_size", &self.page_size)
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("log_dir", &self.log_dir)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

/// On-disk form: every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    store: Option<String>,
    access_token: Option<String>,
    api_version: Option<String>,
    page_size: Option<usize>,
    concurrency: Option<usize>,
    retry: Option<RetryPolicy>,
    request_timeout_secs: Option<u64>,
    log_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

impl TaggerConfig {
    /// Create configuration with defaults for everything but credentials
    pub fn new(store: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            access_token: access_token.into(),
            api_version: "2024-01".to_string(),
            page_size: 50,
            concurrency: 5,
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
            log_dir: PathBuf::from("logs"),
            output_dir: None,
        }
    }

    /// Load from an optional TOML file, then apply environment credentials
    ///
    /// Variables missing from the process environment are looked up in
    /// `.env` in the working directory, if it exists.
    ///
    /// # Errors
    /// - `ConfigError::Io` / `ConfigError::Parse` for an unreadable file
    /// - `ConfigError::Dotenv` for an unreadable `.env`
    /// - `ConfigError::Missing` when the store or token is not set anywhere
    /// - `ConfigError::Invalid` when a numeric setting is out of range
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, Path::new(DOTENV_FILE), |key| std::env::var(key).ok())
    }

    /// Like [`TaggerConfig::load`], with an explicit dotenv path and
    /// environment lookup; `env` wins over the dotenv file
    ///
    /// # Errors
    /// As [`TaggerConfig::load`]
    pub fn load_from(
        path: Option<&Path>,
        dotenv: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let dotenv = read_dotenv(dotenv)?;
        Self::load_with_env(path, |key| env(key).or_else(|| dotenv.get(key).cloned()))
    }

    /// Like [`TaggerConfig::load`], with an explicit environment lookup and
    /// no dotenv file
    ///
    /// # Errors
    /// As [`TaggerConfig::load`], except `ConfigError::Dotenv`
    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };

        let store = env(STORE_ENV)
            .filter(|s| !s.trim().is_empty())
            .or(file.store)
            .ok_or(ConfigError::Missing(STORE_ENV))?;
        let token = env(TOKEN_ENV)
            .filter(|s| !s.trim().is_empty())
            .or(file.access_token)
            .ok_or(ConfigError::Missing(TOKEN_ENV))?;

        let mut config = Self::new(store.trim(), token.trim());
        if let Some(v) = file.api_version {
            config.api_version = v;
        }
        if let Some(v) = file.page_size {
            config.page_size = v;
        }
        if let Some(v) = file.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = file.retry {
            config.retry = v;
        }
        if let Some(v) = file.request_timeout_secs {
            config.request_timeout_secs = v;
        }
        if let Some(v) = file.log_dir {
            config.log_dir = v;
        }
        config.output_dir = file.output_dir;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending key
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.is_empty() {
            return Err(ConfigError::Missing(STORE_ENV));
        }
        if self.access_token.is_empty() {
            return Err(ConfigError::Missing(TOKEN_ENV));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::invalid(
                "page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// With worker pool width
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// With page size
    #[inline]
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With log directory
    #[inline]
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// With output directory
    #[inline]
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// GraphQL endpoint URL for the configured store
    #[must_use]
    pub fn graphql_endpoint(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.store, self.api_version
        )
    }

    /// Per-request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Directory result files are written to
    #[inline]
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.log_dir)
    }
}

/// Read `KEY=VALUE` pairs from a dotenv file; a missing file yields none
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let dotenv_error = |source| ConfigError::Dotenv {
        path: path.to_path_buf(),
        source,
    };
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.map(|entry| entry.map_err(dotenv_error)).collect(),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(dotenv_error(e)),
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
