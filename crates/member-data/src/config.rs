//! Run configuration, read from the environment.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backoff::{Backoff, INITIAL_DELAY, MAX_ATTEMPTS, RetryPolicy};

pub const DEFAULT_NEON_BASE_URL: &str = "https://api.neoncrm.com";
pub const DEFAULT_DISCOURSE_BASE_URL: &str = "https://yo.asmbly.org";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Neon CRM credentials. Requests use HTTP basic auth `api_user:api_key`.
#[derive(Clone)]
pub struct NeonConfig {
    pub base_url: String,
    pub api_user: String,
    pub api_key: String,
}

impl fmt::Debug for NeonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeonConfig")
            .field("base_url", &self.base_url)
            .field("api_user", &self.api_user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Forum credentials, sent as `Api-Key` / `Api-Username` headers.
#[derive(Clone)]
pub struct DiscourseConfig {
    pub base_url: String,
    pub api_user: String,
    pub api_key: String,
}

impl fmt::Debug for DiscourseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscourseConfig")
            .field("base_url", &self.base_url)
            .field("api_user", &self.api_user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for one pull run.
#[derive(Debug, Clone)]
pub struct PullConfig {
    pub neon: NeonConfig,
    /// Forum read-time lookups are skipped when unset.
    pub discourse: Option<DiscourseConfig>,
    pub retry: RetryPolicy,
    /// Rows per CRM page.
    pub page_size: u32,
    /// Accounts aggregated at once. 1 processes accounts strictly in order.
    pub account_concurrency: usize,
    pub request_timeout: Duration,
}

impl PullConfig {
    pub const DEFAULT_PAGE_SIZE: u32 = 200;
    pub const DEFAULT_ACCOUNT_CONCURRENCY: usize = 1;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(neon: NeonConfig) -> Self {
        Self {
            neon,
            discourse: None,
            retry: RetryPolicy::default(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            account_concurrency: Self::DEFAULT_ACCOUNT_CONCURRENCY,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reads `NEON_API_USER`, `NEON_API_KEY` (required), `NEON_BASE_URL`,
    /// `DISCOURSE_API_KEY` + `DISCOURSE_API_USER` (both or neither),
    /// `DISCOURSE_BASE_URL`, `PULL_PAGE_SIZE`, `PULL_ACCOUNT_CONCURRENCY`,
    /// `PULL_MAX_ATTEMPTS`, `PULL_INITIAL_DELAY_MS` and
    /// `PULL_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let neon = NeonConfig {
            base_url: get("NEON_BASE_URL").unwrap_or_else(|| DEFAULT_NEON_BASE_URL.to_string()),
            api_user: require("NEON_API_USER")?,
            api_key: require("NEON_API_KEY")?,
        };

        let discourse = match (get("DISCOURSE_API_KEY"), get("DISCOURSE_API_USER")) {
            (Some(api_key), Some(api_user)) => Some(DiscourseConfig {
                base_url: get("DISCOURSE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DISCOURSE_BASE_URL.to_string()),
                api_user,
                api_key,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("DISCOURSE_API_USER")),
            (None, Some(_)) => return Err(ConfigError::Missing("DISCOURSE_API_KEY")),
        };

        let max_attempts = parse_or(&get, "PULL_MAX_ATTEMPTS", MAX_ATTEMPTS)?;
        let initial_delay_ms = parse_or(
            &get,
            "PULL_INITIAL_DELAY_MS",
            INITIAL_DELAY.as_millis() as u64,
        )?;
        let timeout_secs = parse_or(
            &get,
            "PULL_REQUEST_TIMEOUT_SECS",
            Self::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;

        Ok(Self {
            neon,
            discourse,
            retry: RetryPolicy::new(
                max_attempts,
                Backoff::new(Duration::from_millis(initial_delay_ms)),
            ),
            page_size: parse_or(&get, "PULL_PAGE_SIZE", Self::DEFAULT_PAGE_SIZE)?,
            account_concurrency: parse_or(
                &get,
                "PULL_ACCOUNT_CONCURRENCY",
                Self::DEFAULT_ACCOUNT_CONCURRENCY,
            )?,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Parses an optional positive number, falling back to `default` when unset.
fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = get(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid { var, value: raw }),
    }
}
