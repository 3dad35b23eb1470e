//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Resource;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetching behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Statistics run behavior
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Account profile refresh behavior
    #[serde(default)]
    pub users: UsersConfig,

    /// Rating calculator knobs
    #[serde(default)]
    pub rating: RatingConfig,

    /// Seed resource definitions, upserted into the store on startup
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.n_attempts == 0 {
            return Err(AppError::validation("fetcher.n_attempts must be > 0"));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(AppError::validation("scheduler.max_concurrent must be > 0"));
        }
        if self.users.workers == 0 {
            return Err(AppError::validation("users.workers must be > 0"));
        }
        if self.users.rate_limit == 0 || self.users.rate_period_secs == 0 {
            return Err(AppError::validation(
                "users.rate_limit and users.rate_period_secs must be > 0",
            ));
        }
        if self.rating.high <= self.rating.low {
            return Err(AppError::validation("rating.high must exceed rating.low"));
        }
        if self.rating.iterations == 0 {
            return Err(AppError::validation("rating.iterations must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.rating.partial_multiplier) {
            return Err(AppError::validation(
                "rating.partial_multiplier must be within [0, 1]",
            ));
        }

        let mut hosts: Vec<&str> = Vec::new();
        for resource in &self.resources {
            if resource.host.trim().is_empty() {
                return Err(AppError::validation("resource host is empty"));
            }
            if resource.module.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "resource {} has no module",
                    resource.host
                )));
            }
            if hosts.contains(&resource.host.as_str()) {
                return Err(AppError::validation(format!(
                    "resource {} defined twice",
                    resource.host
                )));
            }
            if resource.timing.min_delay_after_end_secs > resource.timing.max_delay_after_end_secs {
                return Err(AppError::validation(format!(
                    "resource {}: min_delay_after_end exceeds max_delay_after_end",
                    resource.host
                )));
            }
            hosts.push(&resource.host);
        }
        Ok(())
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per request before giving up
    #[serde(default = "defaults::n_attempts")]
    pub n_attempts: u32,

    /// Base retry delay in milliseconds, scaled by attempt number
    #[serde(default = "defaults::attempt_delay")]
    pub attempt_delay_ms: u64,

    /// Response cache directory; disabled when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in seconds
    #[serde(default = "defaults::cache_timeout")]
    pub cache_timeout_secs: u64,

    /// Cookie jar file persisted across runs
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,

    /// Proxy list with scores; proxies are disabled when unset
    #[serde(default)]
    pub proxy_file: Option<PathBuf>,

    /// Maximum proxy uses per run
    #[serde(default = "defaults::proxy_limit")]
    pub proxy_limit: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            n_attempts: defaults::n_attempts(),
            attempt_delay_ms: defaults::attempt_delay(),
            cache_dir: None,
            cache_timeout_secs: defaults::cache_timeout(),
            cookie_file: None,
            proxy_file: None,
            proxy_limit: defaults::proxy_limit(),
        }
    }
}

/// Statistics run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Contests of one resource processed concurrently
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Re-check window after end while results are frozen
    #[serde(default = "defaults::hidden_results_delay")]
    pub hidden_results_delay_secs: i64,

    /// Upper bound of the error backoff
    #[serde(default = "defaults::max_error_delay")]
    pub max_error_delay_secs: i64,

    /// Contests per run when no limit is given
    #[serde(default)]
    pub default_limit: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            hidden_results_delay_secs: defaults::hidden_results_delay(),
            max_error_delay_secs: defaults::max_error_delay(),
            default_limit: None,
        }
    }
}

/// Account profile refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// Concurrent profile fetches
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Calls allowed per rate period
    #[serde(default = "defaults::rate_limit")]
    pub rate_limit: u32,

    #[serde(default = "defaults::rate_period")]
    pub rate_period_secs: u64,

    /// Failure budget; halved on failure, the batch aborts at zero
    #[serde(default = "defaults::balance")]
    pub balance: usize,

    /// Profiles older than this are refreshed
    #[serde(default = "defaults::account_info_refresh")]
    pub account_info_refresh_secs: i64,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            rate_limit: defaults::rate_limit(),
            rate_period_secs: defaults::rate_period(),
            balance: defaults::balance(),
            account_info_refresh_secs: defaults::account_info_refresh(),
        }
    }
}

/// Rating calculator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Lower bound of the bisection range
    #[serde(default)]
    pub low: f64,

    /// Upper bound of the bisection range
    #[serde(default = "defaults::high")]
    pub high: f64,

    #[serde(default = "defaults::iterations")]
    pub iterations: u32,

    /// Credit multiplier applied to partial solves
    #[serde(default = "defaults::partial_multiplier")]
    pub partial_multiplier: f64,

    /// Weight of contestants without reported rating changes
    #[serde(default = "defaults::unrated_weight")]
    pub unrated_weight: f64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            low: 0.0,
            high: defaults::high(),
            iterations: defaults::iterations(),
            partial_multiplier: defaults::partial_multiplier(),
            unrated_weight: defaults::unrated_weight(),
        }
    }
}

mod defaults {
    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; standings/1.0)".into()
    }
    pub fn timeout() -> u64 {
        7
    }
    pub fn n_attempts() -> u32 {
        3
    }
    pub fn attempt_delay() -> u64 {
        1000
    }
    pub fn cache_timeout() -> u64 {
        3600
    }
    pub fn proxy_limit() -> usize {
        1000
    }

    // Scheduler defaults
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn hidden_results_delay() -> i64 {
        5 * 60
    }
    pub fn max_error_delay() -> i64 {
        24 * 3600
    }

    // Users defaults
    pub fn workers() -> usize {
        8
    }
    pub fn rate_limit() -> u32 {
        5
    }
    pub fn rate_period() -> u64 {
        1
    }
    pub fn balance() -> usize {
        8
    }
    pub fn account_info_refresh() -> i64 {
        7 * 24 * 3600
    }

    // Rating defaults
    pub fn high() -> f64 {
        5000.0
    }
    pub fn iterations() -> u32 {
        14
    }
    pub fn partial_multiplier() -> f64 {
        0.25
    }
    pub fn unrated_weight() -> f64 {
        0.5
    }
}
