//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (if provided)
//! 2. `~/.concierge/config.toml` (user)
//! 3. `/etc/concierge/config.toml` (system)
//!
//! Every table and field is optional; missing values fall back to the
//! defaults documented on each field. [`Config::validate`] rejects values
//! that would make a component meaningless (zero windows, TTLs, timeouts).

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{ConciergeError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Sliding-window throttle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    /// Whether requests are throttled at all (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests admitted per client within one window (default: 100).
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds (default: 60).
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

/// Memoization cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// When false every lookup recomputes and nothing is stored (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default time-to-live in seconds (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on stored entries (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// How long a request waits on an in-flight fill when it carries no
    /// deadline of its own, in seconds (default: 30).
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_wait_timeout_secs() -> u64 {
    30
}

/// Conversation session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session expires, in seconds (default: 1800).
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,
    /// Turns kept per session; oldest are dropped first (default: 20,
    /// i.e. ten user/assistant exchanges).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout_secs(),
            max_history: default_max_history(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_session_timeout_secs() -> u64 {
    1800
}

fn default_max_history() -> usize {
    20
}

/// Background sweep settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JanitorConfig {
    /// Seconds between sweeps (default: 300).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.concierge/config.toml`
    /// 3. `/etc/concierge/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ConciergeError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConciergeError::Configuration(msg) => {
                ConciergeError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            ConciergeError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.limiter.max_requests == 0, "limiter.max_requests"),
            (self.limiter.window_secs == 0, "limiter.window_secs"),
            (self.cache.ttl_secs == 0, "cache.ttl_secs"),
            (self.cache.max_entries == 0, "cache.max_entries"),
            (self.cache.wait_timeout_secs == 0, "cache.wait_timeout_secs"),
            (self.session.timeout_secs == 0, "session.timeout_secs"),
            (self.session.max_history == 0, "session.max_history"),
            (self.janitor.interval_secs == 0, "janitor.interval_secs"),
        ];
        match checks.iter().find(|(zero, _)| *zero) {
            Some((_, field)) => Err(ConciergeError::Configuration(format!(
                "{field} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ConciergeError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".concierge").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/concierge/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(ConciergeError::Configuration(
            "No config file found. Create ~/.concierge/config.toml or /etc/concierge/config.toml"
                .to_string(),
        ))
    }
}
