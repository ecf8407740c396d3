//! Settings for triad services.
//!
//! Values come from a JSON file (`TriadConfig::load_from`) and/or environment
//! variables (`TriadConfig::from_env`). Environment variables win:
//!
//! ```bash
//! TRIAD_DATABASE_URL=sqlite:///var/lib/triad/triad.db
//! TRIAD_MAX_CONNECTIONS=5
//! TRIAD_RETRY_MAX_ATTEMPTS=3
//! TRIAD_RETRY_BACKOFF_STEP_MS=100
//! TRIAD_STATEMENT_TIMEOUT_MS=5000
//! TRIAD_PUBLIC_BASE_URL=https://example.org
//! TRIAD_INVITE_TTL_HOURS=168
//! TRIAD_ACTIVATION_TTL_HOURS=48
//! TRIAD_MAX_ACTIVE_INVITES=3
//! TRIAD_NOTIFY_TIMEOUT_MS=3000
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Ten years; longer lifetimes are configuration mistakes.
pub const MAX_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Top-level settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TriadConfig {
    /// SQLite URL. `None` means the default file under `~/.triad`.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub retry: RetryConfig,
    pub onboarding: OnboardingConfig,
}

/// Store retry behaviour
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_step_ms: u64, // Delay before attempt n+1 is n * step
    pub statement_timeout_ms: u64,
}

/// Invite workflow settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OnboardingConfig {
    pub public_base_url: String,
    pub invite_ttl_hours: i64,
    pub activation_ttl_hours: i64,
    pub max_active_invites: u32,
    pub notify_timeout_ms: u64,
}

impl Default for TriadConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            retry: RetryConfig::default(),
            onboarding: OnboardingConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 100,
            statement_timeout_ms: 5_000,
        }
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            invite_ttl_hours: 168,
            activation_ttl_hours: 48,
            max_active_invites: 3,
            notify_timeout_ms: 3_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

impl OnboardingConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

impl TriadConfig {
    /// Defaults overridden by `TRIAD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a JSON file; missing keys take their defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read(e)
            }
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// File then environment overrides. Without an explicit path,
    /// `~/.triad/config.json` is read when it exists.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let fallback = match path {
            Some(_) => None,
            None => Self::default_path().ok().filter(|p| p.is_file()),
        };
        let mut config = match path.or(fallback.as_deref()) {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    /// `~/.triad/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(triad_home()?.join("config.json"))
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("TRIAD_DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database_url = Some(url);
            }
        }
        if let Ok(url) = env::var("TRIAD_PUBLIC_BASE_URL") {
            self.onboarding.public_base_url = url;
        }
        override_parsed("TRIAD_MAX_CONNECTIONS", &mut self.max_connections)?;
        override_parsed("TRIAD_RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_parsed("TRIAD_RETRY_BACKOFF_STEP_MS", &mut self.retry.backoff_step_ms)?;
        override_parsed(
            "TRIAD_STATEMENT_TIMEOUT_MS",
            &mut self.retry.statement_timeout_ms,
        )?;
        override_parsed(
            "TRIAD_INVITE_TTL_HOURS",
            &mut self.onboarding.invite_ttl_hours,
        )?;
        override_parsed(
            "TRIAD_ACTIVATION_TTL_HOURS",
            &mut self.onboarding.activation_ttl_hours,
        )?;
        override_parsed(
            "TRIAD_MAX_ACTIVE_INVITES",
            &mut self.onboarding.max_active_invites,
        )?;
        override_parsed(
            "TRIAD_NOTIFY_TIMEOUT_MS",
            &mut self.onboarding.notify_timeout_ms,
        )?;
        self.validate()
    }

    /// Reject values no deployment can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &str, value: impl ToString) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }
        }

        if self.max_connections == 0 {
            return Err(invalid("max_connections", self.max_connections));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", self.retry.max_attempts));
        }
        if self.retry.statement_timeout_ms == 0 {
            return Err(invalid(
                "retry.statement_timeout_ms",
                self.retry.statement_timeout_ms,
            ));
        }
        let base = self.onboarding.public_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(invalid("onboarding.public_base_url", base));
        }
        if !(1..=MAX_TTL_HOURS).contains(&self.onboarding.invite_ttl_hours) {
            return Err(invalid(
                "onboarding.invite_ttl_hours",
                self.onboarding.invite_ttl_hours,
            ));
        }
        if !(1..=MAX_TTL_HOURS).contains(&self.onboarding.activation_ttl_hours) {
            return Err(invalid(
                "onboarding.activation_ttl_hours",
                self.onboarding.activation_ttl_hours,
            ));
        }
        if self.onboarding.max_active_invites == 0 {
            return Err(invalid(
                "onboarding.max_active_invites",
                self.onboarding.max_active_invites,
            ));
        }
        Ok(())
    }
}

/// `~/.triad`
pub fn triad_home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".triad"))
        .ok_or(ConfigError::NoHomeDir)
}

fn override_parsed<T: FromStr>(key: &str, slot: &mut T) -> Result<(), ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    Ok(())
}
