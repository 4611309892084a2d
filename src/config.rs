//! Configuration loading and management
//!
//! Handles parsing of `.rota.toml`. Every section is optional.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::storage::CONFIG_FILE;
use crate::swap::parse_duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    #[serde(default)]
    pub deadlines: DeadlineConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Actor used when neither --actor nor ROTA_ACTOR is set
    #[serde(default = "default_actor")]
    pub default_actor: String,

    /// Users allowed to cancel instances and give administrator approval
    #[serde(default)]
    pub admins: Vec<String>,
}

fn default_actor() -> String {
    "unknown".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_actor: default_actor(),
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seed for the jitter term; unset draws from the OS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

/// What happens to a slot whose pool release nobody claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolExpiryPolicy {
    /// The requester keeps the slot
    #[default]
    Revert,
    /// A fresh pool release is published, within `max_republish`
    Republish,
}

impl fmt::Display for PoolExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolExpiryPolicy::Revert => write!(f, "revert"),
            PoolExpiryPolicy::Republish => write!(f, "republish"),
        }
    }
}

impl FromStr for PoolExpiryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "revert" => Ok(PoolExpiryPolicy::Revert),
            "republish" => Ok(PoolExpiryPolicy::Republish),
            other => Err(Error::InvalidConfig(format!(
                "negotiation.on_pool_expiry '{}' must be 'revert' or 'republish'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// How long a pool release stays claimable
    #[serde(default = "default_pool_horizon")]
    pub pool_horizon: String,

    #[serde(default = "default_on_pool_expiry")]
    pub on_pool_expiry: String,

    /// Republish budget per slot
    #[serde(default = "default_max_republish")]
    pub max_republish: u32,
}

fn default_pool_horizon() -> String {
    "48h".to_string()
}

fn default_on_pool_expiry() -> String {
    "revert".to_string()
}

fn default_max_republish() -> u32 {
    1
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            pool_horizon: default_pool_horizon(),
            on_pool_expiry: default_on_pool_expiry(),
            max_republish: default_max_republish(),
        }
    }
}

impl NegotiationConfig {
    pub fn pool_horizon(&self) -> Result<Duration> {
        let horizon = parse_duration(&self.pool_horizon).map_err(|e| {
            Error::InvalidConfig(format!("negotiation.pool_horizon: {e}"))
        })?;
        if horizon <= Duration::zero() {
            return Err(Error::InvalidConfig(
                "negotiation.pool_horizon must be > 0".to_string(),
            ));
        }
        Ok(horizon)
    }

    pub fn expiry_policy(&self) -> Result<PoolExpiryPolicy> {
        self.on_pool_expiry.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Instances due within this window get a reminder from the sweep
    #[serde(default = "default_warn_before")]
    pub warn_before: String,
}

fn default_warn_before() -> String {
    "3d".to_string()
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            warn_before: default_warn_before(),
        }
    }
}

impl DeadlineConfig {
    pub fn warn_before(&self) -> Result<Duration> {
        let window = parse_duration(&self.warn_before)
            .map_err(|e| Error::InvalidConfig(format!("deadlines.warn_before: {e}")))?;
        if window < Duration::zero() {
            return Err(Error::InvalidConfig(
                "deadlines.warn_before cannot be negative".to_string(),
            ));
        }
        Ok(window)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// `.rota.toml` under `root`, or defaults when the file is absent
    pub fn load_from_dir(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.default_actor.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "identity.default_actor cannot be empty".to_string(),
            ));
        }
        if self.identity.admins.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "identity.admins cannot include empty entries".to_string(),
            ));
        }
        self.negotiation.pool_horizon()?;
        self.negotiation.expiry_policy()?;
        self.deadlines.warn_before()?;
        if self.storage.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
