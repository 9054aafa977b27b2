//! TinyTorch runtime configuration
//!
//! Controls the memory ordering used by the intrusive reference counters and
//! whether pointer lifecycle events are logged.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (TINYTORCH_ORDERING, TINYTORCH_TRACE_LIFECYCLE, TINYTORCH_LOG)
//! 3. Config file (TINYTORCH_CONFIG, or ./tinytorch.ron)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use tinytorch::util::config::{load_config, ordering_policy, OrderingPolicy};
//!
//! let config = load_config().unwrap_or_default();
//! config.install();
//! assert!(matches!(ordering_policy(), OrderingPolicy::SeqCst | OrderingPolicy::AcqRel));
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use thiserror::Error;

use crate::util::logger::LogLevel;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "TINYTORCH_CONFIG";
/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "tinytorch.ron";

const ORDERING_ENV: &str = "TINYTORCH_ORDERING";
const TRACE_LIFECYCLE_ENV: &str = "TINYTORCH_TRACE_LIFECYCLE";
const LOG_LEVEL_ENV: &str = "TINYTORCH_LOG";

/// Process-wide ordering policy (stored as atomic u8 for lock-free reads on every count update)
static ORDERING_POLICY: AtomicU8 = AtomicU8::new(0);
static TRACE_LIFECYCLE: AtomicBool = AtomicBool::new(false);

/// Memory ordering used by reference-count updates.
///
/// Both policies are correct; `AcqRel` relaxes increments and uses
/// acquire/release pairs on decrements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderingPolicy {
    #[default]
    SeqCst,
    AcqRel,
}

impl OrderingPolicy {
    /// Ordering for count increments
    #[inline]
    pub fn increment(self) -> Ordering {
        match self {
            OrderingPolicy::SeqCst => Ordering::SeqCst,
            OrderingPolicy::AcqRel => Ordering::Relaxed,
        }
    }

    /// Ordering for count decrements
    #[inline]
    pub fn decrement(self) -> Ordering {
        match self {
            OrderingPolicy::SeqCst => Ordering::SeqCst,
            OrderingPolicy::AcqRel => Ordering::AcqRel,
        }
    }

    /// Ordering for count loads that gate a release decision
    #[inline]
    pub fn load(self) -> Ordering {
        match self {
            OrderingPolicy::SeqCst => Ordering::SeqCst,
            OrderingPolicy::AcqRel => Ordering::Acquire,
        }
    }

    /// Success ordering of the conditional strong increment used by upgrades
    #[inline]
    pub fn upgrade(self) -> Ordering {
        match self {
            OrderingPolicy::SeqCst => Ordering::SeqCst,
            OrderingPolicy::AcqRel => Ordering::Acquire,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            OrderingPolicy::SeqCst => 0,
            OrderingPolicy::AcqRel => 1,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => OrderingPolicy::AcqRel,
            _ => OrderingPolicy::SeqCst,
        }
    }
}

impl FromStr for OrderingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seqcst" | "seq_cst" | "seq-cst" => Ok(OrderingPolicy::SeqCst),
            "acqrel" | "acq_rel" | "acq-rel" | "relaxed" => Ok(OrderingPolicy::AcqRel),
            _ => Err(ConfigError::InvalidValue {
                key: "ordering",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderingPolicy {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            OrderingPolicy::SeqCst => write!(f, "seq-cst"),
            OrderingPolicy::AcqRel => write!(f, "acq-rel"),
        }
    }
}

/// Reference-counting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefCountConfig {
    /// Memory ordering for counter updates
    #[serde(default)]
    pub ordering: OrderingPolicy,
    /// Log adopt / release_storage / deallocate events at TRACE level
    #[serde(default)]
    pub trace_lifecycle: bool,
    /// Logger level used by the CLI
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for RefCountConfig {
    fn default() -> Self {
        Self {
            ordering: OrderingPolicy::SeqCst,
            trace_lifecycle: false,
            log_level: LogLevel::Info,
        }
    }
}

impl RefCountConfig {
    /// Parse a RON document
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Load a RON config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron_str(&content)
    }

    /// Override fields from variables returned by `lookup`
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ORDERING_ENV) {
            self.ordering = value.parse()?;
        }
        if let Some(value) = lookup(TRACE_LIFECYCLE_ENV) {
            self.trace_lifecycle = parse_flag(TRACE_LIFECYCLE_ENV, &value)?;
        }
        if let Some(value) = lookup(LOG_LEVEL_ENV) {
            self.log_level = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: LOG_LEVEL_ENV,
                value,
            })?;
        }
        Ok(())
    }

    /// Override fields from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Publish this configuration to the reference counters
    pub fn install(&self) {
        set_ordering_policy(self.ordering);
        TRACE_LIFECYCLE.store(self.trace_lifecycle, Ordering::SeqCst);
    }
}

fn parse_flag(
    key: &'static str,
    value: &str,
) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Locate the config file: `$TINYTORCH_CONFIG`, then `./tinytorch.ron`
pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    None
}

/// Load configuration from file (if any) and environment
/// Returns default config if no file exists
pub fn load_config() -> Result<RefCountConfig, ConfigError> {
    let mut config = match get_config_path() {
        Some(path) => RefCountConfig::from_file(&path)?,
        None => RefCountConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

/// Current process-wide ordering policy
#[inline]
pub fn ordering_policy() -> OrderingPolicy {
    OrderingPolicy::from_u8(ORDERING_POLICY.load(Ordering::Relaxed))
}

/// Switch the process-wide ordering policy
pub fn set_ordering_policy(policy: OrderingPolicy) {
    ORDERING_POLICY.store(policy.as_u8(), Ordering::SeqCst);
}

/// Whether lifecycle events are logged
#[inline]
pub fn lifecycle_tracing() -> bool {
    TRACE_LIFECYCLE.load(Ordering::Relaxed)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[source] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
