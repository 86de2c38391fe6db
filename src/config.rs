//! Configuration management for Pulsekeeper.
//!
//! A [`PulseConfig`] is loaded from YAML (optionally overlaid with `PULSE_*`
//! environment variables) and validated before any heart or guard is built.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{PulseError, Result};

/// Main configuration shared by the heart and the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Seconds between two beats. Both components measure time in beats.
    #[serde(default = "default_beat_interval")]
    pub beat_interval_secs: u64,

    /// Heart (scheduler) configuration
    #[serde(default)]
    pub heart: HeartConfig,

    /// Guard (admission throttle) configuration
    #[serde(default)]
    pub guard: GuardConfig,

    /// Logging configuration for the binary
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            beat_interval_secs: default_beat_interval(),
            heart: HeartConfig::default(),
            guard: GuardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_beat_interval() -> u64 {
    1
}

/// Heart configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartConfig {
    /// Seconds between cycle rollovers
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Seconds between epoch rollovers
    #[serde(default = "default_epoch_interval")]
    pub epoch_interval_secs: u64,

    /// Start ticking as soon as the heart is built
    #[serde(default)]
    pub auto_start: bool,

    /// Upper bound for a single hook invocation. Unbounded when unset.
    #[serde(default)]
    pub hook_timeout_secs: Option<u64>,
}

impl Default for HeartConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            epoch_interval_secs: default_epoch_interval(),
            auto_start: false,
            hook_timeout_secs: None,
        }
    }
}

fn default_cycle_interval() -> u64 {
    300
}

fn default_epoch_interval() -> u64 {
    900
}

/// Guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Minimum number of beats between two admissions of the same key
    #[serde(default = "default_throttle_interval")]
    pub throttle_interval: u32,

    /// Key sources by port instead of address (several local nodes on one host)
    #[serde(default)]
    pub key_by_port: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            throttle_interval: default_throttle_interval(),
            key_by_port: false,
        }
    }
}

fn default_throttle_interval() -> u32 {
    2
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PulseConfig {
    /// Load configuration from a YAML file, overlaid with `PULSE_*` variables.
    ///
    /// Nested keys use a double underscore, e.g. `PULSE_HEART__AUTO_START=true`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(PulseError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("configuration file {} not found", path.display()),
            )));
        }

        let config: PulseConfig = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Yaml))
            .add_source(
                ::config::Environment::with_prefix("PULSE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PulseError::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PulseConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PulseError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check interval ordering: `0 < beat < cycle < epoch` and a usable throttle.
    pub fn validate(&self) -> Result<()> {
        self.validate_guard()?;

        if self.heart.cycle_interval_secs <= self.beat_interval_secs {
            return Err(PulseError::Config(format!(
                "cycle_interval_secs ({}) must exceed beat_interval_secs ({})",
                self.heart.cycle_interval_secs, self.beat_interval_secs
            )));
        }
        if self.heart.epoch_interval_secs <= self.heart.cycle_interval_secs {
            return Err(PulseError::Config(format!(
                "epoch_interval_secs ({}) must exceed cycle_interval_secs ({})",
                self.heart.epoch_interval_secs, self.heart.cycle_interval_secs
            )));
        }
        if self.heart.hook_timeout_secs == Some(0) {
            return Err(PulseError::Config(
                "hook_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Check only the fields the guard reads: the beat and the `guard` section.
    pub fn validate_guard(&self) -> Result<()> {
        if self.beat_interval_secs == 0 {
            return Err(PulseError::Config(
                "beat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.guard.throttle_interval == 0 {
            return Err(PulseError::Config(
                "throttle_interval must be greater than zero".to_string(),
            ));
        }
        if self
            .beat_interval()
            .checked_mul(self.guard.throttle_interval)
            .is_none()
        {
            return Err(PulseError::Config(format!(
                "throttle gate overflows: beat_interval_secs ({}) * throttle_interval ({})",
                self.beat_interval_secs, self.guard.throttle_interval
            )));
        }
        Ok(())
    }

    /// The beat interval as a duration.
    pub fn beat_interval(&self) -> Duration {
        Duration::from_secs(self.beat_interval_secs)
    }

    /// The cycle interval as a duration.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.heart.cycle_interval_secs)
    }

    /// The epoch interval as a duration.
    pub fn epoch_interval(&self) -> Duration {
        Duration::from_secs(self.heart.epoch_interval_secs)
    }

    /// The per-hook timeout, if any.
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.heart.hook_timeout_secs.map(Duration::from_secs)
    }

    /// Minimum gap between two admissions of one key: `beat * throttle_interval`.
    ///
    /// Saturates at [`Duration::MAX`]; [`validate_guard`](Self::validate_guard)
    /// rejects configurations that would overflow.
    pub fn throttle_gate(&self) -> Duration {
        self.beat_interval()
            .checked_mul(self.guard.throttle_interval)
            .unwrap_or(Duration::MAX)
    }
}
