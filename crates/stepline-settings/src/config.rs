//! Configuration for stepline
//!
//! Provides configuration file handling and validation. Files are JSON or
//! TOML, chosen by extension, and live in the platform configuration
//! directory by default.
//!
//! Configuration is organized into sections:
//! - Machine (workspace, kinematic limits, step scale, corner tolerance)
//! - Motion (slicing period and longest slice)
//! - Connection (serial port)
//! - Protocol (back-pressure and status polling)

use crate::error::{SettingsError, SettingsResult};
use crate::stepper::StepperSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepline_core::{MachineLimits, StepScale, V3, MAX_WIRE_VALUE};

/// Machine description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Signed end of each axis in meters
    pub xmax: V3,
    /// Maximum speed of each axis in m/s
    pub vmax: V3,
    /// Maximum acceleration of each axis in m/s²
    pub amax: V3,
    /// Steps per meter of each axis
    pub scale: StepScale,
    /// Default corner deviation tolerance in meters
    pub deviation: f64,
    /// Drive train; when present it overrides `vmax`, `amax` and `scale`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stepper: Option<StepperSettings>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        let limits = MachineLimits::default();
        Self {
            xmax: limits.xmax,
            vmax: limits.vmax,
            amax: limits.amax,
            scale: StepScale::default(),
            deviation: 0.001,
            stepper: None,
        }
    }
}

impl MachineSettings {
    /// Kinematic limits, derived from the drive train when one is given
    pub fn limits(&self) -> MachineLimits {
        match &self.stepper {
            Some(stepper) => {
                MachineLimits::new(self.xmax, stepper.max_speed(), stepper.max_acceleration())
            }
            None => MachineLimits::new(self.xmax, self.vmax, self.amax),
        }
    }

    /// Steps per meter, derived from the drive train when one is given
    pub fn step_scale(&self) -> StepScale {
        match &self.stepper {
            Some(stepper) => stepper.scale(),
            None => self.scale,
        }
    }
}

/// Resampling of planned motion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Slicing period of accelerating motion in seconds
    pub period: f64,
    /// Longest slice of constant-speed motion in seconds
    pub max_slice_duration: f64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            period: 0.010,
            max_slice_duration: 32.0,
        }
    }
}

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Serial port of the controller board
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Reply timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115200,
            timeout_ms: 1000,
        }
    }
}

/// Firmware protocol timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Resends of a block refused with a full buffer
    pub max_retries: u32,
    /// Pause before each resend in milliseconds
    pub backoff_ms: u64,
    /// Pause between status queries while waiting, in milliseconds
    pub poll_interval_ms: u64,
    /// Consecutive failed status queries tolerated while waiting
    #[serde(default = "default_max_status_errors")]
    pub max_status_errors: u32,
}

fn default_max_status_errors() -> u32 {
    5
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            max_retries: 100,
            backoff_ms: 100,
            poll_interval_ms: 200,
            max_status_errors: default_max_status_errors(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Machine description
    #[serde(default)]
    pub machine: MachineSettings,
    /// Motion resampling
    #[serde(default)]
    pub motion: MotionSettings,
    /// Serial connection
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Protocol timing
    #[serde(default)]
    pub protocol: ProtocolSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the configuration file
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("stepline").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        // Machine
        if let Some(stepper) = &self.machine.stepper {
            stepper.validate()?;
        }
        let limits = self.machine.limits();
        limits.validate()?;
        self.machine.step_scale().check_workspace(&limits)?;
        if !self.machine.deviation.is_finite() || self.machine.deviation <= 0.0 {
            return Err(SettingsError::invalid("machine.deviation", "must be > 0"));
        }

        // Motion
        let motion = &self.motion;
        if !motion.period.is_finite() || motion.period <= 0.0 {
            return Err(SettingsError::invalid("motion.period", "must be > 0"));
        }
        let longest = MAX_WIRE_VALUE as f64 / 1000.0;
        if !(motion.period..=longest).contains(&motion.max_slice_duration) {
            return Err(SettingsError::invalid(
                "motion.max_slice_duration",
                format!("must lie between the period and {} s", longest),
            ));
        }

        // Connection
        if self.connection.port.is_empty() {
            return Err(SettingsError::invalid("connection.port", "must not be empty"));
        }
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if self.connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }

        // Protocol
        if self.protocol.poll_interval_ms == 0 {
            return Err(SettingsError::invalid("protocol.poll_interval_ms", "must be > 0"));
        }
        if self.protocol.max_status_errors == 0 {
            return Err(SettingsError::invalid("protocol.max_status_errors", "must be > 0"));
        }

        Ok(())
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("none").to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_stepper_overrides_limits() {
        let mut config = Config::default();
        config.machine.stepper = Some(StepperSettings::default());
        let limits = config.machine.limits();
        assert!((limits.vmax.x() - 0.2).abs() < 1e-12);
        assert!((config.machine.step_scale().0.x() - 40000.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workspace_too_large() {
        let mut config = Config::default();
        config.machine.scale = StepScale::new(100000.0, 10000.0, 50000.0);
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Machine(_))
        ));
    }

    #[test]
    fn test_invalid_motion() {
        let mut config = Config::default();
        config.motion.max_slice_duration = 40.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("motion.max_slice_duration"));
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            Format::of(Path::new("config.yaml")),
            Err(SettingsError::UnsupportedFormat(_))
        ));
    }
}
