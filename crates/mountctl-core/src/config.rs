//! Mount configuration
//!
//! Stored as `mount.json`, loaded once at startup. Every section has
//! defaults so a file only needs to name what differs from them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::astro::Observer;
use crate::collision::MountGeometry;
use crate::protocol::{ChannelConfig, ProtocolFlavor, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not find a configuration directory")]
    NoConfigDir,
}

/// Observatory location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservatoryConfig {
    /// Degrees, east positive
    pub longitude: f64,
    /// Degrees, north positive
    pub latitude: f64,
    pub altitude_m: f64,
}

impl Default for ObservatoryConfig {
    fn default() -> Self {
        Self {
            longitude: 0.0,
            latitude: 50.0,
            altitude_m: 0.0,
        }
    }
}

impl ObservatoryConfig {
    pub fn observer(&self) -> Observer {
        Observer {
            longitude: self.longitude,
            latitude: self.latitude,
            altitude: self.altitude_m,
        }
    }
}

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name
    pub port: Option<String>,

    pub baud_rate: u32,

    /// Reply timeout in milliseconds
    pub timeout_ms: u64,

    /// Extra attempts for commands that time out or are not acknowledged
    pub max_retries: u32,

    pub retry_pause_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 2,
            retry_pause_ms: crate::protocol::DEFAULT_RETRY_PAUSE_MS,
        }
    }
}

impl ConnectionSettings {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            reply_timeout: std::time::Duration::from_millis(self.timeout_ms),
            write_timeout: std::time::Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            retry_pause: std::time::Duration::from_millis(self.retry_pause_ms),
        }
    }
}

/// Motion and safety limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// A slew has arrived once both axes are this close to the target
    pub arrival_tolerance_deg: f64,
    pub slew_timeout_secs: u64,
    /// Targets below this altitude are refused
    pub horizon_limit_deg: f64,
    /// Within this distance of the meridian both axis sides are checked
    pub meridian_margin_deg: f64,
    /// Failed ticks in a row before the mount is blocked
    pub max_consecutive_failures: u32,
    /// Hour-angle change tolerated while tracking is off
    pub drift_tolerance_deg: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance_deg: 0.1,
            slew_timeout_secs: 180,
            horizon_limit_deg: 0.0,
            meridian_margin_deg: 5.0,
            max_consecutive_failures: 3,
            drift_tolerance_deg: 0.05,
        }
    }
}

/// A fixed pointing given by hour angle and declination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisTarget {
    pub hour_angle: f64,
    pub declination: f64,
}

fn default_park() -> AxisTarget {
    AxisTarget {
        hour_angle: 270.0,
        declination: 60.0,
    }
}

fn default_home() -> AxisTarget {
    AxisTarget {
        hour_angle: 0.0,
        declination: 90.0,
    }
}

/// Controller clock management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Local time zone offset from UTC in hours (east positive)
    pub utc_offset_hours: f64,
    /// Sidereal-time difference tolerated before resynchronising
    pub tolerance_hours: f64,
    pub check_interval_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0.0,
            tolerance_hours: 1.0 / 120.0,
            check_interval_secs: 300,
        }
    }
}

/// Checks run once when the driver starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Expect the mount to be sitting at its park position
    pub assume_parked: bool,
    pub tolerance_deg: f64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            assume_parked: false,
            tolerance_deg: 2.0,
        }
    }
}

/// Complete mount configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub observatory: ObservatoryConfig,
    pub geometry: MountGeometry,
    pub connection: ConnectionSettings,
    pub motion: MotionConfig,
    pub park: AxisTarget,
    pub home: AxisTarget,
    pub clock: ClockConfig,
    pub startup: StartupConfig,
    pub flavor: ProtocolFlavor,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            observatory: ObservatoryConfig::default(),
            geometry: MountGeometry::default(),
            connection: ConnectionSettings::default(),
            motion: MotionConfig::default(),
            park: default_park(),
            home: default_home(),
            clock: ClockConfig::default(),
            startup: StartupConfig::default(),
            flavor: ProtocolFlavor::default(),
        }
    }
}

impl MountConfig {
    /// `<config dir>/mountctl/mount.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("mountctl").join("mount.json"))
    }

    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MountConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let obs = &self.observatory;
        if !(-90.0..=90.0).contains(&obs.latitude) {
            return invalid(format!("latitude {} out of range", obs.latitude));
        }
        if !(-180.0..=360.0).contains(&obs.longitude) {
            return invalid(format!("longitude {} out of range", obs.longitude));
        }
        self.geometry
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("geometry: {e}")))?;

        let m = &self.motion;
        if m.arrival_tolerance_deg <= 0.0 {
            return invalid("arrival_tolerance_deg must be positive".to_string());
        }
        if m.slew_timeout_secs == 0 {
            return invalid("slew_timeout_secs must be positive".to_string());
        }
        if m.meridian_margin_deg < 0.0 || m.meridian_margin_deg > 90.0 {
            return invalid("meridian_margin_deg must be within 0..=90".to_string());
        }
        if m.max_consecutive_failures == 0 {
            return invalid("max_consecutive_failures must be at least 1".to_string());
        }
        if m.drift_tolerance_deg <= 0.0 {
            return invalid("drift_tolerance_deg must be positive".to_string());
        }

        for (name, target) in [("park", &self.park), ("home", &self.home)] {
            if !(-90.0..=90.0).contains(&target.declination) {
                return invalid(format!("{name} declination out of range"));
            }
        }

        let c = &self.clock;
        if !(-14.0..=14.0).contains(&c.utc_offset_hours) {
            return invalid(format!("utc_offset_hours {} out of range", c.utc_offset_hours));
        }
        if c.tolerance_hours <= 0.0 {
            return invalid("clock tolerance_hours must be positive".to_string());
        }
        if self.connection.baud_rate == 0 {
            return invalid("baud_rate must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MountConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.motion.arrival_tolerance_deg, 0.1);
        assert_eq!(config.clock.tolerance_hours, 1.0 / 120.0);
        assert_eq!(config.park, default_park());
        assert_eq!(config.home, default_home());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "observatory": { "longitude": 8.5, "latitude": 47.4 },
            "home": { "hour_angle": 0.0, "declination": 89.0 }
        }"#;
        let config: MountConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.observatory.latitude, 47.4);
        assert_eq!(config.observatory.altitude_m, 0.0);
        assert_eq!(config.home.declination, 89.0);
        assert_eq!(config.park, default_park());
        assert_eq!(config.motion.slew_timeout_secs, 180);
    }

    #[test]
    fn test_validate_rejects_bad_latitude() {
        let mut config = MountConfig::default();
        config.observatory.latitude = 95.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut config = MountConfig::default();
        config.geometry.floor = config.geometry.wedge + 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("geometry"));
    }
}
