//! Configuration for fingerprinting, matching and storage
//!
//! Defaults reproduce the tuning the hash databases were built with. Any section may
//! be overridden from a TOML file; missing keys keep their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable overriding `database.path`
pub const DB_PATH_ENV: &str = "SONGPRINT_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub spectrogram: SpectrogramConfig,
    pub peaks: PeakConfig,
    pub target_zone: TargetZone,
    pub matching: MatchConfig,
    /// Worker threads used for batch registration
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// STFT window length in seconds; converted to samples at the buffer's rate
    pub window_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Side of the square maximum filter, in grid cells
    pub box_size: usize,
    /// Fraction of the ideal `area / box_size²` landmark budget that is kept
    pub point_efficiency: f64,
}

/// Region paired with each anchor, relative to the anchor's position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetZone {
    /// Seconds between the anchor and the start of the zone
    pub start: f64,
    /// Zone length in seconds
    pub width: f64,
    /// Zone span in Hz, centred on the anchor frequency
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Width of the offset histogram bins in seconds
    pub bin_width: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            spectrogram: SpectrogramConfig::default(),
            peaks: PeakConfig::default(),
            target_zone: TargetZone::default(),
            matching: MatchConfig::default(),
            workers: 24,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("hash.db"),
        }
    }
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        SpectrogramConfig {
            window_seconds: 0.2,
        }
    }
}

impl Default for PeakConfig {
    fn default() -> Self {
        PeakConfig {
            box_size: 30,
            point_efficiency: 0.8,
        }
    }
}

impl Default for TargetZone {
    fn default() -> Self {
        TargetZone {
            start: 0.05,
            width: 1.8,
            height: 4000.0,
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig { bin_width: 0.5 }
    }
}

impl Config {
    /// Loads configuration from an optional TOML file, then applies environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml(&text)?
            }
            None => Config::default(),
        };

        if let Some(db_path) = std::env::var_os(DB_PATH_ENV) {
            info!("Using index database from {}", DB_PATH_ENV);
            config.database.path = PathBuf::from(db_path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Rejects values that would make the pipeline degenerate or meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(self.spectrogram.window_seconds > 0.0) {
            return invalid("spectrogram.window_seconds must be > 0");
        }
        if self.peaks.box_size == 0 {
            return invalid("peaks.box_size must be > 0");
        }
        if !(self.peaks.point_efficiency > 0.0 && self.peaks.point_efficiency <= 1.0) {
            return invalid("peaks.point_efficiency must be in (0, 1]");
        }
        if !(self.target_zone.start >= 0.0) {
            return invalid("target_zone.start must be >= 0");
        }
        if !(self.target_zone.width > 0.0 && self.target_zone.height > 0.0) {
            return invalid("target_zone.width and target_zone.height must be > 0");
        }
        if !(self.matching.bin_width > 0.0) {
            return invalid("matching.bin_width must be > 0");
        }
        if self.workers == 0 {
            return invalid("workers must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.peaks.box_size, 30);
        assert_eq!(config.target_zone.height, 4000.0);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            workers = 4

            [peaks]
            box_size = 12

            [database]
            path = "/tmp/fp.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.peaks.box_size, 12);
        assert_eq!(config.peaks.point_efficiency, 0.8);
        assert_eq!(config.database.path, PathBuf::from("/tmp/fp.db"));
        assert_eq!(config.spectrogram, SpectrogramConfig::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = Config::default();
        config.peaks.point_efficiency = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.matching.bin_width = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.spectrogram.window_seconds = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml("workers = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
