// src/config.rs

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::camera::CameraSettings;
use crate::driver::{BoostSettings, RecoverySettings};
use crate::leader::LeaderWeights;
use crate::obstacles::ObstacleSettings;
use crate::racer::RacerSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub tick_hz: f32,
    pub track: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9001".to_string(),
            tick_hz: 60.0,
            track: PathBuf::from("assets/track.json"),
        }
    }
}

impl ServerSettings {
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CurveSettings {
    pub closed: bool,
    pub divisions: usize, // arc-length table resolution
    pub samples: usize,   // query sample count k
    pub lookahead: f32,   // world units ahead of the closest sample
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            closed: false,
            divisions: 200,
            samples: 500,
            lookahead: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub server: ServerSettings,
    pub curve: CurveSettings,
    pub leader: LeaderWeights,
    pub camera: CameraSettings,
    pub boost: BoostSettings,
    pub recovery: RecoverySettings,
    pub racers: RacerSettings,
    pub obstacles: ObstacleSettings,
}

impl RaceConfig {
    /// A missing file means built-in defaults. A file that is present but
    /// broken is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(path, &raw)?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.tick_hz > 0.0) {
            return Err(ConfigError::Validation("server.tick_hz must be > 0".to_string()));
        }
        if self.curve.samples < 2 {
            return Err(ConfigError::Validation("curve.samples must be >= 2".to_string()));
        }
        if self.curve.divisions == 0 {
            return Err(ConfigError::Validation("curve.divisions must be > 0".to_string()));
        }
        if !(self.curve.lookahead >= 0.0) {
            return Err(ConfigError::Validation("curve.lookahead must be >= 0".to_string()));
        }
        if !(self.camera.blend > 0.0 && self.camera.blend <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "camera.blend must be in (0, 1], got {}",
                self.camera.blend
            )));
        }
        if !(self.camera.rise_increment > 0.0 && self.camera.rise_increment <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "camera.rise_increment must be in (0, 1], got {}",
                self.camera.rise_increment
            )));
        }
        if !(self.camera.hold_secs >= 0.0 && self.camera.hold_secs.is_finite()) {
            return Err(ConfigError::Validation(
                "camera.hold_secs must be a finite value >= 0".to_string(),
            ));
        }
        if !(self.racers.radius > 0.0) {
            return Err(ConfigError::Validation("racers.radius must be > 0".to_string()));
        }
        if !(self.racers.visual_radius > 0.0) {
            return Err(ConfigError::Validation("racers.visual_radius must be > 0".to_string()));
        }
        if self.racers.start_ranks.len() != self.racers.count {
            return Err(ConfigError::Validation(format!(
                "racers.start_ranks has {} entries but racers.count is {}",
                self.racers.start_ranks.len(),
                self.racers.count
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "0.0.0.0:9001");
        assert!((config.server.tick_dt() - 1.0 / 60.0).abs() < 1e-7);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let raw = include_str!("../config/race.toml");
        let config = RaceConfig::from_toml(Path::new("config/race.toml"), raw).unwrap();
        assert_eq!(config.camera, CameraSettings::default());
        assert_eq!(config.boost, BoostSettings::default());
        assert_eq!(config.racers.start_ranks, RacerSettings::default().start_ranks);
        let rotor_rate = ObstacleSettings::default().rotor_rate;
        assert!((config.obstacles.rotor_rate - rotor_rate).abs() < 1e-5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("race-{}.toml", uuid::Uuid::new_v4()));
        let config = RaceConfig::load_or_default(&path).unwrap();
        assert_eq!(config.curve.samples, 500);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let raw = r#"
            [camera]
            blend = 0.1

            [curve]
            closed = true
        "#;
        let config = RaceConfig::from_toml(Path::new("race.toml"), raw).unwrap();
        assert_eq!(config.camera.blend, 0.1);
        assert_eq!(config.camera.hover_height, 5.0);
        assert!(config.curve.closed);
        assert_eq!(config.curve.divisions, 200);
        assert_eq!(config.racers.count, 10);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = RaceConfig::from_toml(Path::new("race.toml"), "[camera\nblend = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn blend_out_of_range_is_rejected() {
        let raw = "[camera]\nblend = 1.5\n";
        let err = RaceConfig::from_toml(Path::new("race.toml"), raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("camera.blend")));
    }

    #[test]
    fn hold_beyond_duration_range_is_accepted() {
        let raw = "[camera]\nhold_secs = 1e20\n";
        let config = RaceConfig::from_toml(Path::new("race.toml"), raw).unwrap();
        assert_eq!(config.camera.hold_secs, 1e20);
        // the rig saturates the hold instead of panicking
        let _ = crate::camera::CameraRig::new(config.camera);
    }

    #[test]
    fn rank_count_must_match_racers() {
        let raw = "[racers]\ncount = 3\nstart_ranks = [1, 2]\n";
        let err = RaceConfig::from_toml(Path::new("race.toml"), raw).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("start_ranks")));
    }
}
