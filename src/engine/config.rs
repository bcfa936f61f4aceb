use super::schedule::{DEFAULT_MAX_TICKS_PER_FRAME, DEFAULT_TICK_INTERVAL};
use crate::events::EventStackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_FRAMES: u32 = 3;
pub const DEFAULT_DAY_LENGTH_SECONDS: f32 = 600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Engine settings, loadable from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub time_speed: f32,
    pub max_ticks_per_frame: u32,
    /// Target wall time per frame for [`Engine::run`](super::Engine::run).
    pub frame_interval_ms: u64,
    pub max_frames: u32,
    pub day_length_seconds: f32,
    pub events: EventStackConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            time_speed: 1.0,
            max_ticks_per_frame: DEFAULT_MAX_TICKS_PER_FRAME,
            frame_interval_ms: 16,
            max_frames: DEFAULT_MAX_FRAMES,
            day_length_seconds: DEFAULT_DAY_LENGTH_SECONDS,
            events: EventStackConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tickIntervalMs must be > 0".into()));
        }
        if !self.time_speed.is_finite() || self.time_speed <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timeSpeed must be positive, got {}",
                self.time_speed
            )));
        }
        if self.max_ticks_per_frame == 0 {
            return Err(ConfigError::Invalid("maxTicksPerFrame must be > 0".into()));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid("events.capacity must be > 0".into()));
        }
        if !self.day_length_seconds.is_finite() || self.day_length_seconds <= 0.0 {
            return Err(ConfigError::Invalid(
                "dayLengthSeconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogLevel;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{ "timeSpeed": 4.0, "events": { "minLevel": "WARN" } }"#)
                .unwrap();

        assert_eq!(config.time_speed, 4.0);
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.events.min_level, LogLevel::Warn);
        assert_eq!(config.events.capacity, 1000);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for raw in [
            r#"{ "tickIntervalMs": 0 }"#,
            r#"{ "timeSpeed": -1.0 }"#,
            r#"{ "events": { "capacity": 0 } }"#,
        ] {
            let err = EngineConfig::from_json_str(raw).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{raw}: {err}");
        }
        assert!(matches!(
            EngineConfig::from_json_str("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "maxFrames": 42 }}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_frames, 42);

        let missing = EngineConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
