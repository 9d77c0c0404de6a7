use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Result, StreamerError};

const MAX_FPS: u32 = 240;

/// Runtime settings for a streaming session. Every field has a default so a
/// settings file only needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub host: String,
    pub port: u16,
    pub fps: u32,
    pub ramp_duration_secs: f32,
    pub hold_secs: f32,
    pub channels_path: Option<String>,
    pub library_path: Option<String>,
    /// Stream synthetic forearm signals instead of the channel table.
    pub mock: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            fps: 60,
            ramp_duration_secs: 1.5,
            hold_secs: 0.0,
            channels_path: None,
            library_path: None,
            mock: false,
        }
    }
}

impl StreamSettings {
    /// Reads settings from a JSON file, filling missing fields with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&data).map_err(|err| {
            StreamerError::config(format!("settings file {}: {err}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(StreamerError::config(format!(
                "fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        if !self.ramp_duration_secs.is_finite() || !self.hold_secs.is_finite() {
            return Err(StreamerError::config("ramp and hold durations must be finite"));
        }
        Ok(())
    }

    /// Time between two ticks at the configured frame rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    /// Ramp duration; negative or non-finite values collapse to zero.
    pub fn ramp_duration(&self) -> Duration {
        secs_or_zero(self.ramp_duration_secs)
    }

    pub fn hold(&self) -> Duration {
        secs_or_zero(self.hold_secs)
    }

    /// `host:port` of the OSC receiver.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn secs_or_zero(secs: f32) -> Duration {
    Duration::try_from_secs_f32(secs.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 9001, "hold_secs": 0.5 }}"#).unwrap();

        let settings = StreamSettings::load(file.path()).unwrap();
        assert_eq!(settings.port, 9001);
        assert_eq!(settings.hold_secs, 0.5);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.fps, 60);
        assert!(!settings.mock);
        assert_eq!(settings.target(), "127.0.0.1:9001");
    }

    #[test]
    fn rejects_zero_fps() {
        let settings = StreamSettings {
            fps: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(StreamerError::Config(_))));
    }

    #[test]
    fn frame_interval_matches_fps() {
        let settings = StreamSettings {
            fps: 50,
            ..Default::default()
        };
        assert_eq!(settings.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn negative_durations_collapse_to_zero() {
        let settings = StreamSettings {
            ramp_duration_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(settings.ramp_duration(), Duration::ZERO);
    }
}
