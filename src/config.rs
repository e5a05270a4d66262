use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const DEFAULT_TRANSCODER_PATH: &str = "/usr/bin/ffmpeg";
pub const DEFAULT_PROBE_PATH: &str = "/usr/bin/ffprobe";
pub const DEFAULT_FALLBACK_DURATION: f64 = 100.0;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Tool locations and encoder defaults.
///
/// Every key may be omitted from the JSON file; `FFMPEG_PATH` and
/// `FFPROBE_PATH` override whatever the file says.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub transcoder_path: PathBuf,
    pub probe_path: PathBuf,
    pub fallback_duration: f64,
    pub probe_timeout_secs: u64,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transcoder_path: PathBuf::from(DEFAULT_TRANSCODER_PATH),
            probe_path: PathBuf::from(DEFAULT_PROBE_PATH),
            fallback_duration: DEFAULT_FALLBACK_DURATION,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            video_codec: String::from("h264"),
            audio_codec: String::from("aac"),
            audio_bitrate: String::from("192k"),
        }
    }
}

impl Config {
    /// Loads the optional config file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Config::default(),
            Some(path) => Config::from_file(path)?,
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FFMPEG_PATH") {
            debug!(path = %path, "transcoder path from FFMPEG_PATH");
            self.transcoder_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("FFPROBE_PATH") {
            debug!(path = %path, "probe path from FFPROBE_PATH");
            self.probe_path = PathBuf::from(path);
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Checks the configuration once at startup.
    ///
    /// An empty value is `NotConfigured`; a value that is set but cannot work
    /// is `Nonfunctional`. A missing probe tool only warns, since the duration
    /// falls back.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_executable("transcoder_path", &self.transcoder_path)?;

        if self.probe_path.as_os_str().is_empty() {
            warn!("probe_path is not configured; progress will use the fallback duration");
        } else if let Err(err) = check_executable("probe_path", &self.probe_path) {
            warn!("{err}; progress will use the fallback duration");
        }

        if !self.fallback_duration.is_finite() || self.fallback_duration <= 0.0 {
            return Err(ConfigError::Nonfunctional {
                key: "fallback_duration",
                reason: format!("{} is not a positive number of seconds", self.fallback_duration),
            });
        }

        for (key, value) in [
            ("video_codec", &self.video_codec),
            ("audio_codec", &self.audio_codec),
            ("audio_bitrate", &self.audio_bitrate),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::NotConfigured(key));
            }
        }

        Ok(())
    }
}

fn check_executable(key: &'static str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::NotConfigured(key));
    }
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(ConfigError::Nonfunctional {
            key,
            reason: format!("{:?} is not a file", path),
        }),
        Err(err) => Err(ConfigError::Nonfunctional {
            key,
            reason: format!("{:?}: {}", path, err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_tools(dir: &Path) -> Config {
        let transcoder = dir.join("ffmpeg");
        let probe = dir.join("ffprobe");
        fs::write(&transcoder, "").unwrap();
        fs::write(&probe, "").unwrap();
        Config {
            transcoder_path: transcoder,
            probe_path: probe,
            ..Config::default()
        }
    }

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.transcoder_path, PathBuf::from(DEFAULT_TRANSCODER_PATH));
        assert_eq!(config.fallback_duration, 100.0);
        assert_eq!(config.video_codec, "h264");
        assert_eq!(config.audio_codec, "aac");
        assert_eq!(config.audio_bitrate, "192k");
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "transcoder_path": "/opt/ffmpeg/bin/ffmpeg", "fallback_duration": 60.0 }}"#).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.transcoder_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.fallback_duration, 60.0);
        assert_eq!(config.probe_path, PathBuf::from(DEFAULT_PROBE_PATH));
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "ffmpeg": "/opt/ffmpeg" }}"#).unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/convert-mp4.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_overrides() {
        let config = Config::default().with_overrides(|key| match key {
            "FFMPEG_PATH" => Some(String::from("/tmp/ffmpeg")),
            _ => None,
        });
        assert_eq!(config.transcoder_path, PathBuf::from("/tmp/ffmpeg"));
        assert_eq!(config.probe_path, PathBuf::from(DEFAULT_PROBE_PATH));
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_with_tools(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            transcoder_path: PathBuf::new(),
            ..config_with_tools(dir.path())
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotConfigured("transcoder_path"))));
    }

    #[test]
    fn test_validate_nonfunctional() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            transcoder_path: dir.path().join("missing"),
            ..config_with_tools(dir.path())
        };
        assert!(matches!(config.validate(), Err(ConfigError::Nonfunctional { key: "transcoder_path", .. })));

        let config = Config {
            transcoder_path: dir.path().to_path_buf(),
            ..config_with_tools(dir.path())
        };
        assert!(matches!(config.validate(), Err(ConfigError::Nonfunctional { key: "transcoder_path", .. })));

        let config = Config {
            fallback_duration: 0.0,
            ..config_with_tools(dir.path())
        };
        assert!(matches!(config.validate(), Err(ConfigError::Nonfunctional { key: "fallback_duration", .. })));
    }

    #[test]
    fn test_validate_missing_probe_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            probe_path: dir.path().join("missing"),
            ..config_with_tools(dir.path())
        };
        assert!(config.validate().is_ok());
    }
}
