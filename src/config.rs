//! Configuration file handling for photobooth.
//!
//! Loads configuration from `~/.config/photobooth/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{
    ApiError, SessionClient, API_KEY_ENV, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT,
    DEFAULT_UPLOAD_TIMEOUT,
};
use crate::camera::DeviceClass;
use crate::orchestrator::{
    OrchestratorSettings, CAMERA_SETTLE_DELAY, CAPTURE_SETTLE_DELAY, DEFAULT_CAPTURE_TIMEOUT,
    DEFAULT_COUNTDOWN_SECONDS,
};
use crate::photo::{JpegNormalizer, PhotoCache, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

/// Default cache size cap in megabytes.
pub const DEFAULT_CACHE_MAX_MB: u64 = 200;

/// Configuration file structure for photobooth.
/// Loaded from ~/.config/photobooth/config.toml (or custom path via --config).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_class: DeviceClass,
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
    #[serde(default = "default_camera_settle_ms")]
    pub camera_settle_ms: u64,
    #[serde(default = "default_capture_settle_ms")]
    pub capture_settle_ms: u64,
    /// Path to the ffmpeg binary (default: found on PATH)
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::default(),
            countdown_seconds: default_countdown_seconds(),
            capture_timeout_secs: default_capture_timeout_secs(),
            camera_settle_ms: default_camera_settle_ms(),
            capture_settle_ms: default_capture_settle_ms(),
            ffmpeg: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            quality: default_quality(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory (default: platform cache dir)
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_cache_max_mb")]
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_size_mb: default_cache_max_mb(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_upload_timeout_secs() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT.as_secs()
}

fn default_countdown_seconds() -> u32 {
    DEFAULT_COUNTDOWN_SECONDS
}

fn default_capture_timeout_secs() -> u64 {
    DEFAULT_CAPTURE_TIMEOUT.as_secs()
}

fn default_camera_settle_ms() -> u64 {
    CAMERA_SETTLE_DELAY.as_millis() as u64
}

fn default_capture_settle_ms() -> u64 {
    CAPTURE_SETTLE_DELAY.as_millis() as u64
}

fn default_max_dimension() -> u32 {
    DEFAULT_MAX_DIMENSION
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_cache_max_mb() -> u64 {
    DEFAULT_CACHE_MAX_MB
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Timing knobs for the orchestrator. Zero timeouts fall back to defaults.
    ///
    /// The upload timeout must exceed the request timeout; a shorter one is
    /// raised to twice the request timeout.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let defaults = OrchestratorSettings::default();
        let request_timeout = self.request_timeout();
        let mut upload_timeout =
            non_zero_secs(self.api.upload_timeout_secs).unwrap_or(defaults.upload_timeout);
        if upload_timeout <= request_timeout {
            log::warn!(
                "upload_timeout_secs ({}) must be longer than request_timeout_secs ({}); using {}",
                upload_timeout.as_secs(),
                request_timeout.as_secs(),
                (request_timeout * 2).as_secs()
            );
            upload_timeout = request_timeout * 2;
        }
        OrchestratorSettings {
            capture_settle: Duration::from_millis(self.camera.capture_settle_ms),
            camera_settle: Duration::from_millis(self.camera.camera_settle_ms),
            capture_timeout: non_zero_secs(self.camera.capture_timeout_secs)
                .unwrap_or(defaults.capture_timeout),
            upload_timeout,
            ..defaults
        }
    }

    fn request_timeout(&self) -> Duration {
        non_zero_secs(self.api.request_timeout_secs).unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn normalizer(&self) -> JpegNormalizer {
        JpegNormalizer::new(self.image.max_dimension, self.image.quality)
    }

    /// Session client for the configured backend. The API key comes from the
    /// environment.
    pub fn session_client(&self) -> Result<SessionClient, ApiError> {
        SessionClient::with_timeout(
            self.api.base_url.clone(),
            std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            self.request_timeout(),
        )
    }

    pub fn photo_cache(&self) -> PhotoCache {
        let dir = self.cache.dir.clone().unwrap_or_else(PhotoCache::default_dir);
        PhotoCache::new(dir)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("photobooth").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/photobooth/config.toml")
        })
}

/// Contents written by `photobooth config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# photobooth configuration

[api]
# Session API base URL
base_url = "http://localhost:3000/api"
# Timeout for ordinary API requests, in seconds
request_timeout_secs = 30
# Timeout for the photo upload, in seconds (encoding included)
upload_timeout_secs = 60

[camera]
# Device class: "tablet-or-tv" prefers external cameras, "phone" built-in ones
device_class = "tablet-or-tv"
# Countdown length before each capture
countdown_seconds = 3
# Upper bound for a single exposure, in seconds
capture_timeout_secs = 10
# Pause after releasing a camera before opening another, in milliseconds
camera_settle_ms = 300
# Pause between the end of the countdown and the exposure, in milliseconds
capture_settle_ms = 100
# ffmpeg binary (default: found on PATH)
# ffmpeg = "/opt/homebrew/bin/ffmpeg"

[image]
# Longest edge of the uploaded JPEG, in pixels
max_dimension = 1920
# JPEG quality, 1-100
quality = 85

[cache]
# Cache directory (default: platform cache dir)
# dir = "/var/cache/photobooth"
# Size cap before the oldest photos are removed, in megabytes
max_size_mb = 200
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/photobooth.toml"))).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api.upload_timeout_secs, 60);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.camera.device_class, DeviceClass::TabletOrTv);
        assert_eq!(config.image.max_dimension, 1920);
        assert_eq!(config.image.quality, 85);
    }

    #[test]
    fn test_partial_file_keeps_field_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[camera]\ndevice_class = \"phone\"\ncountdown_seconds = 5").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.camera.device_class, DeviceClass::Phone);
        assert_eq!(config.camera.countdown_seconds, 5);
        assert_eq!(config.camera.capture_timeout_secs, 10);
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[camera\ncountdown_seconds = ").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_orchestrator_settings_from_config() {
        let mut config = Config::default();
        config.api.upload_timeout_secs = 90;
        config.camera.camera_settle_ms = 500;
        config.camera.capture_timeout_secs = 0;

        let settings = config.orchestrator_settings();
        assert_eq!(settings.upload_timeout, Duration::from_secs(90));
        assert_eq!(settings.camera_settle, Duration::from_millis(500));
        assert_eq!(settings.capture_timeout, DEFAULT_CAPTURE_TIMEOUT);
        assert_eq!(settings.countdown_tick, Duration::from_secs(1));
    }

    #[test]
    fn test_upload_timeout_not_longer_than_request_timeout_is_raised() {
        let mut config = Config::default();
        config.api.request_timeout_secs = 45;
        config.api.upload_timeout_secs = 45;
        assert_eq!(
            config.orchestrator_settings().upload_timeout,
            Duration::from_secs(90)
        );

        config.api.request_timeout_secs = 0;
        config.api.upload_timeout_secs = 20;
        assert_eq!(
            config.orchestrator_settings().upload_timeout,
            Duration::from_secs(60)
        );

        config.api.upload_timeout_secs = 31;
        assert_eq!(
            config.orchestrator_settings().upload_timeout,
            Duration::from_secs(31)
        );
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = default_path();
        assert!(path.ends_with("photobooth/config.toml"));
    }
}
