use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `relay.endpoint`.
pub const RELAY_URL_ENV: &str = "RELAY_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub relay: RelayConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Stream a test pattern instead of opening the Pi camera.
    pub simulate: bool,
    pub preview_width: u32,
    pub preview_height: u32,
    /// JPEG quality (0-100) of the rolling preview file.
    pub preview_quality: u8,
    pub preview_path: PathBuf,
    pub warmup_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub countdown_seconds: u32,
    /// Still-image quality on a 0-1 scale.
    pub jpeg_quality: f32,
    /// Submit as soon as a photo is captured.
    pub auto_submit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub endpoint: String,
    /// Request field carrying the data-URI image.
    pub image_field: String,
    /// Response field carrying the base-64 certificate.
    pub artifact_field: String,
    /// Response field carrying the error description on failure.
    pub error_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub download_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                width: 800,
                height: 1000,
                fullscreen: true,
            },
            camera: CameraConfig {
                simulate: false,
                preview_width: 720,  // Portrait 4:5, as the booth frame expects
                preview_height: 900,
                preview_quality: 85,
                preview_path: PathBuf::from("/tmp/appreciator_camera_preview.jpg"),
                warmup_ms: 500,
            },
            capture: CaptureConfig {
                countdown_seconds: 3,
                jpeg_quality: 0.9,
                auto_submit: false,
            },
            relay: RelayConfig {
                endpoint: "http://localhost:3000/api/process-image".to_string(),
                image_field: "image".to_string(),
                artifact_field: "certificate".to_string(),
                error_field: "error".to_string(),
            },
            paths: PathConfig {
                download_dir: PathBuf::from("downloads"),
                config_file: PathBuf::from("booth_config.toml"),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("booth_config.toml");

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
            default_config
        };

        if let Ok(endpoint) = std::env::var(RELAY_URL_ENV) {
            log::info!("Relay endpoint overridden by {}: {}", RELAY_URL_ENV, endpoint);
            config.relay.endpoint = endpoint;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow::anyhow!("Invalid display dimensions"));
        }

        if self.camera.preview_width == 0 || self.camera.preview_height == 0 {
            return Err(anyhow::anyhow!("Invalid camera preview dimensions"));
        }

        if self.camera.preview_quality == 0 || self.camera.preview_quality > 100 {
            return Err(anyhow::anyhow!(
                "Invalid preview quality: {}",
                self.camera.preview_quality
            ));
        }

        if !(1..=10).contains(&self.capture.countdown_seconds) {
            return Err(anyhow::anyhow!(
                "Countdown must be between 1 and 10 seconds, got {}",
                self.capture.countdown_seconds
            ));
        }

        if !(self.capture.jpeg_quality > 0.0 && self.capture.jpeg_quality <= 1.0) {
            return Err(anyhow::anyhow!(
                "JPEG quality must be in (0, 1], got {}",
                self.capture.jpeg_quality
            ));
        }

        reqwest::Url::parse(&self.relay.endpoint)
            .with_context(|| format!("Invalid relay endpoint: {}", self.relay.endpoint))?;

        for (name, value) in [
            ("image_field", &self.relay.image_field),
            ("artifact_field", &self.relay.artifact_field),
            ("error_field", &self.relay.error_field),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("Relay {} must not be empty", name));
            }
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.download_dir)
            .with_context(|| format!("Failed to create download directory: {}",
                self.paths.download_dir.display()))?;

        log::info!("Created necessary directories");
        Ok(())
    }
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn display_size(mut self, width: u32, height: u32) -> Self {
        self.config.display.width = width;
        self.config.display.height = height;
        self
    }

    pub fn fullscreen(mut self, enabled: bool) -> Self {
        self.config.display.fullscreen = enabled;
        self
    }

    pub fn simulate_camera(mut self, enabled: bool) -> Self {
        self.config.camera.simulate = enabled;
        self
    }

    pub fn countdown_seconds(mut self, seconds: u32) -> Self {
        self.config.capture.countdown_seconds = seconds;
        self
    }

    pub fn jpeg_quality(mut self, quality: f32) -> Self {
        self.config.capture.jpeg_quality = quality;
        self
    }

    pub fn auto_submit(mut self, enabled: bool) -> Self {
        self.config.capture.auto_submit = enabled;
        self
    }

    pub fn relay_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.relay.endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Environment-specific configuration presets
impl Config {
    pub fn kiosk_portrait() -> Self {
        Config {
            display: DisplayConfig {
                width: 1080,
                height: 1920,
                fullscreen: true,
            },
            ..Default::default()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 1000,
                fullscreen: false,
            },
            camera: CameraConfig {
                simulate: true,
                warmup_ms: 200,
                ..Config::default().camera
            },
            ..Default::default()
        }
    }
}
