//! Configuration for detlink.
//!
//! Loaded from ./detlink.yml or ~/.config/detlink/detlink.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detection::{CanvasSize, ModelResolution};
use crate::error::DetlinkError;
use crate::net::address::validate_host;
use crate::net::codec::Framing;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Peer address.
    pub connection: ConnectionConfig,

    /// Read loop and framing settings.
    pub stream: StreamConfig,

    /// Input resolution the inference model works in.
    pub model: ModelConfig,

    /// Destination canvas for mapped detections.
    pub canvas: CanvasConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. detlink.yml in current directory
    /// 3. ~/.config/detlink/detlink.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        let project_config = PathBuf::from(format!("{}.yml", project_name));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", project_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), DetlinkError> {
        validate_host(&self.connection.host)?;
        if self.connection.port == 0 {
            return Err(DetlinkError::Validation("connection.port must be > 0".into()));
        }
        if self.stream.read_buffer_bytes == 0 {
            return Err(DetlinkError::Validation("stream.read-buffer-bytes must be > 0".into()));
        }
        if self.stream.max_frame_bytes == 0 {
            return Err(DetlinkError::Validation("stream.max-frame-bytes must be > 0".into()));
        }
        // A raw frame is one read, so the read buffer bounds it
        if self.stream.read_buffer_bytes > self.stream.max_frame_bytes {
            return Err(DetlinkError::Validation(format!(
                "stream.read-buffer-bytes ({}) must not exceed stream.max-frame-bytes ({})",
                self.stream.read_buffer_bytes, self.stream.max_frame_bytes
            )));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(DetlinkError::Validation("model input resolution must be > 0".into()));
        }
        if !(self.canvas.width > 0.0 && self.canvas.height > 0.0) {
            return Err(DetlinkError::Validation("canvas size must be positive".into()));
        }
        Ok(())
    }
}

/// Peer address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Target host, IPv4 dotted quad.
    pub host: String,

    /// Target port.
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.68.102".to_string(),
            port: 8080,
        }
    }
}

/// Read loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// How message boundaries are recovered from the byte stream.
    pub framing: Framing,

    /// Size of the buffer handed to each read.
    #[serde(rename = "read-buffer-bytes")]
    pub read_buffer_bytes: usize,

    /// Largest frame accepted by the line and length-prefixed codecs.
    #[serde(rename = "max-frame-bytes")]
    pub max_frame_bytes: usize,

    /// Interval between ticks when the client drives itself.
    #[serde(rename = "tick-interval-ms")]
    pub tick_interval_ms: u64,
}

impl StreamConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            read_buffer_bytes: 4096,
            max_frame_bytes: 1024 * 1024,
            tick_interval_ms: 16,
        }
    }
}

/// Inference model input resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(rename = "input-width")]
    pub input_width: u32,

    #[serde(rename = "input-height")]
    pub input_height: u32,
}

impl ModelConfig {
    pub fn resolution(&self) -> ModelResolution {
        ModelResolution::new(self.input_width, self.input_height)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_width: 1024,
            input_height: 1024,
        }
    }
}

/// Destination canvas.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
}

impl CanvasConfig {
    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.width, self.height)
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}
