//! Application configuration.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strand_audio::device_buffer_bytes;
use strand_core::{AudioCodec, Error, Result};
use tracing::debug;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "STRAND_CONFIG";

const CONFIG_FILE: &str = "config.json";

/// Settings for the encode, decode and playback pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub codec: AudioCodec,
    /// Used for generated input; files play at their own rate.
    pub sample_rate: u32,
    pub bit_rate: u64,
    /// Device buffer in frames.
    pub min_buffer_size: usize,
    /// Ring capacity in bytes, at least one device buffer.
    pub max_buffer_size: usize,
    /// Buffers retained by the pool.
    pub pool_size: usize,
    /// Output device name, default device when unset.
    pub output_device: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            codec: if cfg!(feature = "opus") {
                AudioCodec::Opus
            } else {
                AudioCodec::Pcm
            },
            sample_rate: 48_000,
            bit_rate: 128_000,
            min_buffer_size: 1024,
            // One second of 48 kHz stereo i16.
            max_buffer_size: 192_000,
            pool_size: 32,
            output_device: None,
        }
    }
}

impl AppConfig {
    /// Load from `$STRAND_CONFIG`, else the per-user config directory.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => match Self::default_path() {
                Some(path) => Self::load_from(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Invalid config {}: {e}", path.display())))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "strand", "Strand")?;
        Some(project_dirs.config_dir().join(CONFIG_FILE))
    }

    /// Check the values the pipeline cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.codec == AudioCodec::None {
            return Err(Error::Config("no codec selected".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".to_string()));
        }
        let device_bytes = device_buffer_bytes(self.min_buffer_size);
        if self.min_buffer_size == 0
            || !device_bytes.is_some_and(|bytes| bytes <= self.max_buffer_size)
        {
            return Err(Error::Config(format!(
                "max_buffer_size ({} bytes) must hold min_buffer_size ({} frames) of stereo i16",
                self.max_buffer_size, self.min_buffer_size
            )));
        }
        Ok(())
    }
}
