use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::exif::validate_template;

/// Top-level configuration for the camjpeg tools.
///
/// Controls encode quality, which capture metadata is embedded, and where
/// output files go.
///
/// # Loading
///
/// ```rust,no_run
/// use camjpeg::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.encode.quality = 90;
/// config.exif.description = Some("front door %Y-%m-%d".into());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub encode: EncodeConfig,
    /// Which capture metadata is written into encoded images.
    pub exif: ExifConfig,
    pub output: OutputConfig,
}

/// Compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// JPEG quality, 1-100.
    pub quality: u8,
    /// Encode the luma plane only.
    pub greyscale: bool,
}

/// Controls the EXIF segment attached to encoded images.
///
/// # Example
///
/// ```rust
/// use camjpeg::config::ExifConfig;
///
/// let exif = ExifConfig {
///     enabled: true,
///     description: Some("%Y-%m-%d %H:%M:%S camera 1".into()),
///     subsec: true,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExifConfig {
    /// If `false`, images are written without any EXIF segment.
    pub enabled: bool,
    /// strftime template expanded against the capture time into
    /// ImageDescription. `None` or empty writes no description.
    pub description: Option<String>,
    /// Write the millisecond part of the capture time.
    pub subsec: bool,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, encode/decode in memory but write nothing.
    pub dry_run: bool,
    /// If `true`, replace existing output files.
    pub overwrite: bool,
    /// Directory for output files. Defaults to next to each input.
    pub output_dir: Option<PathBuf>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: 75,
            greyscale: false,
        }
    }
}

impl Default for ExifConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            description: None,
            subsec: false,
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject settings the codec would refuse later.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.encode.quality) {
            bail!("quality must be 1-100, got {}", self.encode.quality);
        }
        if let Some(template) = self.exif.description.as_deref() {
            validate_template(template).context("Invalid exif.description")?;
        }
        Ok(())
    }
}
