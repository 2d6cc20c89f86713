//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline di ingestione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di encoding
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Ricorda l'ultimo registry usato dal front-end (`last_registry`)
//!
//! ## Parametri di configurazione:
//! - `jpeg_quality`: Qualità JPEG (1-100, default: 90)
//! - `max_width` / `max_height`: Bounding box di output (default: 576x1024)
//! - `default_fps`: Frame rate per animazioni senza delay (default: 24)
//! - `video_crf`: CRF VP9 (0-63, default: 30)
//! - `audio_bitrate`: Bitrate Opus (default: "96k")
//! - `workers`: Ingestioni concorrenti per batch (default: 2)
//! - `ffmpeg_path` / `ffprobe_path`: Override espliciti dei tool
//! - `last_registry`: Ultimo registry usato (gestito dalla CLI)
//!
//! ## Esempio:
//! ```rust
//! use media_ingest::Config;
//!
//! let config = Config {
//!     jpeg_quality: 85,
//!     workers: 4,
//!     ..Default::default()
//! };
//! config.validate()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Nome del file di configurazione sotto la home dell'utente
const CONFIG_DIR: &str = ".media-ingest";
const CONFIG_FILE: &str = "config.json";

/// Configuration for media ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Output bounding box width
    pub max_width: u32,
    /// Output bounding box height
    pub max_height: u32,
    /// Frame rate used when an animation carries no delay metadata
    pub default_fps: f64,
    /// VP9 CRF value (0-63, lower = better quality)
    pub video_crf: u8,
    /// Opus audio bitrate
    pub audio_bitrate: String,
    /// Number of concurrent ingestions in a batch
    pub workers: usize,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary
    pub ffprobe_path: Option<PathBuf>,
    /// Registry document used by the last CLI session
    pub last_registry: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            max_width: 576,
            max_height: 1024,
            default_fps: 24.0,
            video_crf: 30,
            audio_bitrate: "96k".to_string(),
            workers: 2,
            ffmpeg_path: None,
            ffprobe_path: None,
            last_registry: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        if self.max_width == 0 || self.max_height == 0 {
            return Err(anyhow::anyhow!("Bounding box dimensions must be greater than 0"));
        }

        if !(self.default_fps > 0.0 && self.default_fps <= 120.0) {
            return Err(anyhow::anyhow!("Default frame rate must be between 0 and 120"));
        }

        if self.video_crf > 63 {
            return Err(anyhow::anyhow!("Video CRF must be between 0 and 63"));
        }

        if self.audio_bitrate.trim().is_empty() {
            return Err(anyhow::anyhow!("Audio bitrate must not be empty"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    /// Default config file location (`~/.media-ingest/config.json`)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Last registry if it still exists on disk
    pub fn remembered_registry(&self) -> Option<&Path> {
        match self.last_registry.as_deref() {
            Some(path) if path.exists() => Some(path),
            Some(path) => {
                tracing::warn!(
                    "Saved registry path {} does not exist, ignoring it",
                    path.display()
                );
                None
            }
            None => None,
        }
    }
}
