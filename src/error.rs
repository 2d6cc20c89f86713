//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `IngestError` per categorizzare tutti gli errori possibili
//! - Distingue gli errori per-file (riportati nel `ProcessingResult`) da quelli
//!   fatali per la sessione (`RegistryCorrupt`)
//! - Integra con `thiserror` per le conversioni automatiche
//!
//! ## Categorie di errori:
//! - `UnsupportedFormat`: né magic bytes né estensione riconosciuti
//! - `InvalidDimensions`: dimensioni sorgente nulle
//! - `Encode`: decode/encode fallito, exit code ffmpeg != 0, output vuoto
//! - `ToolUnavailable`: ffmpeg/ffprobe non installati
//! - `RegistryCorrupt`: documento JSON del registry illeggibile
//! - `Io` / `Image` / `Json`: errori di basso livello
//!
//! ## Esempio:
//! ```rust,ignore
//! if width == 0 || height == 0 {
//!     return Err(IngestError::InvalidDimensions { width, height });
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Custom error types for media ingestion
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Transcoder unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Registry document {path} is corrupt: {reason}")]
    RegistryCorrupt { path: PathBuf, reason: String },
}

/// Classification carried by a failed `ProcessingResult`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFormat,
    InvalidDimensions,
    EncodeError,
    ToolUnavailable,
    RegistryCorrupt,
    Io,
}

impl IngestError {
    /// Map an error onto the per-file failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
            IngestError::InvalidDimensions { .. } => FailureKind::InvalidDimensions,
            IngestError::Encode(_) | IngestError::Image(_) => FailureKind::EncodeError,
            IngestError::ToolUnavailable(_) => FailureKind::ToolUnavailable,
            IngestError::RegistryCorrupt { .. } => FailureKind::RegistryCorrupt,
            IngestError::Io(_) | IngestError::Json(_) => FailureKind::Io,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::RegistryCorrupt { .. })
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
