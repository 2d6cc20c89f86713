//! # File Management Module
//!
//! Questo modulo gestisce le convenzioni sui path del registry e le
//! operazioni sui file di input.
//!
//! ## Responsabilità:
//! - `RegistryLocation`: documento registry, directory media, tag registry
//! - Normalizzazione path (sempre forward slash nei record)
//! - Nome file di output: stem sanificato + estensione canonica
//! - Discovery ricorsiva dei file da ingerire (CLI)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Layout su disco:
//! ```text
//! D/
//! ├── media_registry.json
//! ├── tag_registry.json
//! └── media/
//!     ├── hero.png
//!     └── walk-cycle.webm
//! ```

use crate::format::{OutputFormat, SourceFormat};
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_REGISTRY_FILE: &str = "media_registry.json";
pub const TAG_REGISTRY_FILE: &str = "tag_registry.json";
pub const MEDIA_DIR: &str = "media";

/// Filesystem location of a registry and its companions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocation {
    registry_file: PathBuf,
}

impl RegistryLocation {
    /// Accepts either the registry document or the directory holding it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_document = !path.is_dir()
            && path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let registry_file = if is_document {
            path
        } else {
            path.join(DEFAULT_REGISTRY_FILE)
        };
        Self { registry_file }
    }

    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    /// Directory containing the registry document
    pub fn base_dir(&self) -> PathBuf {
        match self.registry_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn media_dir(&self) -> PathBuf {
        self.base_dir().join(MEDIA_DIR)
    }

    pub fn tag_registry_file(&self) -> PathBuf {
        self.base_dir().join(TAG_REGISTRY_FILE)
    }

    /// Absolute-ish path of a record's relative `path`
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.base_dir().join(relative)
    }

    /// Nome visualizzato: la directory che contiene il registry
    pub fn display_name(&self) -> String {
        let base = self.base_dir();
        let base = base.canonicalize().unwrap_or(base);
        base.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_REGISTRY_FILE.to_string())
    }
}

/// Manages file naming and discovery
pub struct FileManager;

impl FileManager {
    /// Normalize path to use forward slashes
    pub fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// `media/<name>` relative record path
    pub fn record_path(file_name: &str) -> String {
        Self::normalize_path(&format!("{}/{}", MEDIA_DIR, file_name))
    }

    /// Output filename for an upload: sanitized stem + canonical extension
    pub fn output_file_name(upload_name: &str, output: OutputFormat) -> String {
        let normalized = Self::normalize_path(upload_name);
        let base = normalized.rsplit('/').next().unwrap_or("");
        let stem = Path::new(base)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let sanitized: String = stem
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let sanitized = sanitized.trim().trim_matches('.');
        let stem = if sanitized.is_empty() { "upload" } else { sanitized };

        format!("{}.{}", stem, output.extension())
    }

    /// Split `name.ext` into (`name`, `.ext`); the extension part may be empty
    pub fn split_extension(file_name: &str) -> (&str, &str) {
        match file_name.rfind('.') {
            Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx..]),
            _ => (file_name, ""),
        }
    }

    /// Expand files and directories into the list of supported inputs
    pub fn find_media_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                files.push(input.clone());
                continue;
            }
            if !input.exists() {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }

            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if Self::is_supported_format(path) {
                    files.push(path.to_path_buf());
                }
            }
        }

        Ok(files)
    }

    /// Check if a file extension is a recognized input format
    pub fn is_supported_format(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(SourceFormat::from_extension)
            .is_some()
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
