//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per evento)
//! per i front-end che pilotano la CLI con `--json`.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio di un batch di ingestione
//! - `file_start`: inizio elaborazione di un upload
//! - `file_complete`: `ProcessingResult` di un upload
//! - `progress`: contatori correnti
//! - `complete`: fine batch con statistiche finali
//! - `records` / `tags` / `info` / `removed` / `tools`: risposte degli altri comandi
//! - `error`: errore che interrompe il comando

use crate::config::Config;
use crate::pipeline::{MediaInfo, ProcessingResult};
use crate::progress::IngestStats;
use crate::registry::MediaRecord;
use crate::tags::{TagCategory, TagDefinition};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        registry: PathBuf,
        total_files: usize,
        config: JsonConfig,
    },

    FileStart {
        path: PathBuf,
        size: u64,
        index: usize,
        total: usize,
    },

    FileComplete {
        index: usize,
        #[serde(flatten)]
        result: ProcessingResult,
    },

    Progress {
        current: usize,
        total: usize,
        percentage: f64,
        created: usize,
        duplicates: usize,
        errors: usize,
    },

    Complete {
        files_processed: usize,
        created: usize,
        duplicates: usize,
        errors: usize,
        bytes_in: u64,
        bytes_out: u64,
        duration_seconds: f64,
    },

    Records {
        registry: PathBuf,
        records: Vec<MediaRecord>,
    },

    Tags {
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        tags: Vec<TagDefinition>,
        #[serde(skip_serializing_if = "BTreeSet::is_empty")]
        orphans: BTreeSet<String>,
        categories: Vec<TagCategory>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        cycles: Vec<Vec<String>>,
    },

    Info {
        #[serde(flatten)]
        info: MediaInfo,
    },

    Removed {
        path: String,
        record: Option<MediaRecord>,
    },

    Tools {
        ffmpeg: Option<PathBuf>,
        ffprobe: Option<PathBuf>,
    },

    Error {
        message: String,
        details: Option<String>,
    },
}

/// Parametri di encoding riportati nel messaggio `start`
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub video_crf: u8,
    pub audio_bitrate: String,
    pub workers: usize,
}

impl From<&Config> for JsonConfig {
    fn from(config: &Config) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            max_width: config.max_width,
            max_height: config.max_height,
            video_crf: config.video_crf,
            audio_bitrate: config.audio_bitrate.clone(),
            workers: config.workers,
        }
    }
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn progress(current: usize, total: usize, stats: &IngestStats) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            current,
            total,
            percentage,
            created: stats.created,
            duplicates: stats.duplicates,
            errors: stats.errors(),
        }
    }

    pub fn complete(stats: &IngestStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            created: stats.created,
            duplicates: stats.duplicates,
            errors: stats.errors(),
            bytes_in: stats.bytes_in,
            bytes_out: stats.bytes_out,
            duration_seconds,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}
