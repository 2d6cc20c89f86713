//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di una
//! sessione di ingestione da CLI.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif` (solo in modalità umana)
//! - `IngestStats`: contatori cumulativi per esito
//!
//! ## Statistiche tracciate:
//! - **files_processed**: totale upload elaborati
//! - **created**: nuovi record nel registry
//! - **duplicates**: upload saltati perché già presenti
//! - **failed**: upload falliti, per tipo di errore
//! - **bytes_in** / **bytes_out**: dimensione upload e output creati
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========>-------------------------------] 12/50 (24%) ✅ hero.png
//! ```

use crate::error::FailureKind;
use crate::file_manager::FileManager;
use crate::pipeline::{Outcome, ProcessingResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

/// Manages progress reporting for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress bar that draws nothing (JSON mode)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Advance by one with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Print a line above the bar without breaking it
    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Cumulative ingestion statistics
#[derive(Debug, Default)]
pub struct IngestStats {
    pub files_processed: usize,
    pub created: usize,
    pub duplicates: usize,
    pub failed: BTreeMap<FailureKind, usize>,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one result; `output_size` is the size of a created file
    pub fn record(&mut self, result: &ProcessingResult, input_size: u64, output_size: Option<u64>) {
        self.files_processed += 1;
        self.bytes_in += input_size;
        match &result.outcome {
            Outcome::Created { .. } => {
                self.created += 1;
                self.bytes_out += output_size.unwrap_or(0);
            }
            Outcome::DuplicateSkipped { .. } => self.duplicates += 1,
            Outcome::Failed { kind, .. } => *self.failed.entry(*kind).or_insert(0) += 1,
        }
    }

    pub fn errors(&self) -> usize {
        self.failed.values().sum()
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} files | Created: {} | Duplicates: {} | Failed: {} | In: {} | Out: {}",
            self.files_processed,
            self.created,
            self.duplicates,
            self.errors(),
            FileManager::format_size(self.bytes_in),
            FileManager::format_size(self.bytes_out),
        );
        if !self.failed.is_empty() {
            let detail: Vec<String> = self
                .failed
                .iter()
                .map(|(kind, count)| format!("{:?}: {}", kind, count))
                .collect();
            summary.push_str(&format!(" ({})", detail.join(", ")));
        }
        summary
    }
}
