//! # Media Registry Module
//!
//! Questo modulo gestisce il registry dei media processati.
//!
//! ## Responsabilità:
//! - Carica il documento `media_registry.json` interamente in memoria
//! - Mantiene l'ordine di inserimento (= ordine di upload)
//! - Lookup per hash (deduplicazione) e per path
//! - Prenotazione di nomi file univoci (`a.png`, `a-1.png`, `a-2.png`, ...)
//! - Append/remove con riscrittura atomica dell'intero documento
//!
//! ## Strategia di persistence:
//! - Ogni mutazione prende il lock di processo del documento, rilegge il file,
//!   applica la modifica e sostituisce il file (temp + rename)
//! - File mancante = registry vuoto; JSON malformato = `RegistryCorrupt`
//! - I campi sconosciuti dei record vengono conservati
//!
//! ## Esempio struttura registry:
//! ```json
//! [
//!   {
//!     "path": "media/hero.png",
//!     "original_hash": "9f86d081884c7d65...",
//!     "added_at": 1718000000000,
//!     "format": "png",
//!     "width": 576,
//!     "height": 960
//!   }
//! ]
//! ```

use crate::error::{IngestError, Result};
use crate::file_manager::{FileManager, RegistryLocation, MEDIA_DIR};
use crate::format::OutputFormat;
use crate::persist;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A processed media entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub path: String,
    #[serde(rename = "original_hash", alias = "content_hash", default)]
    pub content_hash: String,
    #[serde(default)]
    pub added_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Campi sconosciuti, riscritti così come sono stati letti
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaRecord {
    pub fn new(path: String, content_hash: String) -> Self {
        Self {
            path,
            content_hash,
            added_at: now_millis(),
            format: None,
            width: None,
            height: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Filename component of the record path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Outcome of an append
#[derive(Debug, Clone, PartialEq)]
pub enum Appended {
    Inserted(MediaRecord),
    /// A record with the same content hash was already present
    Duplicate(MediaRecord),
}

/// Lazy chronological view over the in-memory records
pub struct Chronological<'a> {
    inner: std::slice::Iter<'a, MediaRecord>,
    most_recent_first: bool,
}

impl<'a> Iterator for Chronological<'a> {
    type Item = &'a MediaRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.most_recent_first {
            self.inner.next_back()
        } else {
            self.inner.next()
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Durable ordered collection of media records
pub struct MediaRegistry {
    location: RegistryLocation,
    records: Vec<MediaRecord>,
    reserved: HashSet<String>,
}

impl MediaRegistry {
    /// Load the registry document at `location`
    pub async fn load(location: RegistryLocation) -> Result<Self> {
        let records: Vec<MediaRecord> = persist::read_json(location.registry_file())
            .await?
            .unwrap_or_default();

        debug!(
            "Loaded registry {} with {} records",
            location.registry_file().display(),
            records.len()
        );

        Ok(Self {
            location,
            records,
            reserved: HashSet::new(),
        })
    }

    pub fn location(&self) -> &RegistryLocation {
        &self.location
    }

    pub fn display_name(&self) -> String {
        self.location.display_name()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record with a matching content hash
    pub fn find_by_hash(&self, hash: &str) -> Option<&MediaRecord> {
        if hash.is_empty() {
            return None;
        }
        self.records.iter().find(|r| r.content_hash == hash)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&MediaRecord> {
        let path = FileManager::normalize_path(path);
        self.records.iter().find(|r| r.path == path)
    }

    /// Record by chronological index, most recent first
    pub fn get(&self, index: usize) -> Option<&MediaRecord> {
        self.iter_chronological(true).nth(index)
    }

    pub fn iter_chronological(&self, most_recent_first: bool) -> Chronological<'_> {
        Chronological {
            inner: self.records.iter(),
            most_recent_first,
        }
    }

    /// Reserve a unique `media/<name>` path, suffixing `-1`, `-2`, ... on collision
    pub async fn reserve_path(&mut self, proposed_name: &str) -> String {
        let (stem, ext) = FileManager::split_extension(proposed_name);
        let mut candidate = proposed_name.to_string();
        let mut counter = 0;

        while self.name_taken(&candidate).await {
            counter += 1;
            candidate = format!("{}-{}{}", stem, counter, ext);
        }

        let path = FileManager::record_path(&candidate);
        debug!("Reserved output path: {}", path);
        self.reserved.insert(path.clone());
        path
    }

    /// Drop a reservation that never got committed
    pub fn release_path(&mut self, path: &str) {
        self.reserved.remove(path);
    }

    async fn name_taken(&self, file_name: &str) -> bool {
        let path = FileManager::record_path(file_name);
        self.records.iter().any(|r| r.file_name() == file_name)
            || self.reserved.contains(&path)
            || persist::exists(&self.location.media_dir().join(file_name)).await
    }

    /// Append a record at the end of the sequence and persist
    pub async fn append(&mut self, mut record: MediaRecord) -> Result<Appended> {
        record.path = FileManager::normalize_path(&record.path);
        let reserved_path = record.path.clone();

        let outcome = self
            .update(move |records| {
                if let Some(existing) = records
                    .iter()
                    .find(|r| !record.content_hash.is_empty() && r.content_hash == record.content_hash)
                {
                    return Ok(Appended::Duplicate(existing.clone()));
                }
                if records.iter().any(|r| r.path == record.path) {
                    return Err(IngestError::Io(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("registry already contains {}", record.path),
                    )));
                }
                if let Some(last) = records.last() {
                    record.added_at = record.added_at.max(last.added_at);
                }
                records.push(record.clone());
                Ok(Appended::Inserted(record))
            })
            .await;

        self.reserved.remove(&reserved_path);
        let outcome = outcome?;
        if let Appended::Inserted(ref record) = outcome {
            info!("Registered {} ({} total)", record.path, self.records.len());
        }
        Ok(outcome)
    }

    /// Remove a record and its backing file. No-op when the path is unknown.
    pub async fn remove(&mut self, path: &str) -> Result<Option<MediaRecord>> {
        let path = FileManager::normalize_path(path);
        let target = path.clone();

        let removed = self
            .update(move |records| {
                let index = records.iter().position(|r| r.path == target);
                Ok(index.map(|i| records.remove(i)))
            })
            .await?;

        if let Some(ref record) = removed {
            if is_media_path(&record.path) {
                let file = self.location.resolve(&record.path);
                match tokio::fs::remove_file(&file).await {
                    Ok(()) => debug!("Deleted media file {}", file.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to delete media file {}: {}", file.display(), e),
                }
            } else {
                warn!("Not deleting {}: outside the media directory", record.path);
            }
            info!("Removed {} from registry", record.path);
        } else {
            debug!("Remove requested for unknown path {}", path);
        }

        Ok(removed)
    }

    /// Drop every record; media files are left on disk
    pub async fn clear(&mut self) -> Result<()> {
        self.update(|records| {
            records.clear();
            Ok(())
        })
        .await
    }

    /// Read-modify-write under the document lock
    async fn update<F, R>(&mut self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<MediaRecord>) -> Result<R>,
    {
        let file = self.location.registry_file().to_path_buf();
        let lock = persist::document_lock(&file);
        let _guard = lock.lock().await;

        let mut records: Vec<MediaRecord> = persist::read_json(&file).await?.unwrap_or_default();
        let before = records.clone();
        let result = mutate(&mut records)?;

        if records != before || !persist::exists(&file).await {
            persist::write_json_atomic(&file, &records).await?;
        }
        self.records = records;
        Ok(result)
    }
}

/// `media/<file>` without parent traversal
fn is_media_path(path: &str) -> bool {
    let mut parts = path.split('/');
    parts.next() == Some(MEDIA_DIR) && parts.all(|p| !p.is_empty() && p != ".." && p != ".")
}
