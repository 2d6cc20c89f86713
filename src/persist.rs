//! # Document Persistence Module
//!
//! Scrittura atomica dei documenti JSON (registry e tag registry).
//!
//! ## Strategia:
//! - Serializza in un `NamedTempFile` nella **stessa directory** del target
//! - `sync_all()` e poi `persist()` (rename atomico sullo stesso filesystem)
//! - L'I/O bloccante gira in `spawn_blocking`, fuori dai worker async
//! - Se qualcosa fallisce prima del rename il file temporaneo viene rimosso
//!   dal `Drop` di `NamedTempFile`
//!
//! ## Lock per documento:
//! Ogni ciclo read-modify-write prende un lock di processo associato al path
//! del documento, così due ingestioni concorrenti non riscrivono il file
//! fuori ordine. Nessun coordinamento tra processi diversi.

use crate::error::{IngestError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::NamedTempFile;
use tracing::debug;

type LockMap = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Process-wide lock for a document path
pub fn document_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<LockMap> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let key = normalize_key(path);
    // Il lock della mappa protegge solo l'inserimento, un poison non lascia stato a metà
    let mut guard = match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.entry(key).or_default().clone()
}

fn normalize_key(path: &Path) -> PathBuf {
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(canonical) = parent.canonicalize() {
            return canonical.join(name);
        }
    }
    path.to_path_buf()
}

/// Read a JSON document; `Ok(None)` when the file does not exist.
/// Malformed content is reported as `RegistryCorrupt`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| IngestError::RegistryCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Replace `path` with the pretty-printed JSON of `value` atomically
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_bytes_atomic(path, bytes).await?;

    debug!("Persisted document: {}", path.display());
    Ok(())
}

/// Write raw bytes atomically (used for encoded images)
pub async fn write_bytes_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(worker_error)?
}

/// `true` when `path` exists; errors while checking count as absent
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Blocking-pool task that panicked or was cancelled
pub(crate) fn worker_error(e: tokio::task::JoinError) -> IngestError {
    IngestError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.as_file_mut().write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| IngestError::Io(e.error))?;
    Ok(())
}
