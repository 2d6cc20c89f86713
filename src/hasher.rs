//! # Content Hashing Module
//!
//! Digest SHA-256 dei byte originali caricati, usato per la deduplicazione.
//! Il digest è calcolato prima di qualsiasi transcodifica e non dipende dal
//! nome del file.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Computes content digests for duplicate detection
pub struct ContentHasher;

impl ContentHasher {
    /// Lowercase hex SHA-256 of a byte buffer
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Streaming digest of a file on disk
    pub async fn digest_file(path: &Path) -> std::io::Result<String> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
