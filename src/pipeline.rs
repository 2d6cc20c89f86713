//! # Ingestion Pipeline Module
//!
//! Orchestratore principale: dai byte caricati a un record nel registry.
//!
//! ## Stati di una ingestione:
//! ```text
//! Received → Classified → HashChecked ─┬─→ Duplicate
//!                                      └─→ Planned → Encoded → Committed
//! (qualsiasi stato) → Failed
//! ```
//!
//! ## Responsabilità:
//! - Classificazione formato e hash del contenuto originale
//! - Short-circuit sui duplicati (nessun lavoro su filesystem o registry)
//! - Prenotazione del nome di output, encode, commit atomico nel registry
//! - Su errore: rimozione dell'output parziale e rilascio della prenotazione
//! - Re-check dell'hash al commit: se un'ingestione concorrente ha già
//!   registrato lo stesso contenuto, l'output nuovo viene cancellato
//! - Batch con concorrenza limitata; un fallimento non interrompe gli altri
//! - Ispezione di un upload senza encode (`inspect`): formato, dimensioni
//!   sorgente e di destinazione, eventuale duplicato già registrato
//!
//! ## Esempio:
//! ```rust,ignore
//! let transcoder = Arc::new(FfmpegTranscoder::from_resolver(&resolver));
//! let pipeline = IngestionPipeline::open(location, &config, transcoder).await?;
//! let result = pipeline.ingest(&bytes, "hero.png").await;
//! ```

use crate::config::Config;
use crate::dimensions::{DimensionPlanner, Dimensions};
use crate::error::{FailureKind, IngestError, Result};
use crate::file_manager::{FileManager, RegistryLocation};
use crate::format::{Classification, FormatClassifier, MediaKind, OutputFormat, SourceFormat};
use crate::hasher::ContentHasher;
use crate::image_processor::ImageEncoder;
use crate::registry::{Appended, MediaRecord, MediaRegistry};
use crate::tags::TagRegistry;
use crate::video_processor::{Transcoder, VideoEncoder};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Raw upload handed over by the front-end
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping its file name as the upload name
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Created {
        record: MediaRecord,
        format: OutputFormat,
    },
    DuplicateSkipped {
        existing: MediaRecord,
    },
    Failed {
        kind: FailureKind,
        detail: String,
    },
}

/// Per-upload result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ProcessingResult {
    pub fn is_created(&self) -> bool {
        matches!(self.outcome, Outcome::Created { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self.outcome, Outcome::DuplicateSkipped { .. })
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self.outcome {
            Outcome::Failed { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// The created or pre-existing record
    pub fn record(&self) -> Option<&MediaRecord> {
        match &self.outcome {
            Outcome::Created { record, .. } => Some(record),
            Outcome::DuplicateSkipped { existing } => Some(existing),
            Outcome::Failed { .. } => None,
        }
    }
}

/// What an ingestion would do with an upload, computed without encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub filename: String,
    pub kind: MediaKind,
    pub source: SourceFormat,
    pub output: OutputFormat,
    pub size: u64,
    /// Human readable `size`
    pub original_size: String,
    pub width: u32,
    pub height: u32,
    pub target: Dimensions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_audio: Option<bool>,
    /// Record path of identical content already in the registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

/// Classify → hash/dedup → plan → encode → commit
pub struct IngestionPipeline {
    location: RegistryLocation,
    registry: AsyncMutex<MediaRegistry>,
    tags: AsyncMutex<TagRegistry>,
    images: ImageEncoder,
    video: Arc<VideoEncoder>,
    planner: DimensionPlanner,
    workers: usize,
    /// Uploads with the same content are serialized from lookup to commit
    hash_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IngestionPipeline {
    /// Open the registry (and tag registry) at `location`
    pub async fn open(
        location: RegistryLocation,
        config: &Config,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        let registry = MediaRegistry::load(location.clone()).await?;
        let tags = TagRegistry::load(&location).await?;
        let video = Arc::new(VideoEncoder::new(transcoder, config));
        let images = ImageEncoder::new(video.clone(), config);

        info!(
            "Opened registry {} ({} records)",
            registry.display_name(),
            registry.len()
        );

        Ok(Self {
            location,
            registry: AsyncMutex::new(registry),
            tags: AsyncMutex::new(tags),
            images,
            video,
            planner: DimensionPlanner::new(config.max_width, config.max_height),
            workers: config.workers.max(1),
            hash_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn location(&self) -> &RegistryLocation {
        &self.location
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Exclusive access to the media registry
    pub async fn registry(&self) -> MutexGuard<'_, MediaRegistry> {
        self.registry.lock().await
    }

    /// Exclusive access to the tag registry
    pub async fn tags(&self) -> MutexGuard<'_, TagRegistry> {
        self.tags.lock().await
    }

    /// Ingest one upload; never fails, errors land in the result
    pub async fn ingest(&self, bytes: &[u8], filename: &str) -> ProcessingResult {
        let outcome = match self.try_ingest(bytes, filename).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_fatal() {
                    error!("Ingestion of {} failed: {}", filename, e);
                } else {
                    warn!("Ingestion of {} failed: {}", filename, e);
                }
                Outcome::from(e)
            }
        };

        ProcessingResult {
            filename: filename.to_string(),
            outcome,
        }
    }

    /// Ingest uploads with up to `workers` in flight; results keep input order
    pub async fn ingest_batch(&self, uploads: &[Upload], workers: usize) -> Vec<ProcessingResult> {
        info!("Ingesting batch of {} uploads ({} workers)", uploads.len(), workers.max(1));
        stream::iter(uploads.iter().map(|u| self.ingest(&u.bytes, &u.filename)))
            .buffered(workers.max(1))
            .collect()
            .await
    }

    async fn try_ingest(&self, bytes: &[u8], filename: &str) -> Result<Outcome> {
        debug!("[{}] received {} bytes", filename, bytes.len());

        let classification = FormatClassifier::classify(bytes, filename)?;
        debug!(
            "[{}] classified as {} ({:?}) -> {}",
            filename, classification.source, classification.kind, classification.output
        );

        let hash = ContentHasher::digest(bytes);
        let hash_lock = self.hash_lock(&hash);
        let outcome = {
            let _same_content = hash_lock.lock().await;
            self.ingest_classified(bytes, filename, classification, hash.clone())
                .await
        };
        drop(hash_lock);
        self.prune_hash_lock(&hash);
        outcome
    }

    async fn ingest_classified(
        &self,
        bytes: &[u8],
        filename: &str,
        classification: Classification,
        hash: String,
    ) -> Result<Outcome> {
        let path = {
            let mut registry = self.registry.lock().await;
            if let Some(existing) = registry.find_by_hash(&hash) {
                info!("[{}] duplicate of {}, skipping", filename, existing.path);
                return Ok(Outcome::DuplicateSkipped {
                    existing: existing.clone(),
                });
            }
            debug!("[{}] hash {} is new", filename, &hash[..12.min(hash.len())]);
            registry
                .reserve_path(&FileManager::output_file_name(filename, classification.output))
                .await
        };

        let output = self.location.resolve(&path);
        let encoded = match classification.kind {
            MediaKind::ImageStatic => self
                .images
                .encode_static(bytes, classification.output, &output)
                .await
                .map(|e| e.dimensions),
            MediaKind::ImageAnimated => self
                .images
                .encode_animated(bytes, classification.source, &output)
                .await
                .map(|e| e.dimensions),
            MediaKind::Video => {
                self.video
                    .encode_bytes(bytes, classification.source.extension(), &output)
                    .await
            }
        };

        let dimensions = match encoded {
            Ok(dimensions) => dimensions,
            Err(e) => {
                remove_partial(&output).await;
                self.registry.lock().await.release_path(&path);
                return Err(e);
            }
        };
        debug!(
            "[{}] encoded {} at {}x{}",
            filename, path, dimensions.width, dimensions.height
        );

        let mut record = MediaRecord::new(path, hash);
        record.format = Some(classification.output);
        record.width = Some(dimensions.width);
        record.height = Some(dimensions.height);

        let appended = self.registry.lock().await.append(record).await;
        match appended {
            Ok(Appended::Inserted(record)) => {
                info!("[{}] created {}", filename, record.path);
                Ok(Outcome::Created {
                    record,
                    format: classification.output,
                })
            }
            Ok(Appended::Duplicate(existing)) => {
                info!("[{}] committed concurrently as {}, discarding output", filename, existing.path);
                remove_partial(&output).await;
                Ok(Outcome::DuplicateSkipped { existing })
            }
            Err(e) => {
                remove_partial(&output).await;
                Err(e)
            }
        }
    }

    fn hash_lock(&self, hash: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.hash_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(hash.to_string()).or_default().clone()
    }

    fn prune_hash_lock(&self, hash: &str) {
        let mut locks = match self.hash_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if locks.get(hash).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(hash);
        }
    }

    /// Classify and measure an upload; nothing is written
    pub async fn inspect(&self, bytes: &[u8], filename: &str) -> Result<MediaInfo> {
        let classification = FormatClassifier::classify(bytes, filename)?;

        let (source, has_audio) = match classification.kind {
            MediaKind::Video => {
                let info = self
                    .video
                    .source_info(bytes, classification.source.extension())
                    .await?;
                (Dimensions::new(info.width, info.height), Some(info.has_audio))
            }
            MediaKind::ImageStatic | MediaKind::ImageAnimated => {
                (self.images.source_dimensions(bytes).await?, None)
            }
        };

        let mut target = self.planner.plan(source.width, source.height)?;
        if classification.output == OutputFormat::Webm {
            target = target.to_even();
        }

        let hash = ContentHasher::digest(bytes);
        let duplicate_of = self
            .registry
            .lock()
            .await
            .find_by_hash(&hash)
            .map(|record| record.path.clone());

        debug!(
            "[{}] {}x{} -> {}x{}",
            filename, source.width, source.height, target.width, target.height
        );
        Ok(MediaInfo {
            filename: filename.to_string(),
            kind: classification.kind,
            source: classification.source,
            output: classification.output,
            size: bytes.len() as u64,
            original_size: FileManager::format_size(bytes.len() as u64),
            width: source.width,
            height: source.height,
            target,
            has_audio,
            duplicate_of,
        })
    }

    /// Remove a record and its media file; tags are left untouched
    pub async fn remove(&self, path: &str) -> Result<Option<MediaRecord>> {
        self.registry.lock().await.remove(path).await
    }

    pub async fn tag_media(&self, path: &str, tag_ids: &[String]) -> Result<()> {
        self.tags.lock().await.tag_media(path, tag_ids).await
    }

    pub async fn untag_media(&self, path: &str, tag_ids: &[String]) -> Result<()> {
        self.tags.lock().await.untag_media(path, tag_ids).await
    }

    /// Snapshot of the records in chronological order
    pub async fn records(&self, most_recent_first: bool) -> Vec<MediaRecord> {
        self.registry
            .lock()
            .await
            .iter_chronological(most_recent_first)
            .cloned()
            .collect()
    }
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", output.display(), e),
    }
}

impl From<IngestError> for Outcome {
    fn from(e: IngestError) -> Self {
        Outcome::Failed {
            kind: e.kind(),
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{gif_bytes, jpeg_bytes, png_bytes};
    use crate::video_processor::tests::{FakeMode, FakeTranscoder};
    use crate::video_processor::VideoProbe;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn mp4_bytes(tag: u8) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 0x18];
        bytes.extend_from_slice(b"ftypisom");
        bytes.extend_from_slice(&[0, 0, 2, 0, tag]);
        bytes
    }

    async fn open(dir: &TempDir, fake: Arc<FakeTranscoder>) -> IngestionPipeline {
        let location = RegistryLocation::new(dir.path().join("media_registry.json"));
        IngestionPipeline::open(location, &Config::default(), fake)
            .await
            .unwrap()
    }

    fn media_files(dir: &TempDir) -> Vec<String> {
        let media = dir.path().join("media");
        if !media.exists() {
            return Vec::new();
        }
        let mut names: Vec<String> = std::fs::read_dir(media)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_portrait_jpeg_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;

        let result = pipeline.ingest(&jpeg_bytes(1200, 2000), "portrait.jpeg").await;
        match &result.outcome {
            Outcome::Created { record, format } => {
                assert_eq!(*format, OutputFormat::Jpg);
                assert_eq!(record.path, "media/portrait.jpg");
                assert_eq!((record.width, record.height), (Some(576), Some(960)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(media_files(&temp_dir), vec!["portrait.jpg"]);

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(temp_dir.path().join("media_registry.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw[0]["path"], "media/portrait.jpg");
        assert_eq!(raw[0]["original_hash"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_same_bytes_new_name_is_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;
        let bytes = png_bytes(32, 32);

        let first = pipeline.ingest(&bytes, "icon.png").await;
        assert!(first.is_created());
        let second = pipeline.ingest(&bytes, "renamed.png").await;
        assert!(second.is_duplicate());
        assert_eq!(second.record(), first.record());

        assert_eq!(pipeline.registry().await.len(), 1);
        assert_eq!(media_files(&temp_dir), vec!["icon.png"]);
    }

    #[tokio::test]
    async fn test_distinct_uploads_get_distinct_records() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;

        let uploads: Vec<Upload> = (1..=5)
            .map(|i| Upload::new(format!("tile{}.png", i), png_bytes(i * 10, 8)))
            .collect();
        let results = pipeline.ingest_batch(&uploads, 3).await;
        assert!(results.iter().all(|r| r.is_created()));

        let records = pipeline.records(false).await;
        assert_eq!(records.len(), 5);
        let hashes: HashSet<_> = records.iter().map(|r| r.content_hash.clone()).collect();
        let paths: HashSet<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(hashes.len(), 5);
        assert_eq!(paths.len(), 5);
        // Results come back in input order
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.filename, format!("tile{}.png", i + 1));
        }
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;

        let a = pipeline.ingest(&png_bytes(10, 10), "a.png").await;
        let b = pipeline.ingest(&png_bytes(20, 20), "a.png").await;
        assert_eq!(a.record().unwrap().path, "media/a.png");
        assert_eq!(b.record().unwrap().path, "media/a-1.png");
        assert_eq!(media_files(&temp_dir), vec!["a-1.png", "a.png"]);
    }

    #[tokio::test]
    async fn test_animated_gif_becomes_webm() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Succeed));
        let pipeline = open(&temp_dir, fake.clone()).await;

        let result = pipeline.ingest(&gif_bytes(100, 100, 4, 100), "walk.gif").await;
        match &result.outcome {
            Outcome::Created { record, format } => {
                assert_eq!(*format, OutputFormat::Webm);
                assert_eq!(record.path, "media/walk.webm");
                assert_eq!((record.width, record.height), (Some(100), Some(100)));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fake.frames_seen(), vec![4]);
        assert_eq!(media_files(&temp_dir), vec!["walk.webm"]);
    }

    #[tokio::test]
    async fn test_video_is_transcoded() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::with_probe(
            FakeMode::Succeed,
            VideoProbe {
                width: 1080,
                height: 1920,
                has_audio: true,
            },
        ));
        let pipeline = open(&temp_dir, fake.clone()).await;

        let result = pipeline.ingest(&mp4_bytes(1), "cutscene.mp4").await;
        let record = result.record().unwrap();
        assert_eq!(record.path, "media/cutscene.webm");
        assert_eq!((record.width, record.height), (Some(576), Some(1024)));
        assert_eq!(fake.requests()[0].audio_bitrate.as_deref(), Some("96k"));
    }

    #[tokio::test]
    async fn test_same_bytes_in_one_batch() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;
        let bytes = png_bytes(40, 40);

        let uploads = vec![
            Upload::new("first.png", bytes.clone()),
            Upload::new("second.png", bytes),
        ];
        let results = pipeline.ingest_batch(&uploads, 2).await;
        assert!(results[0].is_created());
        assert!(results[1].is_duplicate());
        assert_eq!(results[1].record().unwrap().path, "media/first.png");
        assert_eq!(media_files(&temp_dir), vec!["first.png"]);
    }

    #[tokio::test]
    async fn test_missing_transcoder() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Missing));
        let pipeline = open(&temp_dir, fake.clone()).await;

        let uploads = vec![
            Upload::new("intro.mp4", mp4_bytes(1)),
            Upload::new("outro.mp4", mp4_bytes(2)),
            Upload::new("still.png", png_bytes(16, 16)),
        ];
        let results = pipeline.ingest_batch(&uploads, 1).await;

        assert_eq!(results[0].failure(), Some(FailureKind::ToolUnavailable));
        assert_eq!(results[1].failure(), Some(FailureKind::ToolUnavailable));
        assert_eq!(fake.calls(), 1);
        assert!(results[2].is_created());

        let registry = pipeline.registry().await;
        assert_eq!(registry.len(), 1);
        assert!(registry.find_by_path("media/intro.webm").is_none());
        drop(registry);
        assert_eq!(media_files(&temp_dir), vec!["still.png"]);

        // The released reservation is reusable
        let mut registry = pipeline.registry().await;
        assert_eq!(registry.reserve_path("intro.webm").await, "media/intro.webm");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Fail))).await;

        let uploads = vec![
            Upload::new("notes.txt", b"just some text".to_vec()),
            Upload::new("broken.mp4", mp4_bytes(3)),
            Upload::new("ok.png", png_bytes(8, 8)),
        ];
        let results = pipeline.ingest_batch(&uploads, 2).await;
        assert_eq!(results[0].failure(), Some(FailureKind::UnsupportedFormat));
        assert_eq!(results[1].failure(), Some(FailureKind::EncodeError));
        assert!(results[2].is_created());
        assert_eq!(media_files(&temp_dir), vec!["ok.png"]);
    }

    #[tokio::test]
    async fn test_corrupt_registry_aborts_open() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("media_registry.json"), "[{oops").unwrap();
        let location = RegistryLocation::new(temp_dir.path().join("media_registry.json"));

        let err = IngestionPipeline::open(
            location,
            &Config::default(),
            Arc::new(FakeTranscoder::new(FakeMode::Succeed)),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, IngestError::RegistryCorrupt { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_remove_keeps_tags() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;

        let result = pipeline.ingest(&png_bytes(12, 12), "slime.png").await;
        let path = result.record().unwrap().path.clone();
        pipeline.tag_media(&path, &["enemy".to_string()]).await.unwrap();

        let removed = pipeline.remove(&path).await.unwrap();
        assert!(removed.is_some());
        assert!(media_files(&temp_dir).is_empty());
        assert!(pipeline.tags().await.tags_for(&path).contains("enemy"));

        let again = tokio_test::assert_ok!(pipeline.remove(&path).await);
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_inspect_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Succeed))).await;
        let bytes = jpeg_bytes(1200, 2000);

        let info = pipeline.inspect(&bytes, "portrait.jpeg").await.unwrap();
        assert_eq!(info.kind, MediaKind::ImageStatic);
        assert_eq!(info.output, OutputFormat::Jpg);
        assert_eq!((info.width, info.height), (1200, 2000));
        assert_eq!(info.target, Dimensions::new(576, 960));
        assert_eq!(info.size, bytes.len() as u64);
        assert_eq!(info.has_audio, None);
        assert_eq!(info.duplicate_of, None);
        assert!(media_files(&temp_dir).is_empty());
        assert_eq!(pipeline.registry().await.len(), 0);

        assert!(pipeline.ingest(&bytes, "portrait.jpeg").await.is_created());
        let info = pipeline.inspect(&bytes, "copy.jpg").await.unwrap();
        assert_eq!(info.duplicate_of.as_deref(), Some("media/portrait.jpg"));
    }

    #[tokio::test]
    async fn test_inspect_webm_targets_are_even() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Succeed));
        let pipeline = open(&temp_dir, fake.clone()).await;

        let info = pipeline.inspect(&gif_bytes(101, 51, 3, 100), "blink.gif").await.unwrap();
        assert_eq!(info.kind, MediaKind::ImageAnimated);
        assert_eq!(info.target, Dimensions::new(100, 50));

        let info = pipeline.inspect(&mp4_bytes(7), "trailer.mp4").await.unwrap();
        assert_eq!(info.kind, MediaKind::Video);
        assert_eq!(info.source, SourceFormat::Mp4);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.target, Dimensions::new(576, 324));
        assert_eq!(info.has_audio, Some(true));
        assert!(fake.requests().is_empty());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "video");
        assert_eq!(json["target"]["width"], 576);
    }

    #[tokio::test]
    async fn test_inspect_failures() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = open(&temp_dir, Arc::new(FakeTranscoder::new(FakeMode::Missing))).await;

        let err = pipeline.inspect(b"plain text", "notes.txt").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedFormat);
        let err = pipeline.inspect(&mp4_bytes(1), "intro.mp4").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ToolUnavailable);
    }

    #[test]
    fn test_result_serialization() {
        let result = ProcessingResult {
            filename: "x.bin".to_string(),
            outcome: Outcome::Failed {
                kind: FailureKind::UnsupportedFormat,
                detail: "Unsupported file format: x.bin".to_string(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["filename"], "x.bin");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["kind"], "unsupported_format");
    }
}
