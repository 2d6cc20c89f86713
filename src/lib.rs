//! # Media Ingest Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline di ingestione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri front-end
//!
//! ## Architettura dei moduli:
//! - `format`: Classificazione del media e formato canonico di uscita
//! - `hasher`: Digest SHA-256 per la deduplicazione
//! - `dimensions`: Bounding box 576x1024 senza upscaling
//! - `image_processor`: Encode PNG/JPG e animazioni → WEBM
//! - `video_processor`: Transcoder esterno (ffmpeg) → WEBM VP9/Opus
//! - `registry`: Registry JSON dei media, ordinato per upload
//! - `tags`: Tag, categorie e associazioni media → tag
//! - `tag_dependencies`: Condizioni `req`, ordinamento dei tag e cicli
//! - `pipeline`: Orchestratore classify → dedup → encode → commit
//! - `persist`: Scrittura atomica e lock per documento
//! - `config`, `error`, `file_manager`, `tool_resolver`, `progress`, `json_output`
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use media_ingest::{Config, FfmpegTranscoder, IngestionPipeline, RegistryLocation, ToolPathResolver};
//!
//! # async fn run(bytes: Vec<u8>) -> media_ingest::error::Result<()> {
//! let config = Config::default();
//! let transcoder = Arc::new(FfmpegTranscoder::from_resolver(&ToolPathResolver::new(&config)));
//! let pipeline = IngestionPipeline::open(RegistryLocation::new("assets"), &config, transcoder).await?;
//! let result = pipeline.ingest(&bytes, "hero.png").await;
//! println!("{}: {}", result.filename, result.is_created());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dimensions;
pub mod error;
pub mod file_manager;
pub mod format;
pub mod hasher;
pub mod image_processor;
pub mod json_output;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod tag_dependencies;
pub mod tags;
pub mod tool_resolver;
pub mod video_processor;

pub use config::Config;
pub use dimensions::{DimensionPlanner, Dimensions};
pub use error::{FailureKind, IngestError};
pub use file_manager::{FileManager, RegistryLocation};
pub use format::{Classification, FormatClassifier, MediaKind, OutputFormat, SourceFormat};
pub use hasher::ContentHasher;
pub use pipeline::{IngestionPipeline, MediaInfo, Outcome, ProcessingResult, Upload};
pub use registry::{MediaRecord, MediaRegistry};
pub use tag_dependencies::TagDependencies;
pub use tags::{TagCategory, TagDefinition, TagRegistry, TagValue};
pub use tool_resolver::ToolPathResolver;
pub use video_processor::{FfmpegTranscoder, Transcoder, VideoEncoder};
