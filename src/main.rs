//! # Media Ingest - Main Entry Point
//!
//! Questo è il punto di ingresso della CLI `media-ingest`.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (`RUST_LOG` o `--verbose`)
//! - Caricamento della configurazione e scelta del registry
//!   (`--registry`, altrimenti l'ultimo usato, altrimenti la directory corrente)
//! - Esecuzione del comando e rendering dei risultati (testo o JSON lines)
//! - Salvataggio dell'ultimo registry usato nel file di configurazione
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-ingest --registry ./assets ingest ~/Downloads/sprites --workers 4
//! media-ingest tag media/hero.png player ui
//! media-ingest --json list
//! media-ingest define-tag guys --req "participants - girls > 0"
//! media-ingest info ~/Downloads/intro.mp4
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_ingest::json_output::{JsonConfig, JsonMessage};
use media_ingest::progress::{IngestStats, ProgressManager};
use media_ingest::{
    Config, ContentHasher, FfmpegTranscoder, FileManager, IngestError, IngestionPipeline, Outcome,
    ProcessingResult, RegistryLocation, TagCategory, TagDefinition, TagValue, ToolPathResolver, Upload,
};

#[derive(Parser)]
#[command(name = "media-ingest")]
#[command(about = "Ingest game media assets into a deduplicated JSON registry")]
struct Args {
    /// Registry document or the directory holding it
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Configuration file (default: ~/.media-ingest/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON lines on stdout instead of human output
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files or directories
    Ingest {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Number of concurrent ingestions
        #[arg(short, long)]
        workers: Option<usize>,

        /// JPEG quality (1-100)
        #[arg(short, long)]
        quality: Option<u8>,
    },
    /// List registry records, most recent first
    List {
        #[arg(long)]
        oldest_first: bool,
    },
    /// Show what ingesting files would produce, without writing anything
    Info {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Remove a record and its media file
    Remove { path: String },
    /// Add tags to a media path
    Tag {
        path: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Remove tags from a media path
    Untag {
        path: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show the tags of a path, or every tag and category
    Tags { path: Option<String> },
    /// Create or update a tag
    DefineTag {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Condition on other tags, e.g. "participants >= 1"
        #[arg(long)]
        req: Option<String>,
        /// Allowed value, as VALUE or VALUE=CONDITION (repeatable)
        #[arg(long = "value")]
        values: Vec<String>,
    },
    /// Delete a tag everywhere
    DeleteTag { id: String },
    /// Create or update a tag category
    DefineCategory {
        id: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        color: String,
    },
    /// Delete a tag category
    DeleteCategory { id: String },
    /// Report transcoder availability
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        "debug"
    } else if args.json {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = args.json;
    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) if json => {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(ref path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut config = Config::from_file(&config_path)
        .await
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    if let Command::Ingest { workers, quality, .. } = &args.command {
        if let Some(workers) = workers {
            config.workers = *workers;
        }
        if let Some(quality) = quality {
            config.jpeg_quality = *quality;
        }
        config.validate()?;
    }

    let resolver = ToolPathResolver::new(&config);
    if let Command::Tools = args.command {
        if args.json {
            JsonMessage::Tools {
                ffmpeg: resolver.resolve_tool("ffmpeg"),
                ffprobe: resolver.resolve_tool("ffprobe"),
            }
            .emit();
        } else {
            println!("{}", resolver.tools_report());
        }
        return Ok(());
    }

    let registry_path = match args.registry {
        Some(ref path) => path.clone(),
        None => config
            .remembered_registry()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let location = RegistryLocation::new(registry_path);
    let transcoder = Arc::new(FfmpegTranscoder::from_resolver(&resolver));
    let pipeline = IngestionPipeline::open(location.clone(), &config, transcoder)
        .await
        .with_context(|| format!("Cannot open registry {}", location.registry_file().display()))?;

    execute(&pipeline, args.command, &config, args.json).await?;
    remember_registry(&mut config, &config_path, &location).await;
    Ok(())
}

async fn execute(pipeline: &IngestionPipeline, command: Command, config: &Config, json: bool) -> Result<()> {
    match command {
        Command::Ingest { inputs, .. } => ingest(pipeline, &inputs, config, json).await?,
        Command::List { oldest_first } => {
            let records = pipeline.records(!oldest_first).await;
            if json {
                JsonMessage::Records {
                    registry: pipeline.location().registry_file().to_path_buf(),
                    records,
                }
                .emit();
            } else {
                let tags = pipeline.tags().await;
                println!("📁 {} ({} records)", pipeline.location().display_name(), records.len());
                for record in &records {
                    let size = match (record.width, record.height) {
                        (Some(w), Some(h)) => format!("{}x{}", w, h),
                        _ => "?".to_string(),
                    };
                    let ids: Vec<String> = tags.tags_for(&record.path).into_iter().collect();
                    println!("  {:<40} {:>10}  {}", record.path, size, ids.join(", "));
                }
            }
        }
        Command::Info { inputs } => {
            for path in FileManager::find_media_files(&inputs)? {
                let upload = Upload::from_path(&path)
                    .await
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                let info = pipeline.inspect(&upload.bytes, &upload.filename).await?;
                if json {
                    JsonMessage::Info { info }.emit();
                    continue;
                }
                println!(
                    "📄 {} ({:?}, {}, {})",
                    info.filename, info.kind, info.source, info.original_size
                );
                println!(
                    "   {}x{} -> {}x{} {}",
                    info.width, info.height, info.target.width, info.target.height, info.output
                );
                if let Some(has_audio) = info.has_audio {
                    println!("   audio: {}", if has_audio { "yes" } else { "no" });
                }
                if let Some(existing) = &info.duplicate_of {
                    println!("   already ingested as {}", existing);
                }
            }
        }
        Command::Remove { path } => {
            let record = pipeline.remove(&path).await?;
            if json {
                JsonMessage::Removed { path, record }.emit();
            } else if record.is_some() {
                println!("🗑️  Removed {}", path);
            } else {
                println!("Nothing to remove at {}", path);
            }
        }
        Command::Tag { path, ids } => {
            pipeline.tag_media(&path, &ids).await?;
            print_tags(pipeline, Some(path), json).await;
        }
        Command::Untag { path, ids } => {
            pipeline.untag_media(&path, &ids).await?;
            print_tags(pipeline, Some(path), json).await;
        }
        Command::Tags { path } => print_tags(pipeline, path, json).await,
        Command::DefineTag {
            id,
            description,
            category,
            req,
            values,
        } => {
            let mut tag = TagDefinition::new(id);
            tag.description = description;
            tag.category_id = category;
            tag.req = req;
            tag.values = values.iter().map(|v| parse_tag_value(v)).collect();
            pipeline.tags().await.upsert_tag(tag).await?;
            print_tags(pipeline, None, json).await;
        }
        Command::DeleteTag { id } => {
            pipeline.tags().await.delete_tag(&id).await?;
            print_tags(pipeline, None, json).await;
        }
        Command::DefineCategory { id, description, color } => {
            let category = TagCategory { id, description, color };
            pipeline.tags().await.upsert_category(category).await?;
            print_tags(pipeline, None, json).await;
        }
        Command::DeleteCategory { id } => {
            pipeline.tags().await.delete_category(&id).await?;
            print_tags(pipeline, None, json).await;
        }
        Command::Tools => {}
    }
    Ok(())
}

async fn ingest(pipeline: &IngestionPipeline, inputs: &[PathBuf], config: &Config, json: bool) -> Result<()> {
    let files = FileManager::find_media_files(inputs)?;
    let total = files.len();
    if total == 0 {
        warn!("No supported media files found");
        return Ok(());
    }

    info!("📁 Found {} media files to ingest", total);
    let progress = if json {
        JsonMessage::Start {
            registry: pipeline.location().registry_file().to_path_buf(),
            total_files: total,
            config: JsonConfig::from(config),
        }
        .emit();
        ProgressManager::hidden()
    } else {
        ProgressManager::new(total as u64)
    };

    let start_time = Instant::now();
    let mut stats = IngestStats::new();
    let mut results = stream::iter(files.iter().enumerate().map(|(index, path)| async move {
        if json {
            let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            JsonMessage::FileStart {
                path: path.clone(),
                size,
                index,
                total,
            }
            .emit();
        }
        ingest_file(pipeline, path).await
    }))
    .buffered(pipeline.workers());

    let mut index = 0;
    while let Some((result, input_size)) = results.next().await {
        let output_size = match &result.outcome {
            Outcome::Created { record, .. } => tokio::fs::metadata(pipeline.location().resolve(&record.path))
                .await
                .map(|m| m.len())
                .ok(),
            _ => None,
        };
        stats.record(&result, input_size, output_size);

        if json {
            JsonMessage::FileComplete { index, result }.emit();
            JsonMessage::progress(index + 1, total, &stats).emit();
        } else {
            let line = match &result.outcome {
                Outcome::Created { record, .. } => format!("✅ {} -> {}", result.filename, record.path),
                Outcome::DuplicateSkipped { existing } => {
                    format!("⏭️  {} already ingested as {}", result.filename, existing.path)
                }
                Outcome::Failed { detail, .. } => format!("❌ {}: {}", result.filename, detail),
            };
            progress.println(&line);
            progress.update(&result.filename);
        }
        index += 1;
    }

    if json {
        JsonMessage::complete(&stats, start_time.elapsed().as_secs_f64()).emit();
    } else {
        progress.finish(&stats.format_summary());
        info!("🎉 Ingestion completed in {:.1}s", start_time.elapsed().as_secs_f64());
    }
    Ok(())
}

/// Hash first so already-ingested files are never read into memory
async fn ingest_file(pipeline: &IngestionPipeline, path: &Path) -> (ProcessingResult, u64) {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    let failed = |e: std::io::Error| ProcessingResult {
        filename: filename.clone(),
        outcome: Outcome::from(IngestError::from(e)),
    };

    let hash = match ContentHasher::digest_file(path).await {
        Ok(hash) => hash,
        Err(e) => return (failed(e), size),
    };
    let existing = pipeline.registry().await.find_by_hash(&hash).cloned();
    if let Some(existing) = existing {
        let result = ProcessingResult {
            filename: filename.clone(),
            outcome: Outcome::DuplicateSkipped { existing },
        };
        return (result, size);
    }

    match Upload::from_path(path).await {
        Ok(upload) => (pipeline.ingest(&upload.bytes, &upload.filename).await, size),
        Err(e) => (failed(e), size),
    }
}

/// `VALUE` or `VALUE=CONDITION`
fn parse_tag_value(raw: &str) -> TagValue {
    match raw.split_once('=') {
        Some((value, req)) => TagValue::Conditional {
            value: value.trim().to_string(),
            req: Some(req.trim().to_string()).filter(|r| !r.is_empty()),
        },
        None => TagValue::Plain(raw.trim().to_string()),
    }
}

async fn print_tags(pipeline: &IngestionPipeline, path: Option<String>, json: bool) {
    let tags = pipeline.tags().await;
    let categories: Vec<TagCategory> = tags.categories().cloned().collect();

    // Senza path: tutti i tag, ognuno dopo quelli da cui dipende
    let (defined, orphans, cycles) = match path {
        Some(ref path) => {
            let resolved = tags.resolve_tags(path);
            (resolved.defined, resolved.orphans, Vec::new())
        }
        None => (
            tags.ordered_tags()
                .iter()
                .filter_map(|id| tags.tag(id).cloned())
                .collect(),
            Default::default(),
            tags.dependency_cycles(),
        ),
    };

    if json {
        JsonMessage::Tags {
            path,
            tags: defined,
            orphans,
            categories,
            cycles,
        }
        .emit();
        return;
    }

    match path {
        Some(path) => println!("🏷️  {}", path),
        None => println!("🏷️  {} tags, {} categories", defined.len(), categories.len()),
    }
    for cycle in &cycles {
        println!("  ⚠️  circular requirement: {}", cycle.join(" -> "));
    }
    for tag in &defined {
        let category = tags
            .category_of(&tag.id)
            .map(|c| format!(" [{}]", c.id))
            .unwrap_or_default();
        let req = tag.req.as_ref().map(|r| format!(" (if {})", r)).unwrap_or_default();
        match tag.description {
            Some(ref description) => println!("  {}{}{} - {}", tag.id, category, req, description),
            None => println!("  {}{}{}", tag.id, category, req),
        }
    }
    for orphan in &orphans {
        println!("  {} (undefined)", orphan);
    }
}

/// Store the registry in the config so the next session reopens it
async fn remember_registry(config: &mut Config, config_path: &Path, location: &RegistryLocation) {
    let Ok(registry_file) = location.registry_file().canonicalize() else {
        return;
    };
    if config.last_registry.as_ref() == Some(&registry_file) {
        return;
    }
    config.last_registry = Some(registry_file);
    if let Err(e) = config.save_to_file(config_path).await {
        warn!("Could not save last registry to {}: {}", config_path.display(), e);
    }
}
