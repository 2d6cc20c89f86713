//! # Image Processing Module
//!
//! Questo modulo gestisce la codifica delle immagini statiche e animate.
//!
//! ## Responsabilità:
//! - Decode in memoria con il crate `image` (formato rilevato dai magic bytes)
//! - Resize Lanczos3 dentro il bounding box (saltato se le dimensioni coincidono)
//! - Encode PNG (lossless) o JPG (qualità da config, alpha scartato)
//! - Animazioni GIF/WEBP: decode di tutti i frame, resize identico per ogni
//!   frame, sequenza PNG numerata in una directory temporanea, poi WEBM
//!   tramite il `VideoEncoder`
//!
//! ## Frame rate delle animazioni:
//! `1000 / delay medio (ms)`, limitato a [1, 60]. I delay nulli vengono
//! ignorati; senza alcun delay si usa `default_fps` (24).
//!
//! Il lavoro CPU-bound (decode, resize, encode) gira in `spawn_blocking`.

use crate::config::Config;
use crate::dimensions::{DimensionPlanner, Dimensions};
use crate::error::{IngestError, Result};
use crate::format::{OutputFormat, SourceFormat};
use crate::persist;
use crate::video_processor::VideoEncoder;
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, Frame, ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

pub const MIN_FPS: f64 = 1.0;
pub const MAX_FPS: f64 = 60.0;
const FRAME_PATTERN: &str = "frame_%05d.png";

/// Outcome of an image encode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedImage {
    pub dimensions: Dimensions,
    pub frames: usize,
    /// Frame rate handed to the transcoder (animations only)
    pub fps: Option<f64>,
}

/// Encodes static images in-process and animations through the video path
pub struct ImageEncoder {
    planner: DimensionPlanner,
    jpeg_quality: u8,
    default_fps: f64,
    video: Arc<VideoEncoder>,
}

impl ImageEncoder {
    pub fn new(video: Arc<VideoEncoder>, config: &Config) -> Self {
        Self {
            planner: DimensionPlanner::new(config.max_width, config.max_height),
            jpeg_quality: config.jpeg_quality,
            default_fps: config.default_fps,
            video,
        }
    }

    /// Width and height of an image read from its header
    pub async fn source_dimensions(&self, bytes: &[u8]) -> Result<Dimensions> {
        let owned = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Dimensions> {
            let (width, height) = image::io::Reader::new(Cursor::new(owned))
                .with_guessed_format()?
                .into_dimensions()?;
            Ok(Dimensions::new(width, height))
        })
        .await
        .map_err(persist::worker_error)?
    }

    /// Decode, resize and encode a single-frame image to PNG or JPG
    pub async fn encode_static(
        &self,
        bytes: &[u8],
        output_format: OutputFormat,
        output: &Path,
    ) -> Result<EncodedImage> {
        let planner = self.planner;
        let quality = self.jpeg_quality;
        let owned = bytes.to_vec();

        let (encoded, dimensions) = tokio::task::spawn_blocking(move || {
            encode_static_blocking(&owned, output_format, planner, quality)
        })
        .await
        .map_err(|e| IngestError::Encode(format!("image worker failed: {}", e)))??;

        let size = encoded.len();
        persist::write_bytes_atomic(output, encoded).await?;
        info!(
            "Encoded {} ({}x{}, {} bytes)",
            output.display(),
            dimensions.width,
            dimensions.height,
            size
        );

        Ok(EncodedImage {
            dimensions,
            frames: 1,
            fps: None,
        })
    }

    /// Decode every frame of a GIF/WEBP and produce an animated WEBM
    pub async fn encode_animated(
        &self,
        bytes: &[u8],
        source: SourceFormat,
        output: &Path,
    ) -> Result<EncodedImage> {
        let planner = self.planner;
        let default_fps = self.default_fps;
        let owned = bytes.to_vec();

        let sequence = tokio::task::spawn_blocking(move || {
            write_frame_sequence(&owned, source, planner, default_fps)
        })
        .await
        .map_err(|e| IngestError::Encode(format!("image worker failed: {}", e)))??;

        debug!(
            "Animation: {} frames at {:.2} fps -> {}x{}",
            sequence.frames, sequence.fps, sequence.dimensions.width, sequence.dimensions.height
        );

        let pattern = sequence.dir.path().join(FRAME_PATTERN);
        let dimensions = self
            .video
            .encode_frames(&pattern, sequence.fps, sequence.dimensions, output)
            .await?;

        Ok(EncodedImage {
            dimensions,
            frames: sequence.frames,
            fps: Some(sequence.fps),
        })
    }
}

fn encode_static_blocking(
    bytes: &[u8],
    output_format: OutputFormat,
    planner: DimensionPlanner,
    quality: u8,
) -> Result<(Vec<u8>, Dimensions)> {
    let img = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let dimensions = planner.plan(img.width(), img.height())?;
    let img = if (img.width(), img.height()) == (dimensions.width, dimensions.height) {
        img
    } else {
        img.resize_exact(dimensions.width, dimensions.height, FilterType::Lanczos3)
    };

    let mut buf = Cursor::new(Vec::new());
    match output_format {
        OutputFormat::Jpg => {
            DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, ImageOutputFormat::Jpeg(quality))?
        }
        OutputFormat::Png => img.write_to(&mut buf, ImageOutputFormat::Png)?,
        OutputFormat::Webm => {
            return Err(IngestError::UnsupportedFormat(
                "webm is not a static image output".to_string(),
            ))
        }
    }

    Ok((buf.into_inner(), dimensions))
}

/// PNG frames on disk, removed when dropped
struct FrameSequence {
    dir: TempDir,
    frames: usize,
    fps: f64,
    dimensions: Dimensions,
}

fn decode_frames(bytes: &[u8], source: SourceFormat) -> Result<Vec<Frame>> {
    let frames = match source {
        SourceFormat::Gif => GifDecoder::new(Cursor::new(bytes))?.into_frames().collect_frames()?,
        SourceFormat::Webp => WebPDecoder::new(Cursor::new(bytes))?.into_frames().collect_frames()?,
        other => {
            return Err(IngestError::UnsupportedFormat(format!(
                "{} cannot be animated",
                other.extension()
            )))
        }
    };
    Ok(frames)
}

fn write_frame_sequence(
    bytes: &[u8],
    source: SourceFormat,
    planner: DimensionPlanner,
    default_fps: f64,
) -> Result<FrameSequence> {
    let frames = decode_frames(bytes, source)?;
    let first = frames
        .first()
        .ok_or_else(|| IngestError::Encode("animation has no frames".to_string()))?;

    let (width, height) = first.buffer().dimensions();
    let dimensions = planner.plan(width, height)?;

    let delays: Vec<f64> = frames
        .iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            if denom == 0 {
                0.0
            } else {
                numer as f64 / denom as f64
            }
        })
        .collect();
    let fps = frame_rate(&delays, default_fps);

    let dir = TempDir::new()?;
    let count = frames.len();
    for (index, frame) in frames.into_iter().enumerate() {
        let buffer = frame.into_buffer();
        let buffer = if buffer.dimensions() == (dimensions.width, dimensions.height) {
            buffer
        } else {
            imageops::resize(&buffer, dimensions.width, dimensions.height, FilterType::Lanczos3)
        };
        let path = dir.path().join(format!("frame_{:05}.png", index));
        buffer.save_with_format(&path, ImageFormat::Png)?;
    }

    Ok(FrameSequence {
        dir,
        frames: count,
        fps,
        dimensions,
    })
}

/// Frame rate from per-frame delays in milliseconds
pub fn frame_rate(delays_ms: &[f64], default_fps: f64) -> f64 {
    let positive: Vec<f64> = delays_ms.iter().copied().filter(|d| *d > 0.0).collect();
    if positive.is_empty() {
        return default_fps;
    }
    let mean = positive.iter().sum::<f64>() / positive.len() as f64;
    (1000.0 / mean).clamp(MIN_FPS, MAX_FPS)
}
