//! # Format Classification Module
//!
//! Determina il tipo di media in ingresso e il formato canonico di uscita.
//!
//! ## Strategia di rilevamento:
//! 1. **Magic bytes**: firma del container (PNG, JPEG, GIF, RIFF/WEBP, RIFF/AVI,
//!    ISO BMFF per MP4/MOV, EBML per WEBM/MKV, FLV, ASF per WMV, BMP, TIFF)
//! 2. **Estensione**: fallback quando nessuna firma corrisponde
//! 3. **Animazione**: GIF e WEBP vengono ispezionati per contare i frame
//!
//! ## Matrice di output (fissa):
//! | Kind           | Output                          |
//! |----------------|---------------------------------|
//! | ImageStatic    | JPG per sorgenti JPEG, altrimenti PNG |
//! | ImageAnimated  | WEBM                            |
//! | Video          | WEBM                            |

use crate::error::{IngestError, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// Base container format of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    Mp4,
    Mov,
    Webm,
    Mkv,
    Avi,
    Flv,
    Wmv,
}

impl SourceFormat {
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            SourceFormat::Mp4
                | SourceFormat::Mov
                | SourceFormat::Webm
                | SourceFormat::Mkv
                | SourceFormat::Avi
                | SourceFormat::Flv
                | SourceFormat::Wmv
        )
    }

    /// Estensione usata per i file temporanei passati a ffmpeg
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Png => "png",
            SourceFormat::Jpeg => "jpg",
            SourceFormat::Gif => "gif",
            SourceFormat::Webp => "webp",
            SourceFormat::Bmp => "bmp",
            SourceFormat::Tiff => "tiff",
            SourceFormat::Mp4 => "mp4",
            SourceFormat::Mov => "mov",
            SourceFormat::Webm => "webm",
            SourceFormat::Mkv => "mkv",
            SourceFormat::Avi => "avi",
            SourceFormat::Flv => "flv",
            SourceFormat::Wmv => "wmv",
        }
    }

    /// Map a (case-insensitive) filename extension to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext.to_lowercase().as_str() {
            "png" => SourceFormat::Png,
            "jpg" | "jpeg" => SourceFormat::Jpeg,
            "gif" => SourceFormat::Gif,
            "webp" => SourceFormat::Webp,
            "bmp" => SourceFormat::Bmp,
            "tif" | "tiff" => SourceFormat::Tiff,
            "mp4" | "m4v" => SourceFormat::Mp4,
            "mov" => SourceFormat::Mov,
            "webm" => SourceFormat::Webm,
            "mkv" => SourceFormat::Mkv,
            "avi" => SourceFormat::Avi,
            "flv" => SourceFormat::Flv,
            "wmv" => SourceFormat::Wmv,
            _ => return None,
        };
        Some(format)
    }

    /// Sniff the container signature
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(SourceFormat::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(SourceFormat::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(SourceFormat::Gif);
        }
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
            match &bytes[8..12] {
                b"WEBP" => return Some(SourceFormat::Webp),
                b"AVI " => return Some(SourceFormat::Avi),
                _ => {}
            }
        }
        if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
            // `qt  ` è il brand QuickTime, tutto il resto è famiglia MP4
            return if &bytes[8..12] == b"qt  " {
                Some(SourceFormat::Mov)
            } else {
                Some(SourceFormat::Mp4)
            };
        }
        if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
            let head = &bytes[..bytes.len().min(64)];
            return if head.windows(4).any(|w| w == b"webm") {
                Some(SourceFormat::Webm)
            } else {
                Some(SourceFormat::Mkv)
            };
        }
        if bytes.starts_with(b"FLV\x01") {
            return Some(SourceFormat::Flv);
        }
        if bytes.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11]) {
            return Some(SourceFormat::Wmv);
        }
        if is_bmp_header(bytes) {
            return Some(SourceFormat::Bmp);
        }
        if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
            return Some(SourceFormat::Tiff);
        }
        None
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Media kind of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    ImageStatic,
    ImageAnimated,
    Video,
}

/// Canonical output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpg,
    Webm,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Webm => "webm",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Result of classifying an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub source: SourceFormat,
    pub kind: MediaKind,
    pub output: OutputFormat,
}

/// Stateless classifier for uploaded media
pub struct FormatClassifier;

impl FormatClassifier {
    /// Classify raw bytes, falling back to the declared filename extension
    pub fn classify(bytes: &[u8], filename: &str) -> Result<Classification> {
        let source = SourceFormat::sniff(bytes)
            .or_else(|| {
                Path::new(filename)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(SourceFormat::from_extension)
            })
            .ok_or_else(|| IngestError::UnsupportedFormat(filename.to_string()))?;

        let kind = match source {
            s if s.is_video() => MediaKind::Video,
            SourceFormat::Gif if gif_frame_count(bytes) > 1 => MediaKind::ImageAnimated,
            SourceFormat::Webp if webp_frame_count(bytes) > 1 => MediaKind::ImageAnimated,
            _ => MediaKind::ImageStatic,
        };

        let output = match (kind, source) {
            (MediaKind::ImageStatic, SourceFormat::Jpeg) => OutputFormat::Jpg,
            (MediaKind::ImageStatic, _) => OutputFormat::Png,
            (MediaKind::ImageAnimated, _) | (MediaKind::Video, _) => OutputFormat::Webm,
        };

        Ok(Classification { source, kind, output })
    }
}

/// Header BMP coerente: `BM`, dimensione DIB nota, offset dei pixel
/// dopo gli header e dimensione file (se presente) non inferiore all'offset.
fn is_bmp_header(bytes: &[u8]) -> bool {
    const DIB_HEADER_SIZES: [u32; 7] = [12, 40, 52, 56, 64, 108, 124];

    if bytes.len() < 18 || !bytes.starts_with(b"BM") {
        return false;
    }
    let le32 = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let file_size = le32(2);
    let pixel_offset = le32(10);
    let dib_size = le32(14);

    DIB_HEADER_SIZES.contains(&dib_size)
        && pixel_offset >= 14 + dib_size
        && (file_size == 0 || file_size >= pixel_offset)
}

/// Numero di frame di un GIF, fermandosi al secondo: serve solo sapere
/// se è animato. Un GIF illeggibile conta zero frame.
pub fn gif_frame_count(bytes: &[u8]) -> usize {
    match GifDecoder::new(Cursor::new(bytes)) {
        Ok(decoder) => decoder
            .into_frames()
            .take(2)
            .take_while(|frame| frame.is_ok())
            .count(),
        Err(_) => 0,
    }
}

/// Conta i chunk `ANMF` di un WEBP; un WEBP non animato ne ha zero.
pub fn webp_frame_count(bytes: &[u8]) -> usize {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return 0;
    }
    let mut pos = 12;
    let mut frames = 0;
    while pos + 8 <= bytes.len() {
        let fourcc = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        if fourcc == b"ANMF" {
            frames += 1;
        }
        // I chunk RIFF sono allineati a 2 byte
        pos += 8 + size + (size & 1);
    }
    frames
}
