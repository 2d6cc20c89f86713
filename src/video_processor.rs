//! # Video Processing Module
//!
//! Questo modulo gestisce la codifica WEBM (VP9 + Opus) tramite un
//! transcoder esterno.
//!
//! ## Responsabilità:
//! - Probe delle dimensioni sorgente e della presenza di audio
//! - Pianificazione dimensioni (bounding box) con arrotondamento a valori pari
//! - Transcodifica di un container video o di una sequenza di frame PNG
//! - Verifica dell'output (exit code, file non vuoto)
//! - Cache di `ToolUnavailable`: dopo il primo fallimento non si spawna più nulla
//!
//! ## Transcoder:
//! Il trait `Transcoder` è la capability iniettata. In produzione
//! `FfmpegTranscoder` pilota `ffprobe`/`ffmpeg` con `tokio::process`; nei
//! test un fake registra le richieste e scrive un output finto.
//!
//! ## Parametri ffmpeg:
//! - Codec video: `libvpx-vp9`, CRF configurabile (default 30), `-b:v 0`
//! - Codec audio: `libopus` (default 96k) se la sorgente ha audio, altrimenti `-an`
//! - Container: `webm`
//!
//! Nessun timeout sulla transcodifica: un ffmpeg bloccato blocca il task.

use crate::config::Config;
use crate::dimensions::{DimensionPlanner, Dimensions};
use crate::error::{IngestError, Result};
use crate::persist;
use crate::tool_resolver::ToolPathResolver;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tempfile::{Builder, TempPath};
use tracing::{debug, info, warn};

/// Source properties reported by the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeInput {
    /// A video container on disk
    File(PathBuf),
    /// Numbered PNG frames (`frame_%05d.png`) played at `fps`
    FrameSequence { pattern: PathBuf, fps: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub input: TranscodeInput,
    pub output: PathBuf,
    pub dimensions: Dimensions,
    pub crf: u8,
    /// Opus bitrate, `None` for audio-free output
    pub audio_bitrate: Option<String>,
}

/// External transcoding capability
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<VideoProbe>;
    async fn transcode(&self, request: &TranscodeRequest) -> Result<()>;
}

/// `ffmpeg`/`ffprobe` driven through `tokio::process`
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_resolver(resolver: &ToolPathResolver) -> Self {
        Self::new(resolver.ffmpeg(), resolver.ffprobe())
    }

    async fn run(program: &Path, args: Vec<OsString>) -> Result<std::process::Output> {
        debug!("Running {} {:?}", program.display(), args);
        let output = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    IngestError::ToolUnavailable(format!("{} not found", program.display()))
                } else {
                    IngestError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::Encode(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn transcode_args(request: &TranscodeRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();

        match &request.input {
            TranscodeInput::File(source) => {
                args.push("-i".into());
                args.push(source.as_os_str().to_owned());
            }
            TranscodeInput::FrameSequence { pattern, fps } => {
                args.push("-framerate".into());
                args.push(format!("{:.3}", fps).into());
                args.push("-i".into());
                args.push(pattern.as_os_str().to_owned());
            }
        }

        let Dimensions { width, height } = request.dimensions;
        let crf = request.crf.to_string();
        let scale = format!("scale={}:{}", width, height);
        for arg in ["-vf", scale.as_str(), "-c:v", "libvpx-vp9", "-crf", crf.as_str(), "-b:v", "0"] {
            args.push(arg.into());
        }
        if matches!(request.input, TranscodeInput::FrameSequence { .. }) {
            // Mantiene la trasparenza delle animazioni
            args.push("-pix_fmt".into());
            args.push("yuva420p".into());
        }

        match &request.audio_bitrate {
            Some(bitrate) => {
                for arg in ["-c:a", "libopus", "-b:a", bitrate.as_str()] {
                    args.push(arg.into());
                }
            }
            None => args.push("-an".into()),
        }

        args.push("-f".into());
        args.push("webm".into());
        args.push(request.output.as_os_str().to_owned());
        args
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parse `ffprobe -print_format json -show_streams` output
fn parse_probe(json: &[u8]) -> Result<VideoProbe> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| IngestError::Encode(format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| IngestError::Encode("source has no video stream".to_string()))?;

    Ok(VideoProbe {
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    })
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, source: &Path) -> Result<VideoProbe> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_streams".into(),
            source.as_os_str().to_owned(),
        ];
        let output = Self::run(&self.ffprobe, args).await?;
        parse_probe(&output.stdout)
    }

    async fn transcode(&self, request: &TranscodeRequest) -> Result<()> {
        let start_time = std::time::Instant::now();
        Self::run(&self.ffmpeg, Self::transcode_args(request)).await?;
        debug!(
            "ffmpeg finished in {:.1}s: {}",
            start_time.elapsed().as_secs_f64(),
            request.output.display()
        );
        Ok(())
    }
}

/// Copia dei byte caricati in un file temporaneo leggibile da ffmpeg
async fn temp_source(bytes: &[u8], extension: &str) -> Result<TempPath> {
    let owned = bytes.to_vec();
    let suffix = format!(".{}", extension);
    tokio::task::spawn_blocking(move || -> Result<TempPath> {
        let mut source = Builder::new().prefix("media-ingest-").suffix(&suffix).tempfile()?;
        source.as_file_mut().write_all(&owned)?;
        Ok(source.into_temp_path())
    })
    .await
    .map_err(persist::worker_error)?
}

/// Produces WEBM outputs through a `Transcoder`
pub struct VideoEncoder {
    transcoder: Arc<dyn Transcoder>,
    planner: DimensionPlanner,
    crf: u8,
    audio_bitrate: String,
    unavailable: OnceLock<String>,
}

impl VideoEncoder {
    pub fn new(transcoder: Arc<dyn Transcoder>, config: &Config) -> Self {
        Self {
            transcoder,
            planner: DimensionPlanner::new(config.max_width, config.max_height),
            crf: config.video_crf,
            audio_bitrate: config.audio_bitrate.clone(),
            unavailable: OnceLock::new(),
        }
    }

    /// Fail fast once the transcoder is known to be missing
    fn ensure_available(&self) -> Result<()> {
        match self.unavailable.get() {
            Some(reason) => Err(IngestError::ToolUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn remember<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(IngestError::ToolUnavailable(reason)) = &result {
            if self.unavailable.set(reason.clone()).is_ok() {
                warn!("Transcoder unavailable, video ingestion disabled: {}", reason);
            }
        }
        result
    }

    /// Transcode an uploaded video held in memory
    pub async fn encode_bytes(&self, bytes: &[u8], extension: &str, output: &Path) -> Result<Dimensions> {
        self.ensure_available()?;
        let source = temp_source(bytes, extension).await?;
        self.encode_video(&source, output).await
    }

    /// Source dimensions and audio presence of a video held in memory
    pub async fn source_info(&self, bytes: &[u8], extension: &str) -> Result<VideoProbe> {
        self.ensure_available()?;
        let source = temp_source(bytes, extension).await?;
        self.remember(self.transcoder.probe(&source).await)
    }

    /// Probe, plan (even dimensions) and transcode a video container
    pub async fn encode_video(&self, source: &Path, output: &Path) -> Result<Dimensions> {
        self.ensure_available()?;

        let probe = self.remember(self.transcoder.probe(source).await)?;
        let dimensions = self.planner.plan(probe.width, probe.height)?.to_even();
        debug!(
            "Video {}x{} (audio: {}) -> {}x{}",
            probe.width, probe.height, probe.has_audio, dimensions.width, dimensions.height
        );

        let audio_bitrate = probe.has_audio.then(|| self.audio_bitrate.clone());
        self.transcode_to(TranscodeInput::File(source.to_path_buf()), dimensions, audio_bitrate, output)
            .await
    }

    /// Encode an already-planned frame sequence as an audio-free WEBM
    pub async fn encode_frames(
        &self,
        pattern: &Path,
        fps: f64,
        dimensions: Dimensions,
        output: &Path,
    ) -> Result<Dimensions> {
        self.ensure_available()?;
        let input = TranscodeInput::FrameSequence {
            pattern: pattern.to_path_buf(),
            fps,
        };
        self.transcode_to(input, dimensions.to_even(), None, output).await
    }

    /// Transcode into a hidden temp file next to `output`, verify, then rename
    async fn transcode_to(
        &self,
        input: TranscodeInput,
        dimensions: Dimensions,
        audio_bitrate: Option<String>,
        output: &Path,
    ) -> Result<Dimensions> {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(dir).await?;

        let temp_dir = dir.to_path_buf();
        let temp = tokio::task::spawn_blocking(move || {
            Builder::new()
                .prefix(".ingest-")
                .suffix(".webm")
                .tempfile_in(temp_dir)
                .map(|file| file.into_temp_path())
        })
        .await
        .map_err(persist::worker_error)??;

        let request = TranscodeRequest {
            input,
            output: temp.to_path_buf(),
            dimensions,
            crf: self.crf,
            audio_bitrate,
        };
        self.remember(self.transcoder.transcode(&request).await)?;

        let size = tokio::fs::metadata(&temp).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(IngestError::Encode("transcoder produced empty output".to_string()));
        }

        let target = output.to_path_buf();
        tokio::task::spawn_blocking(move || temp.persist(target))
            .await
            .map_err(persist::worker_error)?
            .map_err(|e| IngestError::Io(e.error))?;
        info!(
            "Encoded {} ({}x{}, {} bytes)",
            output.display(),
            dimensions.width,
            dimensions.height,
            size
        );
        Ok(dimensions)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum FakeMode {
        Succeed,
        Missing,
        Fail,
        Empty,
    }

    /// Records requests and writes stub output instead of running ffmpeg
    pub(crate) struct FakeTranscoder {
        pub mode: FakeMode,
        pub probe: VideoProbe,
        pub requests: Mutex<Vec<TranscodeRequest>>,
        pub frames_seen: Mutex<Vec<usize>>,
        pub calls: AtomicUsize,
    }

    impl FakeTranscoder {
        pub fn new(mode: FakeMode) -> Self {
            Self::with_probe(
                mode,
                VideoProbe {
                    width: 1920,
                    height: 1080,
                    has_audio: true,
                },
            )
        }

        pub fn with_probe(mode: FakeMode, probe: VideoProbe) -> Self {
            Self {
                mode,
                probe,
                requests: Mutex::new(Vec::new()),
                frames_seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<TranscodeRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn frames_seen(&self) -> Vec<usize> {
            self.frames_seen.lock().unwrap().clone()
        }

        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                FakeMode::Missing => Err(IngestError::ToolUnavailable("ffmpeg not found".into())),
                FakeMode::Fail => Err(IngestError::Encode("ffmpeg exited with 1".into())),
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn probe(&self, _source: &Path) -> Result<VideoProbe> {
            self.check()?;
            Ok(self.probe)
        }

        async fn transcode(&self, request: &TranscodeRequest) -> Result<()> {
            self.check()?;
            if let TranscodeInput::FrameSequence { pattern, .. } = &request.input {
                let dir = pattern.parent().unwrap();
                let frames = std::fs::read_dir(dir)
                    .unwrap()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().map_or(false, |x| x == "png"))
                    .count();
                self.frames_seen.lock().unwrap().push(frames);
            }
            self.requests.lock().unwrap().push(request.clone());
            let body: &[u8] = if self.mode == FakeMode::Empty { b"" } else { b"\x1a\x45\xdf\xa3webm" };
            std::fs::write(&request.output, body)?;
            Ok(())
        }
    }

    fn encoder(fake: Arc<FakeTranscoder>) -> VideoEncoder {
        VideoEncoder::new(fake, &Config::default())
    }

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect()
    }

    #[tokio::test]
    async fn test_encode_video_plans_even_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::with_probe(
            FakeMode::Succeed,
            VideoProbe {
                width: 1000,
                height: 999,
                has_audio: false,
            },
        ));
        let output = temp_dir.path().join("media").join("clip.webm");

        let dims = encoder(fake.clone()).encode_bytes(b"fake mp4", "mp4", &output).await.unwrap();
        // 576/1000 = 0.576 -> 576 x 575.4 -> 576 x 575 -> even 576 x 574
        assert_eq!(dims, Dimensions::new(576, 574));
        assert!(output.exists());

        let request = &fake.requests()[0];
        assert_eq!(request.crf, 30);
        assert!(request.audio_bitrate.is_none());
        assert!(matches!(request.input, TranscodeInput::File(_)));
        assert_eq!(dir_entries(&temp_dir.path().join("media")), vec![output]);
    }

    #[tokio::test]
    async fn test_audio_stream_gets_opus() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Succeed));
        let output = temp_dir.path().join("clip.webm");

        let dims = encoder(fake.clone()).encode_bytes(b"x", "mov", &output).await.unwrap();
        assert_eq!(dims, Dimensions::new(576, 324));
        assert_eq!(fake.requests()[0].audio_bitrate.as_deref(), Some("96k"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_cached() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Missing));
        let encoder = encoder(fake.clone());
        let output = temp_dir.path().join("clip.webm");

        let first = encoder.encode_bytes(b"x", "mp4", &output).await.unwrap_err();
        assert!(matches!(first, IngestError::ToolUnavailable(_)));
        assert_eq!(fake.calls(), 1);

        let second = encoder.encode_bytes(b"x", "mp4", &output).await.unwrap_err();
        assert!(matches!(second, IngestError::ToolUnavailable(_)));
        assert_eq!(fake.calls(), 1, "cached failure must not reach the transcoder");
        assert!(dir_entries(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_source_info_reads_dimensions_and_audio() {
        let fake = Arc::new(FakeTranscoder::new(FakeMode::Succeed));
        let info = encoder(fake.clone()).source_info(b"x", "mkv").await.unwrap();
        assert_eq!((info.width, info.height, info.has_audio), (1920, 1080, true));
        assert!(fake.requests().is_empty(), "reading source info must not transcode");

        let missing = Arc::new(FakeTranscoder::new(FakeMode::Missing));
        let encoder = encoder(missing.clone());
        assert!(matches!(
            encoder.source_info(b"x", "mp4").await,
            Err(IngestError::ToolUnavailable(_))
        ));
        assert!(matches!(
            encoder.source_info(b"x", "mp4").await,
            Err(IngestError::ToolUnavailable(_))
        ));
        assert_eq!(missing.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_or_empty_encode_leaves_nothing() {
        for mode in [FakeMode::Fail, FakeMode::Empty] {
            let temp_dir = TempDir::new().unwrap();
            let fake = Arc::new(FakeTranscoder::new(mode));
            let output = temp_dir.path().join("clip.webm");

            let err = encoder(fake).encode_bytes(b"x", "mp4", &output).await.unwrap_err();
            assert!(matches!(err, IngestError::Encode(_)), "{:?}", mode);
            assert!(dir_entries(temp_dir.path()).is_empty(), "{:?}", mode);
        }
    }

    #[tokio::test]
    async fn test_zero_sized_probe_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeTranscoder::with_probe(
            FakeMode::Succeed,
            VideoProbe {
                width: 0,
                height: 720,
                has_audio: false,
            },
        ));
        let err = encoder(fake.clone())
            .encode_bytes(b"x", "mp4", &temp_dir.path().join("clip.webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidDimensions { .. }));
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_of_missing_binary_is_tool_unavailable() {
        let transcoder = FfmpegTranscoder::new(
            "/nonexistent/media-ingest/ffmpeg",
            "/nonexistent/media-ingest/ffprobe",
        );
        let err = transcoder.probe(Path::new("clip.mp4")).await.unwrap_err();
        assert!(matches!(err, IngestError::ToolUnavailable(_)));
    }

    #[test]
    fn test_parse_probe() {
        let json = br#"{"streams": [
            {"index": 0, "codec_type": "video", "width": 1280, "height": 720},
            {"index": 1, "codec_type": "audio"}
        ]}"#;
        let probe = parse_probe(json).unwrap();
        assert_eq!(
            probe,
            VideoProbe {
                width: 1280,
                height: 720,
                has_audio: true
            }
        );

        assert!(matches!(
            parse_probe(br#"{"streams": [{"codec_type": "audio"}]}"#),
            Err(IngestError::Encode(_))
        ));
        assert!(parse_probe(b"garbage").is_err());
    }

    #[test]
    fn test_transcode_args() {
        let request = TranscodeRequest {
            input: TranscodeInput::FrameSequence {
                pattern: PathBuf::from("/tmp/frames/frame_%05d.png"),
                fps: 10.0,
            },
            output: PathBuf::from("/data/media/.ingest-x.webm"),
            dimensions: Dimensions::new(100, 100),
            crf: 30,
            audio_bitrate: None,
        };
        let args: Vec<String> = FfmpegTranscoder::transcode_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        let joined = args.join(" ");
        assert!(joined.contains("-framerate 10.000 -i /tmp/frames/frame_%05d.png"));
        assert!(joined.contains("-vf scale=100:100"));
        assert!(joined.contains("-c:v libvpx-vp9 -crf 30 -b:v 0"));
        assert!(joined.contains("-an"));
        assert!(!joined.contains("libopus"));
        assert_eq!(args.last().unwrap(), "/data/media/.ingest-x.webm");
    }
}
