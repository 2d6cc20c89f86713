//! # Tool Path Resolver
//!
//! Individua i binari esterni usati dal VideoEncoder (`ffmpeg`, `ffprobe`).
//!
//! ## Ordine di risoluzione:
//! 1. Override esplicito in `Config` (`ffmpeg_path` / `ffprobe_path`)
//! 2. Directory indicata da `TOOLS_DIR`
//! 3. Directory `tools/` accanto all'eseguibile
//! 4. `PATH` di sistema
//!
//! Se nessuna strategia trova il tool, si usa il nome nudo: sarà lo spawn
//! fallito a produrre `ToolUnavailable`.

use crate::config::Config;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Tool path resolver for bundled and system binaries
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    /// Directory where tools are bundled
    tools_dir: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
    ffprobe_override: Option<PathBuf>,
}

impl ToolPathResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
            ffmpeg_override: config.ffmpeg_path.clone(),
            ffprobe_override: config.ffprobe_path.clone(),
        }
    }

    /// Resolver with an explicit tools directory and no overrides
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
            ..Default::default()
        }
    }

    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        if let Ok(tools_dir) = env::var("TOOLS_DIR") {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking TOOLS_DIR environment variable: {:?}", tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        if let Ok(exe_path) = env::current_exe() {
            if let Some(app_dir) = exe_path.parent() {
                let tools_path = app_dir.join("tools");
                debug!("Checking bundled path: {:?}", tools_path);
                if tools_path.is_dir() {
                    return Some(tools_path);
                }
            }
        }

        debug!("No bundled tools directory found");
        None
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let explicit = match tool_name {
            FFMPEG => self.ffmpeg_override.as_ref(),
            FFPROBE => self.ffprobe_override.as_ref(),
            _ => None,
        };
        if let Some(path) = explicit {
            if path.exists() {
                debug!("Using configured tool: {} -> {:?}", tool_name, path);
                return Some(path.clone());
            }
            warn!("Configured {} does not exist: {}", tool_name, path.display());
        }

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = Self::bundled_tool_path(tools_dir, tool_name);
            if bundled_path.exists() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        if let Some(system_path) = Self::find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        None
    }

    /// Resolved path, or the bare program name for the spawn to fail on
    pub fn program(&self, tool_name: &str) -> PathBuf {
        self.resolve_tool(tool_name)
            .unwrap_or_else(|| PathBuf::from(executable_name(tool_name)))
    }

    pub fn ffmpeg(&self) -> PathBuf {
        self.program(FFMPEG)
    }

    pub fn ffprobe(&self) -> PathBuf {
        self.program(FFPROBE)
    }

    /// `tools/<tool>` or `tools/<platform>/<tool>`
    fn bundled_tool_path(tools_dir: &Path, tool_name: &str) -> PathBuf {
        let exe = executable_name(tool_name);
        let direct_path = tools_dir.join(&exe);
        if direct_path.exists() {
            return direct_path;
        }
        tools_dir.join(env::consts::OS).join(exe)
    }

    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let exe = executable_name(tool_name);
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&exe))
            .find(|path| path.is_file())
    }

    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Human-readable availability report (CLI `tools`)
    pub fn tools_report(&self) -> String {
        let mut report = String::new();
        report.push_str("Tool Path Resolver Report\n");
        report.push_str(&format!("Bundled tools dir: {:?}\n", self.tools_dir));
        report.push_str("\nTranscoder:\n");

        for tool in [FFMPEG, FFPROBE] {
            match self.resolve_tool(tool) {
                Some(path) => report.push_str(&format!("  ✅ {} -> {:?}\n", tool, path)),
                None => report.push_str(&format!(
                    "  ❌ {} (install with: {})\n",
                    tool,
                    install_instructions(tool)
                )),
            }
        }

        report
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

fn install_instructions(tool_name: &str) -> &'static str {
    match tool_name {
        FFMPEG | FFPROBE if cfg!(target_os = "macos") => "brew install ffmpeg",
        FFMPEG | FFPROBE if cfg!(windows) => "winget install ffmpeg",
        _ => "sudo apt-get install ffmpeg",
    }
}
