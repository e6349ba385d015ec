use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }

    /// How to provision the tool on this platform. Installing is left to the user.
    pub fn install_hint(&self) -> &'static str {
        match self {
            ToolType::YtDlp => {
                if cfg!(target_os = "macos") {
                    "Install it with `brew install yt-dlp` or `python3 -m pip install -U yt-dlp`."
                } else {
                    "Install it with `python3 -m pip install -U yt-dlp`."
                }
            }
            ToolType::Ffmpeg => {
                if cfg!(target_os = "windows") {
                    "Download a build from https://ffmpeg.org/download.html and add its bin folder to PATH."
                } else if cfg!(target_os = "macos") {
                    "Install it with `brew install ffmpeg` (Homebrew: https://brew.sh/)."
                } else {
                    "Install it with your package manager, e.g. `sudo apt install ffmpeg`, \
                     `sudo dnf install ffmpeg` or `sudo pacman -S ffmpeg`."
                }
            }
        }
    }

    fn binary_name(&self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

/// Locates the external binaries the pipeline shells out to.
pub struct ToolManager {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

impl ToolManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ytdlp_override: config.ytdlp_path.clone(),
            ffmpeg_override: config.ffmpeg_path.clone(),
        }
    }

    /// Path to run for `tool`. Falls back to the bare name so a missing tool
    /// surfaces as a spawn failure at the call site.
    pub fn resolve(&self, tool: ToolType) -> PathBuf {
        self.detect_tool(tool)
            .unwrap_or_else(|| PathBuf::from(tool.binary_name()))
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.detect_tool(tool_type);
        let version = path.as_deref().and_then(|p| Self::get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    fn override_for(&self, tool: ToolType) -> Option<&Path> {
        match tool {
            ToolType::YtDlp => self.ytdlp_override.as_deref(),
            ToolType::Ffmpeg => self.ffmpeg_override.as_deref(),
        }
    }

    fn detect_tool(&self, tool: ToolType) -> Option<PathBuf> {
        if let Some(path) = self.override_for(tool) {
            return Some(path.to_path_buf());
        }

        let binary_name = tool.binary_name();

        // 1. Try common paths first
        let common_dirs = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];
        for dir in common_dirs {
            let candidate = Path::new(dir).join(&binary_name);
            if candidate.exists() {
                return Some(candidate);
            }
        }

        // 2. Try PATH
        let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
        if let Ok(output) = Command::new(finder).arg(&binary_name).output() {
            if output.status.success() {
                let found = String::from_utf8_lossy(&output.stdout);
                if let Some(first) = found.lines().map(str::trim).find(|l| !l.is_empty()) {
                    return Some(PathBuf::from(first));
                }
            }
        }

        None
    }

    fn get_version(path: &Path, tool: ToolType) -> Option<String> {
        match Command::new(path).arg(tool.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}
