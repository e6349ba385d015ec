//! Application configuration.
//!
//! Layers, later wins: built-in defaults, the JSON file under the user's config
//! directory, `VIDEO_DL_*` environment variables, then command-line flags (applied
//! by the caller through the `with_*` builders).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_DIR_NAME: &str = "video-downloader";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where finished media lands
    pub output_dir: PathBuf,
    /// yt-dlp output template, relative to `output_dir`
    pub output_template: String,
    /// Container for merged audio+video
    pub merge_format: String,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    /// SOCKS5/HTTP proxy URL passed to yt-dlp
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// yt-dlp --socket-timeout
    pub socket_timeout_secs: u32,
    /// Coarse bound on one resolution call
    pub resolve_timeout_secs: u64,
    /// Keep the separate streams after a successful merge
    pub keep_streams: bool,
    /// Capacity of the worker -> owner event channel
    pub relay_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("Videos"),
            output_template: "%(title)s.%(ext)s".to_string(),
            merge_format: "mp4".to_string(),
            ytdlp_path: None,
            ffmpeg_path: None,
            proxy: None,
            cookies_path: None,
            socket_timeout_secs: 30,
            resolve_timeout_secs: 120,
            keep_streams: false,
            relay_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Default location of the config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Defaults, then the config file (if present), then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if explicit.is_some() => {
                return Err(ConfigError::Read {
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                    path,
                })
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "[config] loaded config file");
        Ok(config)
    }

    /// Apply `VIDEO_DL_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty("VIDEO_DL_YTDLP") {
            self.ytdlp_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty("VIDEO_DL_FFMPEG") {
            self.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_empty("VIDEO_DL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(proxy) = non_empty("VIDEO_DL_PROXY") {
            self.proxy = Some(proxy);
        }
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output_dir = dir;
        }
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.ytdlp_path = path;
        }
        self
    }

    pub fn with_ffmpeg_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.ffmpeg_path = path;
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.proxy = proxy;
        }
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.cookies_path = path;
        }
        self
    }

    pub fn with_keep_streams(mut self, keep: bool) -> Self {
        self.keep_streams = keep;
        self
    }
}
