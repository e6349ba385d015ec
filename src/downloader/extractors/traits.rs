// InfoExtractor trait and common types

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::downloader::errors::DownloadError;

/// Configuration for info extraction
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// yt-dlp socket timeout in seconds
    pub socket_timeout_secs: u32,
    /// Upper bound for the whole extraction call
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExtractorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            proxy: config.proxy.clone(),
            cookies_path: config.cookies_path.clone(),
            socket_timeout_secs: config.socket_timeout_secs,
            timeout_secs: config.resolve_timeout_secs,
        }
    }
}

/// Raw format entry from `yt-dlp -J`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    /// Format ID (e.g., "137", "140", "hls-720p")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// File size in bytes
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    pub filesize_approx: Option<u64>,
    /// Total bitrate in kbps
    pub tbr: Option<f32>,
    /// Audio bitrate in kbps
    pub abr: Option<f32>,
    /// Video bitrate in kbps
    pub vbr: Option<f32>,
}

impl RawFormat {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// Carries a video track. A missing codec field counts as unknown, not absent.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v != "none" && !v.is_empty())
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().map_or(false, |a| a != "none" && !a.is_empty())
    }

    pub fn is_progressive(&self) -> bool {
        self.has_video() && self.has_audio()
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    /// Check if format is H.264 (avc1)
    pub fn is_h264(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v.starts_with("avc1"))
    }

    pub fn is_vp9(&self) -> bool {
        self.vcodec
            .as_deref()
            .map_or(false, |v| v.starts_with("vp9") || v.starts_with("vp09"))
    }

    pub fn is_av1(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v.starts_with("av01"))
    }

    /// Check if audio is AAC (m4a)
    pub fn is_aac(&self) -> bool {
        self.acodec.as_deref().map_or(false, |a| a.starts_with("mp4a"))
    }
}

/// Video info with all formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub title: String,
    pub formats: Vec<RawFormat>,
}

/// Trait for info extractors
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Extract video info with formats
    async fn extract(&self, url: &str) -> Result<MediaInfo, DownloadError>;
}
