// Common data models for the resolve/download pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which yt-dlp streams a descriptor stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamSelection {
    /// One format that already carries audio and video
    Single { format_id: String },
    /// Separate video and audio formats that must be muxed
    Merge { video_id: String, audio_id: String },
}

impl StreamSelection {
    /// Opaque token handed back on download, `137+140` for merged pairs
    pub fn token(&self) -> String {
        match self {
            Self::Single { format_id } => format_id.clone(),
            Self::Merge { video_id, audio_id } => format!("{}+{}", video_id, audio_id),
        }
    }
}

/// One downloadable quality, as offered to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Token identifying this exact stream choice
    pub id: String,
    /// Display label (e.g., "1080p (1920x1080, H.264, ~150 MB)")
    pub label: String,
    pub requires_mux: bool,
    pub selection: StreamSelection,
    pub height: Option<u32>,
    pub width: Option<u32>,
    /// Container of the (video) stream
    pub ext: String,
    pub codec: Option<String>,
    pub estimated_size: Option<u64>,
}

/// Outcome of one successful resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Generation number assigned by the session; jobs must carry it back
    pub id: u64,
    pub url: String,
    pub title: String,
    /// Never empty, recommended first
    pub formats: Vec<FormatDescriptor>,
}

impl Resolution {
    pub fn find(&self, format_id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.id == format_id)
    }

    /// The resolver's recommendation
    pub fn recommended(&self) -> Option<&FormatDescriptor> {
        self.formats.first()
    }
}

/// The user's pick, filled in before a download starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub format_id: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// Everything one driver invocation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub resolution_id: u64,
    pub url: String,
    pub format_id: String,
    pub dest_dir: PathBuf,
}

/// Where the job currently is, for status text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Downloading { stream: usize, of: usize },
    Merging,
}

/// One progress report for the whole job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub downloaded_bytes: u64,
    /// Unknown for live streams and some fragmented formats
    pub total_bytes: Option<u64>,
    /// 0.0..=100.0, unknown when no stream reports a total
    pub percent: Option<f64>,
}

impl ProgressSample {
    pub fn is_complete(&self) -> bool {
        self.percent.map_or(false, |p| p >= 100.0)
    }
}

/// Result of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// The media file the user asked for
    pub output: PathBuf,
    /// Separate streams left next to it (only with `keep_streams`)
    pub kept_streams: Vec<PathBuf>,
    pub bytes: u64,
}

/// Per-stream progress as reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Metadata of the produced file for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedStream {
    pub path: PathBuf,
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_token_joins_ids() {
        let sel = StreamSelection::Merge {
            video_id: "137".to_string(),
            audio_id: "140".to_string(),
        };
        assert_eq!(sel.token(), "137+140");
    }

    #[test]
    fn test_complete_sample() {
        let done = ProgressSample {
            downloaded_bytes: 10,
            total_bytes: Some(10),
            percent: Some(100.0),
        };
        let live = ProgressSample {
            downloaded_bytes: 10,
            total_bytes: None,
            percent: None,
        };
        assert!(done.is_complete());
        assert!(!live.is_complete());
    }
}
