// Error types for the resolve/download pipeline

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::extractors::{diagnose_error, FailureReason};
use super::tools::ToolType;

/// Failure reported by the extraction tool (network, site or content problems).
#[derive(Debug, Clone, Error)]
#[error("{}: {detail}", .reason.description())]
pub struct ExtractionError {
    pub reason: FailureReason,
    /// Most relevant line of the tool's output
    pub detail: String,
}

impl ExtractionError {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Classify raw stderr from yt-dlp.
    pub fn from_stderr(stderr: &str) -> Self {
        let reason = diagnose_error(stderr).unwrap_or(FailureReason::Unknown);
        Self {
            reason,
            detail: summarize_stderr(stderr),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// ffmpeg ran but could not combine the streams
    #[error("merging streams failed: {reason}")]
    Mux { reason: String, kept: Vec<PathBuf> },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// A required external binary is not installed
    #[error("{} is not installed", .tool.as_str())]
    DependencyMissing { tool: ToolType, kept: Vec<PathBuf> },

    #[error("another job is still running")]
    Busy,

    #[error("selection is out of date: {0}")]
    StaleSelection(String),

    #[error("no format selected")]
    NothingSelected,
}

impl DownloadError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn missing(tool: ToolType) -> Self {
        Self::DependencyMissing {
            tool,
            kept: Vec::new(),
        }
    }

    /// Files left on disk by a failed job
    pub fn kept_files(&self) -> &[PathBuf] {
        match self {
            Self::Mux { kept, .. } | Self::DependencyMissing { kept, .. } => kept.as_slice(),
            _ => &[],
        }
    }

    /// Attach already downloaded streams to a post-processing failure.
    pub fn with_kept(self, files: Vec<PathBuf>) -> Self {
        match self {
            Self::Mux { reason, .. } => Self::Mux { reason, kept: files },
            Self::DependencyMissing { tool, .. } => Self::DependencyMissing { tool, kept: files },
            other => other,
        }
    }

    /// Message for the presentation layer, with hints where we have them.
    pub fn user_message(&self) -> String {
        let mut msg = match self {
            Self::Extraction(e) => {
                let mut msg = e.to_string();
                if let Some(explanation) = e.reason.user_explanation() {
                    msg.push_str("\n\n");
                    msg.push_str(explanation);
                }
                let tips = e.reason.suggestions();
                if !tips.is_empty() {
                    msg.push_str("\n\nWhat to try:");
                    for (i, tip) in tips.iter().enumerate() {
                        msg.push_str(&format!("\n{}) {}", i + 1, tip));
                    }
                }
                msg
            }
            Self::DependencyMissing { tool, .. } => {
                format!("{} is required but was not found.\n{}", tool.as_str(), tool.install_hint())
            }
            other => other.to_string(),
        };

        let kept = self.kept_files();
        if !kept.is_empty() {
            msg.push_str("\n\nDownloaded streams were kept:");
            for path in kept {
                msg.push_str(&format!("\n  {}", path.display()));
            }
        }
        msg
    }
}

/// Pick the most useful lines out of a tool's stderr.
fn summarize_stderr(stderr: &str) -> String {
    let important: Vec<&str> = stderr
        .lines()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("ERROR:"))
        .take(2)
        .collect();

    if !important.is_empty() {
        return important.join(" | ");
    }

    stderr
        .lines()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .unwrap_or("no output from tool")
        .chars()
        .take(200)
        .collect()
}
