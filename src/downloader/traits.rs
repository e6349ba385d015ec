// Seams between the download driver and the external tools

use std::path::Path;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{FetchedStream, StreamProgress};

/// Fetches exactly one format of a media URL into a directory
#[async_trait]
pub trait DownloaderBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Download `format_id` into `dest_dir` using the output `template`.
    ///
    /// `progress` is called with cumulative byte counts for this stream only.
    /// On success the returned path is the finished file on disk.
    async fn fetch_stream(
        &self,
        url: &str,
        format_id: &str,
        dest_dir: &Path,
        template: &str,
        progress: &mut (dyn FnMut(StreamProgress) + Send),
    ) -> Result<FetchedStream, DownloadError>;
}

/// Combines one video and one audio file into a single container
#[async_trait]
pub trait Muxer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write `output` or fail; a failed mux must not leave `output` behind.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError>;
}
