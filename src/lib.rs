//! Resolve a video URL into quality options, then download (and merge) the
//! chosen one with `yt-dlp` and `ffmpeg`.
//!
//! [`Session`] is the entry point: submit a URL, pick a format, start the
//! download and poll [`Session::next_event`] until it returns `None`.

pub mod config;
pub mod downloader;
pub mod ytdlp;

use std::sync::Arc;

pub use config::{AppConfig, ConfigError};
pub use downloader::{
    DownloadError, DownloadJob, DownloadOutcome, ExtractionError, FailureReason,
    FormatDescriptor, ProgressSample, Resolution, Session, SessionEvent, SessionState, Stage,
    ToolInfo, ToolManager, ToolType,
};

use downloader::{
    CliInfoExtractor, DownloadDriver, ExtractorConfig, FfmpegMuxer, FormatResolver, YtDlpBackend,
};

/// Session backed by the real yt-dlp and ffmpeg binaries.
pub fn build_session(config: &AppConfig) -> Session {
    let tools = ToolManager::new(config);
    let ytdlp = tools.resolve(ToolType::YtDlp);
    let ffmpeg = tools.resolve(ToolType::Ffmpeg);
    tracing::debug!(
        ytdlp = %ytdlp.display(),
        ffmpeg = %ffmpeg.display(),
        "[setup] tool paths"
    );

    let extractor = CliInfoExtractor::new(ytdlp.clone(), ExtractorConfig::from(config));
    let backend = YtDlpBackend::new(ytdlp, config.clone());
    let muxer = FfmpegMuxer::new(ffmpeg, config.merge_format.clone());

    Session::new(
        FormatResolver::new(Arc::new(extractor)),
        DownloadDriver::new(Arc::new(backend), Arc::new(muxer), config),
        config,
    )
}
