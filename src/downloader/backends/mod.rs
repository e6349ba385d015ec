// Downloader backends

pub mod ffmpeg;
pub mod ytdlp;

pub use ffmpeg::FfmpegMuxer;
pub use ytdlp::YtDlpBackend;
