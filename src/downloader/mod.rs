// Downloader module - resolve, select, download, merge

pub mod backends;
pub mod driver;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod tools;
pub mod traits;
pub mod utils;

pub use backends::{FfmpegMuxer, YtDlpBackend};
pub use driver::DownloadDriver;
pub use errors::{DownloadError, ExtractionError};
pub use extractors::{CliInfoExtractor, ExtractorConfig, FailureReason, InfoExtractor};
pub use models::{
    DownloadJob, DownloadOutcome, FormatDescriptor, ProgressSample, Resolution, Selection, Stage,
};
pub use orchestrator::{Session, SessionEvent, SessionState};
pub use resolver::FormatResolver;
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use traits::{DownloaderBackend, Muxer};
