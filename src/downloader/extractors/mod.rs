// InfoExtractor module - video info extraction
//
// The CLI extractor runs the `yt-dlp` binary with `-J` and parses its JSON.
// Error output from yt-dlp is classified by `diagnostics` so the user gets
// a reason rather than a raw stack of log lines.

mod cli;
mod diagnostics;
mod traits;

pub use cli::CliInfoExtractor;
pub use diagnostics::{diagnose_error, FailureReason};
pub use traits::{ExtractorConfig, InfoExtractor, MediaInfo, RawFormat};
