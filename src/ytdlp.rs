//! yt-dlp command lines and output parsing.
//!
//! Downloads ask yt-dlp for a machine-readable progress line and a final
//! file path line. Older builds that ignore the template still print the
//! human `[download]  12.5% of ~ 310.04MiB ...` line, which is parsed as a
//! fallback.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::AppConfig;
use crate::downloader::models::StreamProgress;
use crate::downloader::utils::parse_size;

const PROGRESS_MARKER: &str = "[vdl:progress]";
const FILE_MARKER: &str = "[vdl:file]";

/// Template used for the streams of a merge, so video and audio never collide
pub const STREAM_TEMPLATE: &str = "%(title)s.f%(format_id)s.%(ext)s";

/// One classified line of yt-dlp output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Progress(StreamProgress),
    /// Final path after all post-processing
    File(PathBuf),
    Destination(PathBuf),
    AlreadyDownloaded(PathBuf),
    Other,
}

/// Arguments for downloading exactly one format into `dest_dir`.
pub fn download_args(
    url: &str,
    format_id: &str,
    dest_dir: &Path,
    template: &str,
    config: &AppConfig,
) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        format_id.to_string(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "--no-update".to_string(),
        "--socket-timeout".to_string(),
        config.socket_timeout_secs.to_string(),
        // --print implies --quiet; --progress keeps the progress lines coming
        "--progress".to_string(),
        "--progress-template".to_string(),
        format!(
            "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
            PROGRESS_MARKER
        ),
        "--print".to_string(),
        format!("after_move:{} %(filepath)s", FILE_MARKER),
        "-P".to_string(),
        dest_dir.to_string_lossy().to_string(),
        "-o".to_string(),
        template.to_string(),
    ];

    if let Some(path) = &config.cookies_path {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().to_string());
    }

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Classify one line of yt-dlp stdout or stderr.
pub fn parse_line(line: &str) -> OutputLine {
    lazy_static::lazy_static! {
        // Example: [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*[KMGT]?i?B)"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref ALREADY_RE: Regex =
            Regex::new(r"\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
    }

    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.trim_start().strip_prefix(PROGRESS_MARKER) {
        return parse_template_progress(rest).map_or(OutputLine::Other, OutputLine::Progress);
    }

    if let Some(rest) = line.trim_start().strip_prefix(FILE_MARKER) {
        let path = rest.trim();
        if !path.is_empty() && path != "NA" {
            return OutputLine::File(PathBuf::from(path));
        }
        return OutputLine::Other;
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: Option<f64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let total = caps.get(2).and_then(|m| parse_size(m.as_str()));
        if let (Some(percent), Some(total)) = (percent, total) {
            let downloaded = (total as f64 * percent.clamp(0.0, 100.0) / 100.0).round() as u64;
            return OutputLine::Progress(StreamProgress {
                downloaded,
                total: Some(total),
            });
        }
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return OutputLine::Destination(PathBuf::from(caps[1].trim()));
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        return OutputLine::AlreadyDownloaded(PathBuf::from(caps[1].trim()));
    }

    OutputLine::Other
}

/// `<downloaded> <total> <estimate>`, any of them possibly `NA`
fn parse_template_progress(rest: &str) -> Option<StreamProgress> {
    let mut fields = rest.split_whitespace().map(parse_number);
    let downloaded = fields.next()??;
    let total = fields.next().flatten();
    let estimate = fields.next().flatten();
    Some(StreamProgress {
        downloaded,
        total: total.or(estimate),
    })
}

fn parse_number(field: &str) -> Option<u64> {
    if field == "NA" || field == "None" {
        return None;
    }
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}
