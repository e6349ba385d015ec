// CLI InfoExtractor - uses native `yt-dlp` binary
//
// Runs `yt-dlp -J --no-playlist <url>` under a coarse timeout and parses
// the JSON it prints. Non-zero exit is classified from stderr.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::traits::{ExtractorConfig, InfoExtractor, MediaInfo, RawFormat};
use crate::downloader::errors::{DownloadError, ExtractionError};
use crate::downloader::extractors::FailureReason;
use crate::downloader::tools::ToolType;
use crate::downloader::utils::run_output_with_timeout;

/// CLI-based info extractor using yt-dlp binary
pub struct CliInfoExtractor {
    ytdlp_path: PathBuf,
    config: ExtractorConfig,
}

impl CliInfoExtractor {
    pub fn new(ytdlp_path: PathBuf, config: ExtractorConfig) -> Self {
        Self { ytdlp_path, config }
    }

    /// Build command arguments
    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
        ];

        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        // keeps a URL starting with '-' from being read as an option
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Parse JSON output
    pub(crate) fn parse_json(stdout: &[u8]) -> Result<MediaInfo, DownloadError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(json_str.trim()).map_err(|e| {
            ExtractionError::new(FailureReason::MalformedOutput, format!("Invalid JSON: {}", e))
        })?;

        if !json.is_object() {
            return Err(ExtractionError::new(
                FailureReason::MalformedOutput,
                "expected a JSON object",
            )
            .into());
        }

        let formats = match json["formats"].as_array() {
            Some(list) => list.iter().map(Self::parse_format).collect(),
            // Direct media links come back as a single top-level format
            None if json["format_id"].is_string() => vec![Self::parse_format(&json)],
            None => Vec::new(),
        };

        Ok(MediaInfo {
            id: json["id"].as_str().unwrap_or("unknown").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            formats,
        })
    }

    fn parse_format(f: &serde_json::Value) -> RawFormat {
        RawFormat {
            format_id: f["format_id"].as_str().unwrap_or("").to_string(),
            ext: f["ext"].as_str().unwrap_or("").to_string(),
            width: f["width"].as_u64().map(|w| w as u32),
            height: f["height"].as_u64().map(|h| h as u32),
            vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
            acodec: f["acodec"].as_str().map(|s| s.to_string()),
            filesize: f["filesize"].as_u64(),
            filesize_approx: f["filesize_approx"].as_f64().map(|s| s as u64),
            tbr: f["tbr"].as_f64().map(|t| t as f32),
            abr: f["abr"].as_f64().map(|a| a as f32),
            vbr: f["vbr"].as_f64().map(|v| v as f32),
        }
    }
}

#[async_trait]
impl InfoExtractor for CliInfoExtractor {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn extract(&self, url: &str) -> Result<MediaInfo, DownloadError> {
        let args = self.build_args(url);
        debug!(
            "[CliExtractor] {} {}",
            self.ytdlp_path.display(),
            args.join(" ")
        );

        let out = run_output_with_timeout(
            ToolType::YtDlp,
            &self.ytdlp_path,
            &args,
            self.config.timeout_secs,
        )
        .await?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            warn!(status = ?out.status.code(), "[CliExtractor] yt-dlp failed: {}", stderr.trim());
            return Err(ExtractionError::from_stderr(&stderr).into());
        }

        let info = Self::parse_json(&out.stdout)?;
        info!(
            id = %info.id,
            formats = info.formats.len(),
            "[CliExtractor] extracted \"{}\"",
            info.title
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let json = br#"{
            "id": "abc123",
            "title": "Test clip",
            "uploader": "someone",
            "duration": 12.5,
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 200000},
                {"format_id": "137", "ext": "mp4", "width": 1920, "height": 1080, "vcodec": "avc1.640028", "acodec": "none", "vbr": 4400.1, "tbr": 4400.1, "filesize_approx": 9000000.0},
                {"format_id": "18", "ext": "mp4", "width": 640, "height": 360, "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "tbr": 500}
            ]
        }"#;

        let info = CliInfoExtractor::parse_json(json).unwrap();
        assert_eq!(info.id, "abc123");
        assert_eq!(info.title, "Test clip");
        assert_eq!(info.formats.len(), 3);
        assert!(info.formats[0].is_audio_only());
        assert!(info.formats[1].is_video_only());
        assert_eq!(info.formats[1].effective_size(), Some(9_000_000));
        assert!(info.formats[2].is_progressive());
    }

    #[test]
    fn test_direct_link_becomes_single_format() {
        let json = br#"{"id": "clip", "title": "clip", "format_id": "mp4", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 720}"#;
        let info = CliInfoExtractor::parse_json(json).unwrap();
        assert_eq!(info.formats.len(), 1);
        assert_eq!(info.formats[0].height, Some(720));
    }

    #[test]
    fn test_garbage_is_malformed_output() {
        let err = CliInfoExtractor::parse_json(b"<html>").unwrap_err();
        match err {
            DownloadError::Extraction(e) => assert_eq!(e.reason, FailureReason::MalformedOutput),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_build_args_end_with_url() {
        let config = ExtractorConfig {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..ExtractorConfig::default()
        };
        let extractor = CliInfoExtractor::new(PathBuf::from("yt-dlp"), config);
        let args = extractor.build_args("https://example.com/v");

        assert_eq!(args.last().map(String::as_str), Some("https://example.com/v"));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "socks5://127.0.0.1:1080"));
        assert!(args.contains(&"--no-playlist".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_dependency_error() {
        let extractor = CliInfoExtractor::new(
            PathBuf::from("/nonexistent/dir/yt-dlp"),
            ExtractorConfig::default(),
        );
        let err = extractor.extract("https://example.com/v").await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::DependencyMissing { tool: ToolType::YtDlp, .. }
        ));
    }
}
