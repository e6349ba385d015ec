// yt-dlp backend - fetches one format with live progress
//
// stdout and stderr are read on the same task so the progress callback
// never has to cross a thread. Both pipes are scanned for progress and
// file markers; stderr is also kept for failure classification.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::downloader::errors::{DownloadError, ExtractionError};
use crate::downloader::extractors::FailureReason;
use crate::downloader::models::{FetchedStream, StreamProgress};
use crate::downloader::tools::ToolType;
use crate::downloader::traits::DownloaderBackend;
use crate::downloader::utils::spawn_error;
use crate::ytdlp::{download_args, parse_line, OutputLine};

/// Lines of stderr kept for error classification
const STDERR_TAIL: usize = 200;

pub struct YtDlpBackend {
    ytdlp_path: PathBuf,
    config: AppConfig,
}

impl YtDlpBackend {
    pub fn new(ytdlp_path: PathBuf, config: AppConfig) -> Self {
        Self { ytdlp_path, config }
    }
}

/// yt-dlp's wording for failures writing to the local disk.
///
/// These come from the destination, not the site, so they are reported as I/O.
fn local_write_failure(stderr: &str) -> Option<io::Error> {
    stderr.lines().map(str::trim).find_map(|line| {
        let kind = if line.contains("[Errno 28]") || line.contains("No space left on device") {
            io::ErrorKind::StorageFull
        } else if line.contains("[Errno 13]")
            || line.contains("[Errno 30]")
            || line.contains("Permission denied")
            || line.contains("Read-only file system")
            || line.contains("unable to open for writing")
        {
            io::ErrorKind::PermissionDenied
        } else {
            return None;
        };
        Some(io::Error::new(kind, line.to_string()))
    })
}

/// What we learned from the output so far
#[derive(Default)]
struct OutputState {
    file: Option<PathBuf>,
    destination: Option<PathBuf>,
    stderr: Vec<String>,
}

impl OutputState {
    fn observe(&mut self, line: &str, progress: &mut (dyn FnMut(StreamProgress) + Send)) {
        match parse_line(line) {
            OutputLine::Progress(p) => progress(p),
            OutputLine::File(path) => self.file = Some(path),
            OutputLine::Destination(path) | OutputLine::AlreadyDownloaded(path) => {
                debug!("[yt-dlp] destination {}", path.display());
                self.destination = Some(path);
            }
            OutputLine::Other => {}
        }
    }

    fn keep_stderr(&mut self, line: String) {
        if self.stderr.len() == STDERR_TAIL {
            self.stderr.remove(0);
        }
        self.stderr.push(line);
    }

    /// The final file, relative paths taken against `dest_dir`
    fn output_path(&self, dest_dir: &Path) -> Option<PathBuf> {
        let path = self.file.as_ref().or(self.destination.as_ref())?;
        if path.is_absolute() {
            Some(path.clone())
        } else if path.starts_with(dest_dir) {
            Some(path.clone())
        } else {
            Some(dest_dir.join(path))
        }
    }
}

#[async_trait]
impl DownloaderBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_stream(
        &self,
        url: &str,
        format_id: &str,
        dest_dir: &Path,
        template: &str,
        progress: &mut (dyn FnMut(StreamProgress) + Send),
    ) -> Result<FetchedStream, DownloadError> {
        let args = download_args(url, format_id, dest_dir, template, &self.config);
        info!(format_id, "[yt-dlp] fetching into {}", dest_dir.display());
        debug!("[yt-dlp] {} {}", self.ytdlp_path.display(), args.join(" "));

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // cancelling the job drops this future, which must take yt-dlp down with it
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(ToolType::YtDlp, &self.ytdlp_path, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DownloadError::io(&self.ytdlp_path, std::io::Error::other("stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            DownloadError::io(&self.ytdlp_path, std::io::Error::other("stderr not captured"))
        })?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut state = OutputState::default();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                line = out_lines.next_line(), if out_open => match line {
                    Ok(Some(line)) => state.observe(&line, progress),
                    Ok(None) => out_open = false,
                    Err(e) => {
                        warn!("[yt-dlp] stdout read failed: {}", e);
                        out_open = false;
                    }
                },
                line = err_lines.next_line(), if err_open => match line {
                    Ok(Some(line)) => {
                        state.observe(&line, progress);
                        state.keep_stderr(line);
                    }
                    Ok(None) => err_open = false,
                    Err(e) => {
                        warn!("[yt-dlp] stderr read failed: {}", e);
                        err_open = false;
                    }
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::io(&self.ytdlp_path, e))?;

        if !status.success() {
            let stderr = state.stderr.join("\n");
            warn!(status = ?status.code(), format_id, "[yt-dlp] download failed");
            if let Some(err) = local_write_failure(&stderr) {
                return Err(DownloadError::io(dest_dir, err));
            }
            return Err(ExtractionError::from_stderr(&stderr).into());
        }

        let path = state.output_path(dest_dir).ok_or_else(|| {
            ExtractionError::new(
                FailureReason::MalformedOutput,
                "yt-dlp finished without reporting an output file",
            )
        })?;

        let bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| DownloadError::io(&path, e))?
            .len();

        info!(format_id, bytes, "[yt-dlp] saved {}", path.display());
        Ok(FetchedStream { path, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_marker_wins_over_destination() {
        let mut state = OutputState::default();
        let mut seen = Vec::new();
        let mut record = |p: StreamProgress| seen.push(p.downloaded);

        state.observe("[download] Destination: Videos/clip.f137.mp4", &mut record);
        state.observe("[vdl:progress] 10 20 NA", &mut record);
        state.observe("[vdl:file] /abs/Videos/clip.mp4", &mut record);

        assert_eq!(seen, vec![10]);
        assert_eq!(
            state.output_path(Path::new("Videos")),
            Some(PathBuf::from("/abs/Videos/clip.mp4"))
        );
    }

    #[test]
    fn test_relative_destination_joined_to_dir() {
        let mut state = OutputState::default();
        state.observe("[download] clip.mp4 has already been downloaded", &mut |_: StreamProgress| {});
        assert_eq!(
            state.output_path(Path::new("/tmp/out")),
            Some(PathBuf::from("/tmp/out/clip.mp4"))
        );
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut state = OutputState::default();
        for i in 0..(STDERR_TAIL + 5) {
            state.keep_stderr(format!("line {}", i));
        }
        assert_eq!(state.stderr.len(), STDERR_TAIL);
        assert_eq!(state.stderr[0], "line 5");
    }

    #[test]
    fn test_local_write_failures_classified() {
        let full = local_write_failure(
            "[download] Destination: Videos/Clip.f137.mp4\nERROR: unable to open for writing: [Errno 28] No space left on device: 'Videos/Clip.f137.mp4.part'",
        )
        .unwrap();
        assert_eq!(full.kind(), io::ErrorKind::StorageFull);
        assert!(full.to_string().starts_with("ERROR: unable to open for writing"));

        let denied = local_write_failure("ERROR: unable to open for writing: [Errno 13] Permission denied: 'x.part'").unwrap();
        assert_eq!(denied.kind(), io::ErrorKind::PermissionDenied);

        let read_only = local_write_failure("ERROR: [Errno 30] Read-only file system: '/mnt/x.part'").unwrap();
        assert_eq!(read_only.kind(), io::ErrorKind::PermissionDenied);

        assert!(local_write_failure("ERROR: [youtube] abc: Video unavailable").is_none());
        assert!(local_write_failure("ERROR: unable to download video data: HTTP Error 403: Forbidden").is_none());
    }

    /// Write an executable shell script standing in for yt-dlp
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_disk_full_is_io_error() {
        let bin = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(
            bin.path(),
            "echo \"ERROR: unable to open for writing: [Errno 28] No space left on device: 'Videos/Clip.f137.mp4.part'\" >&2\nexit 1",
        );

        let backend = YtDlpBackend::new(ytdlp, AppConfig::default());
        let err = backend
            .fetch_stream("https://example.com/v", "137", dest.path(), "%(title)s.%(ext)s", &mut |_: StreamProgress| {})
            .await
            .unwrap_err();

        match err {
            DownloadError::Io { path, source } => {
                assert_eq!(path, dest.path());
                assert_eq!(source.kind(), io::ErrorKind::StorageFull);
            }
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_site_failure_stays_extraction_error() {
        let bin = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let ytdlp = fake_ytdlp(
            bin.path(),
            "echo 'ERROR: [generic] Unsupported URL: https://example.com/v' >&2\nexit 1",
        );

        let backend = YtDlpBackend::new(ytdlp, AppConfig::default());
        let err = backend
            .fetch_stream("https://example.com/v", "18", dest.path(), "%(title)s.%(ext)s", &mut |_: StreamProgress| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Extraction(ExtractionError { reason: FailureReason::UnsupportedSite, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_dependency_error() {
        let backend = YtDlpBackend::new(
            PathBuf::from("/nonexistent/dir/yt-dlp"),
            AppConfig::default(),
        );
        let dir = tempfile::tempdir().unwrap();
        let err = backend
            .fetch_stream("https://example.com/v", "18", dir.path(), "%(title)s.%(ext)s", &mut |_: StreamProgress| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::DependencyMissing { tool: ToolType::YtDlp, .. }
        ));
    }
}
