// Helper functions shared by extractors and backends

use std::io;
use std::path::Path;
use std::process::{Output, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};
use tracing::warn;

use super::errors::{DownloadError, ExtractionError};
use super::extractors::FailureReason;
use super::tools::ToolType;

/// Map a spawn failure: a missing binary is a dependency problem, anything else is I/O.
pub fn spawn_error(tool: ToolType, program: &Path, err: io::Error) -> DownloadError {
    if err.kind() == io::ErrorKind::NotFound {
        DownloadError::missing(tool)
    } else {
        DownloadError::io(program, err)
    }
}

/// Run command with timeout, collecting stdout and stderr
pub async fn run_output_with_timeout(
    tool: ToolType,
    program: &Path,
    args: &[String],
    timeout_secs: u64,
) -> Result<Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(tool, program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::io(program, io::Error::other("stdout not captured")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::io(program, io::Error::other("stderr not captured")))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status) => {
            let status = status.map_err(|e| DownloadError::io(program, e))?;
            let stdout = join_pipe(stdout_task, program).await?;
            let stderr = join_pipe(stderr_task, program).await?;
            Ok(Output { status, stdout, stderr })
        }
        Err(_) => {
            warn!(program = %program.display(), timeout_secs, "[process] timed out, killing");
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(ExtractionError::new(
                FailureReason::Timeout,
                format!("Timed out after {}s", timeout_secs),
            )
            .into())
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<io::Result<Vec<u8>>>,
    program: &Path,
) -> Result<Vec<u8>, DownloadError> {
    match task.await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(e)) => Err(DownloadError::io(program, e)),
        Err(e) => Err(DownloadError::io(program, io::Error::other(e))),
    }
}

/// Format file size for display
pub fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1_048_576.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if mb >= 1.0 {
        format!("{:.0} MB", mb)
    } else {
        format!("{:.0} KB", bytes as f64 / 1024.0)
    }
}

/// Parse a yt-dlp size like `343.72MiB` or `1.2 GB` into bytes.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" | "kB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };

    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(150 * 1_048_576), "150 MB");
        assert_eq!(format_size(3 * 1_073_741_824 / 2), "1.5 GB");
        assert_eq!(format_size(2048), "2 KB");
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1.00KiB"), Some(1024));
        assert_eq!(parse_size("2MiB"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size(" 1.5 GB "), Some(1_500_000_000));
        assert_eq!(parse_size("12"), Some(12));
        assert_eq!(parse_size("3 parsecs"), None);
        assert_eq!(parse_size("MiB"), None);
    }

    #[test]
    fn test_spawn_error_mapping() {
        let missing = spawn_error(
            ToolType::Ffmpeg,
            Path::new("ffmpeg"),
            io::Error::new(io::ErrorKind::NotFound, "nope"),
        );
        assert!(matches!(
            missing,
            DownloadError::DependencyMissing { tool: ToolType::Ffmpeg, .. }
        ));

        let denied = spawn_error(
            ToolType::Ffmpeg,
            Path::new("ffmpeg"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(denied, DownloadError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out_and_kills_child() {
        let started = std::time::Instant::now();
        let result = run_output_with_timeout(
            ToolType::YtDlp,
            Path::new("sleep"),
            &["5".to_string()],
            1,
        )
        .await;

        assert!(matches!(
            result,
            Err(DownloadError::Extraction(ExtractionError { reason: FailureReason::Timeout, .. }))
        ));
        // returned at the limit, not when sleep would have exited
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_dependency_error() {
        let result = run_output_with_timeout(
            ToolType::YtDlp,
            Path::new("/nonexistent/dir/yt-dlp"),
            &["--version".to_string()],
            5,
        )
        .await;
        assert!(matches!(
            result,
            Err(DownloadError::DependencyMissing { tool: ToolType::YtDlp, .. })
        ));
    }
}
