// ffmpeg muxer - stream copy of one video and one audio input
//
// Output goes to `<output>.part` first and is renamed on success, so a
// file at the final path is always complete.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::tools::ToolType;
use crate::downloader::traits::Muxer;
use crate::downloader::utils::spawn_error;

pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    /// Container extension, e.g. `mp4` or `mkv`
    container: String,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: PathBuf, container: impl Into<String>) -> Self {
        Self {
            ffmpeg_path,
            container: container.into(),
        }
    }

    /// ffmpeg's muxer name for our container extension
    fn muxer_name(&self) -> &str {
        match self.container.as_str() {
            "mkv" => "matroska",
            "m4a" => "ipod",
            other => other,
        }
    }

    fn build_args(&self, video: &Path, audio: &Path, partial: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            self.muxer_name().to_string(),
            partial.to_string_lossy().to_string(),
        ]
    }
}

pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("[ffmpeg] could not remove {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), DownloadError> {
        let partial = partial_path(output);
        let args = self.build_args(video, audio, &partial);
        debug!("[ffmpeg] {} {}", self.ffmpeg_path.display(), args.join(" "));

        let result = TokioCommand::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => return Err(spawn_error(ToolType::Ffmpeg, &self.ffmpeg_path, e)),
        };

        if !out.status.success() {
            discard(&partial).await;
            let stderr = String::from_utf8_lossy(&out.stderr);
            let reason = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("ffmpeg exited with {}", out.status));
            warn!(status = ?out.status.code(), "[ffmpeg] mux failed: {}", reason);
            return Err(DownloadError::Mux {
                reason,
                kept: Vec::new(),
            });
        }

        if let Err(e) = tokio::fs::rename(&partial, output).await {
            discard(&partial).await;
            return Err(DownloadError::io(output, e));
        }

        info!("[ffmpeg] merged into {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/Clip.mp4")),
            PathBuf::from("/tmp/Clip.mp4.part")
        );
    }

    #[test]
    fn test_args_copy_streams_into_partial() {
        let muxer = FfmpegMuxer::new(PathBuf::from("ffmpeg"), "mkv");
        let args = muxer.build_args(
            Path::new("a.f137.mp4"),
            Path::new("a.f140.m4a"),
            Path::new("a.mkv.part"),
        );
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "matroska"));
        assert_eq!(args.last().map(String::as_str), Some("a.mkv.part"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = FfmpegMuxer::new(PathBuf::from("/nonexistent/dir/ffmpeg"), "mp4");
        let err = muxer
            .mux(
                &dir.path().join("v.mp4"),
                &dir.path().join("a.m4a"),
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::DependencyMissing { tool: ToolType::Ffmpeg, .. }
        ));
        assert!(!dir.path().join("out.mp4").exists());
    }
}
