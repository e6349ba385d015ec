// Download driver - runs one job to completion
//
// Single formats are one fetch. Merged pairs fetch video, then audio, each
// under a per-format name, then hand both to the muxer. The merged file is
// named after the video stream with the `.f<id>` marker removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::models::{
    DownloadJob, DownloadOutcome, FetchedStream, FormatDescriptor, Stage, StreamProgress,
    StreamSelection,
};
use super::progress::{JobProgress, ProgressRelay};
use super::traits::{DownloaderBackend, Muxer};
use crate::config::AppConfig;
use crate::ytdlp::STREAM_TEMPLATE;

pub struct DownloadDriver {
    backend: Arc<dyn DownloaderBackend>,
    muxer: Arc<dyn Muxer>,
    output_template: String,
    merge_format: String,
    keep_streams: bool,
}

impl DownloadDriver {
    pub fn new(
        backend: Arc<dyn DownloaderBackend>,
        muxer: Arc<dyn Muxer>,
        config: &AppConfig,
    ) -> Self {
        Self {
            backend,
            muxer,
            output_template: config.output_template.clone(),
            merge_format: config.merge_format.clone(),
            keep_streams: config.keep_streams,
        }
    }

    /// Run `job` for the already validated `descriptor`.
    pub async fn run(
        &self,
        job: &DownloadJob,
        descriptor: &FormatDescriptor,
        relay: &mut ProgressRelay,
    ) -> Result<DownloadOutcome, DownloadError> {
        tokio::fs::create_dir_all(&job.dest_dir)
            .await
            .map_err(|e| DownloadError::io(&job.dest_dir, e))?;

        info!(
            backend = self.backend.name(),
            format = %descriptor.id,
            "[Driver] starting \"{}\"",
            descriptor.label
        );

        match &descriptor.selection {
            StreamSelection::Single { format_id } => {
                let mut job_progress = JobProgress::new(vec![descriptor.estimated_size]);
                let fetched = self
                    .fetch(job, format_id, &self.output_template, &mut job_progress, relay)
                    .await?;
                Ok(DownloadOutcome {
                    output: fetched.path,
                    kept_streams: Vec::new(),
                    bytes: fetched.bytes,
                })
            }
            StreamSelection::Merge { video_id, audio_id } => {
                self.run_merge(job, video_id, audio_id, relay).await
            }
        }
    }

    async fn run_merge(
        &self,
        job: &DownloadJob,
        video_id: &str,
        audio_id: &str,
        relay: &mut ProgressRelay,
    ) -> Result<DownloadOutcome, DownloadError> {
        // Per-stream sizes are not known separately, so streams are weighted equally
        let mut job_progress = JobProgress::new(vec![None, None]);

        let video = self
            .fetch(job, video_id, STREAM_TEMPLATE, &mut job_progress, relay)
            .await?;
        job_progress.stream_done(video.bytes);

        let audio = match self
            .fetch(job, audio_id, STREAM_TEMPLATE, &mut job_progress, relay)
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                debug!("[Driver] audio failed, video stream stays for a retry: {}", video.path.display());
                return Err(e);
            }
        };
        job_progress.stream_done(audio.bytes);

        relay.stage(Stage::Merging).await;
        let output = merged_output_path(&video.path, video_id, &self.merge_format);
        let streams = vec![video.path.clone(), audio.path.clone()];

        if let Err(e) = self.muxer.mux(&video.path, &audio.path, &output).await {
            warn!(muxer = self.muxer.name(), "[Driver] merge failed: {}", e);
            return Err(e.with_kept(streams));
        }

        let bytes = tokio::fs::metadata(&output)
            .await
            .map_err(|e| DownloadError::io(&output, e))?
            .len();

        let kept_streams = if self.keep_streams {
            streams
        } else {
            for path in &streams {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!("[Driver] could not remove {}: {}", path.display(), e);
                }
            }
            Vec::new()
        };

        info!(bytes, "[Driver] merged into {}", output.display());
        Ok(DownloadOutcome {
            output,
            kept_streams,
            bytes: bytes.max(job_progress.total_downloaded()),
        })
    }

    async fn fetch(
        &self,
        job: &DownloadJob,
        format_id: &str,
        template: &str,
        job_progress: &mut JobProgress,
        relay: &mut ProgressRelay,
    ) -> Result<FetchedStream, DownloadError> {
        relay
            .stage(Stage::Downloading {
                stream: job_progress.stream_index() + 1,
                of: job_progress.stream_count(),
            })
            .await;

        let tracker: &JobProgress = job_progress;
        let mut report = |p: StreamProgress| relay.offer(tracker.sample(p));
        self.backend
            .fetch_stream(&job.url, format_id, &job.dest_dir, template, &mut report)
            .await
    }
}

/// `Clip.f137.mp4` + `mp4` -> `Clip.mp4`, never the video path itself.
fn merged_output_path(video: &Path, video_id: &str, container: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    let marker = format!(".f{}", video_id);
    let base = stem.strip_suffix(marker.as_str()).unwrap_or(&stem);

    let candidate = video.with_file_name(format!("{}.{}", base, container));
    if candidate == video {
        video.with_file_name(format!("{}.merged.{}", base, container))
    } else {
        candidate
    }
}
