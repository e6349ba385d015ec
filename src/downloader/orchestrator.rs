// Session orchestrator - owns the state machine and the single worker
//
// Idle -> Resolving -> Ready -> Downloading -> Done | Failed
//
// Every job gets a fresh ticket. Messages carrying an older ticket come from a
// cancelled or superseded worker and are dropped unread.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use super::driver::DownloadDriver;
use super::errors::{DownloadError, ExtractionError};
use super::extractors::FailureReason;
use super::models::{DownloadJob, DownloadOutcome, ProgressSample, Resolution, Selection, Stage};
use super::progress::{self, Envelope, ProgressRelay, WorkerMessage};
use super::resolver::FormatResolver;
use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Resolving {
        url: String,
    },
    Ready(Resolution),
    Downloading {
        resolution: Resolution,
        job: DownloadJob,
    },
    Done {
        resolution: Resolution,
        outcome: DownloadOutcome,
    },
    Failed {
        resolution: Resolution,
        error: DownloadError,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving { .. } => "resolving",
            Self::Ready(_) => "ready",
            Self::Downloading { .. } => "downloading",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    /// The resolution this state carries, if any
    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            Self::Ready(resolution)
            | Self::Downloading { resolution, .. }
            | Self::Done { resolution, .. }
            | Self::Failed { resolution, .. } => Some(resolution),
            Self::Idle | Self::Resolving { .. } => None,
        }
    }
}

/// What the presentation layer needs to redraw
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Resolved(Resolution),
    ResolveFailed(DownloadError),
    Stage(Stage),
    Progress(ProgressSample),
    Completed(DownloadOutcome),
    DownloadFailed(DownloadError),
}

enum Polled {
    Message(Option<Envelope>),
    WorkerExited(Result<(), JoinError>),
}

pub struct Session {
    resolver: Arc<FormatResolver>,
    driver: Arc<DownloadDriver>,
    state: SessionState,
    selection: Selection,
    default_output_dir: PathBuf,
    resolve_timeout: Duration,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    ticket: u64,
    last_resolution_id: u64,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(resolver: FormatResolver, driver: DownloadDriver, config: &AppConfig) -> Self {
        let (tx, rx) = progress::channel(config.relay_capacity);
        Self {
            resolver: Arc::new(resolver),
            driver: Arc::new(driver),
            state: SessionState::Idle,
            selection: Selection::default(),
            default_output_dir: config.output_dir.clone(),
            resolve_timeout: Duration::from_secs(config.resolve_timeout_secs.max(1)),
            tx,
            rx,
            ticket: 0,
            last_resolution_id: 0,
            worker: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.state.resolution()
    }

    /// A worker is running
    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            SessionState::Resolving { .. } | SessionState::Downloading { .. }
        )
    }

    fn ensure_idle(&self) -> Result<(), DownloadError> {
        if self.is_busy() {
            debug!(state = self.state.name(), "[Session] refused, busy");
            return Err(DownloadError::Busy);
        }
        Ok(())
    }

    fn next_ticket(&mut self) -> u64 {
        self.ticket += 1;
        // anything still queued belongs to an older ticket
        while self.rx.try_recv().is_ok() {}
        self.ticket
    }

    /// Start resolving `url` on the worker. The previous resolution is discarded.
    pub fn submit_url(&mut self, url: &str) -> Result<(), DownloadError> {
        self.ensure_idle()?;
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(ExtractionError::new(FailureReason::InvalidUrl, "URL is empty").into());
        }

        let ticket = self.next_ticket();
        self.last_resolution_id += 1;
        let resolution_id = self.last_resolution_id;
        self.selection.format_id = None;

        let resolver = Arc::clone(&self.resolver);
        let relay = ProgressRelay::new(ticket, self.tx.clone());
        let limit = self.resolve_timeout;
        let target = url.clone();

        self.worker = Some(tokio::spawn(async move {
            let lookup = resolver.resolve(&target, resolution_id);
            let result = match tokio::time::timeout(limit, lookup).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::new(
                    FailureReason::Timeout,
                    format!("Resolution timed out after {}s", limit.as_secs()),
                )
                .into()),
            };
            relay.resolved(result).await;
        }));

        info!(ticket, "[Session] resolving {}", url);
        self.state = SessionState::Resolving { url };
        Ok(())
    }

    /// Pick a descriptor from the current resolution.
    pub fn select_format(&mut self, format_id: &str) -> Result<(), DownloadError> {
        self.ensure_idle()?;
        let resolution = self.state.resolution().ok_or(DownloadError::NothingSelected)?;
        if resolution.find(format_id).is_none() {
            return Err(DownloadError::StaleSelection(format!(
                "format {} is not part of the current resolution",
                format_id
            )));
        }
        self.selection.format_id = Some(format_id.to_string());
        Ok(())
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) -> Result<(), DownloadError> {
        self.ensure_idle()?;
        self.selection.output_dir = Some(dir.into());
        Ok(())
    }

    /// Build a job from the current selection and start it.
    pub fn start_download(&mut self) -> Result<DownloadJob, DownloadError> {
        self.ensure_idle()?;
        let resolution = self.state.resolution().ok_or(DownloadError::NothingSelected)?;
        let format_id = self
            .selection
            .format_id
            .clone()
            .ok_or(DownloadError::NothingSelected)?;

        let job = DownloadJob {
            resolution_id: resolution.id,
            url: resolution.url.clone(),
            format_id,
            dest_dir: self
                .selection
                .output_dir
                .clone()
                .unwrap_or_else(|| self.default_output_dir.clone()),
        };
        self.start_job(job.clone())?;
        Ok(job)
    }

    /// Start `job`, provided it was picked from the latest resolution of its URL.
    ///
    /// Checked before anything is spawned, so a stale job never reaches yt-dlp.
    pub fn start_job(&mut self, job: DownloadJob) -> Result<(), DownloadError> {
        self.ensure_idle()?;
        let resolution = self
            .state
            .resolution()
            .ok_or_else(|| DownloadError::StaleSelection("nothing has been resolved".to_string()))?;

        if job.resolution_id != resolution.id {
            return Err(DownloadError::StaleSelection(format!(
                "job was picked from resolution #{}, current is #{}",
                job.resolution_id, resolution.id
            )));
        }
        if job.url != resolution.url {
            return Err(DownloadError::StaleSelection(format!(
                "job is for {}, current resolution is for {}",
                job.url, resolution.url
            )));
        }
        let descriptor = resolution.find(&job.format_id).cloned().ok_or_else(|| {
            DownloadError::StaleSelection(format!(
                "format {} is not part of the current resolution",
                job.format_id
            ))
        })?;
        let resolution = resolution.clone();

        let ticket = self.next_ticket();
        let driver = Arc::clone(&self.driver);
        let mut relay = ProgressRelay::new(ticket, self.tx.clone());
        let worker_job = job.clone();

        self.worker = Some(tokio::spawn(async move {
            let result = driver.run(&worker_job, &descriptor, &mut relay).await;
            relay.finish(result).await;
        }));

        info!(
            ticket,
            format = %job.format_id,
            "[Session] downloading into {}",
            job.dest_dir.display()
        );
        self.selection.format_id = Some(job.format_id.clone());
        self.state = SessionState::Downloading { resolution, job };
        Ok(())
    }

    /// Stop the running worker. Returns false when nothing was running.
    ///
    /// Aborting drops the child process handles, which kills them; yt-dlp
    /// leaves its partial data as `.part` files. Returns only after the
    /// aborted worker is gone, so no new job can overlap it.
    pub async fn cancel(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    error!("[Session] worker ended abnormally: {}", e);
                }
            }
        }
        self.next_ticket();

        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        self.state = match previous {
            SessionState::Downloading { resolution, .. } => SessionState::Ready(resolution),
            _ => SessionState::Idle,
        };
        info!(state = self.state.name(), "[Session] cancelled");
        true
    }

    /// Wait for the next event of the running job. `None` once nothing is running.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if !self.is_busy() {
                return None;
            }

            let polled = match self.worker.as_mut() {
                Some(handle) => {
                    tokio::select! {
                        biased;
                        envelope = self.rx.recv() => Polled::Message(envelope),
                        joined = handle => Polled::WorkerExited(joined),
                    }
                }
                None => Polled::Message(self.rx.try_recv().ok()),
            };

            match polled {
                Polled::Message(Some(envelope)) => {
                    if let Some(event) = self.apply(envelope) {
                        return Some(event);
                    }
                }
                Polled::Message(None) => return Some(self.worker_lost()),
                Polled::WorkerExited(joined) => {
                    self.worker = None;
                    if let Err(e) = joined {
                        error!("[Session] worker ended abnormally: {}", e);
                    }
                    // its last messages may still be queued; the next pass drains them
                }
            }
        }
    }

    fn apply(&mut self, envelope: Envelope) -> Option<SessionEvent> {
        if envelope.ticket != self.ticket {
            trace!(ticket = envelope.ticket, current = self.ticket, "[Session] stale message dropped");
            return None;
        }

        match envelope.message {
            WorkerMessage::Progress(sample) => Some(SessionEvent::Progress(sample)),
            WorkerMessage::Stage(stage) => Some(SessionEvent::Stage(stage)),
            WorkerMessage::Resolved(result) => {
                if !matches!(self.state, SessionState::Resolving { .. }) {
                    warn!(state = self.state.name(), "[Session] unexpected resolution result");
                    return None;
                }
                self.worker = None;
                match result {
                    Ok(resolution) => {
                        info!(
                            id = resolution.id,
                            options = resolution.formats.len(),
                            "[Session] ready"
                        );
                        self.state = SessionState::Ready(resolution.clone());
                        Some(SessionEvent::Resolved(resolution))
                    }
                    Err(e) => {
                        warn!("[Session] resolution failed: {}", e);
                        self.state = SessionState::Idle;
                        Some(SessionEvent::ResolveFailed(e))
                    }
                }
            }
            WorkerMessage::Finished(result) => {
                let previous = std::mem::replace(&mut self.state, SessionState::Idle);
                let SessionState::Downloading { resolution, .. } = previous else {
                    warn!(state = previous.name(), "[Session] unexpected download result");
                    self.state = previous;
                    return None;
                };
                self.worker = None;
                match result {
                    Ok(outcome) => {
                        info!(bytes = outcome.bytes, "[Session] done: {}", outcome.output.display());
                        self.state = SessionState::Done {
                            resolution,
                            outcome: outcome.clone(),
                        };
                        Some(SessionEvent::Completed(outcome))
                    }
                    Err(e) => {
                        warn!("[Session] download failed: {}", e);
                        self.state = SessionState::Failed {
                            resolution,
                            error: e.clone(),
                        };
                        Some(SessionEvent::DownloadFailed(e))
                    }
                }
            }
        }
    }

    /// The worker is gone without reporting; settle the state as a failure.
    fn worker_lost(&mut self) -> SessionEvent {
        let error = DownloadError::io(
            "worker",
            io::Error::other("worker task ended without reporting a result"),
        );
        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        match previous {
            SessionState::Downloading { resolution, .. } => {
                self.state = SessionState::Failed {
                    resolution,
                    error: error.clone(),
                };
                SessionEvent::DownloadFailed(error)
            }
            _ => SessionEvent::ResolveFailed(error),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
