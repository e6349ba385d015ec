//! Worker -> owner hand-off.
//!
//! The worker task owns a [`ProgressRelay`]; the session owns the receiving end.
//! Intermediate samples are offered with `try_send` and dropped when the channel
//! is full, so a slow consumer never stalls the download. Stage changes and the
//! final result are sent with `send().await` and are never dropped.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::errors::DownloadError;
use super::models::{DownloadOutcome, ProgressSample, Resolution, Stage, StreamProgress};

/// Highest percentage reported before the job has actually finished
const MAX_INTERMEDIATE_PERCENT: f64 = 99.9;

#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Progress(ProgressSample),
    Stage(Stage),
    Resolved(Result<Resolution, DownloadError>),
    Finished(Result<DownloadOutcome, DownloadError>),
}

/// A message tagged with the job it belongs to
#[derive(Debug, Clone)]
pub struct Envelope {
    pub ticket: u64,
    pub message: WorkerMessage,
}

pub fn channel(capacity: usize) -> (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>) {
    mpsc::channel(capacity.max(1))
}

pub struct ProgressRelay {
    ticket: u64,
    tx: mpsc::Sender<Envelope>,
    last_bytes: u64,
    last_percent: f64,
    coalesced: u64,
}

impl ProgressRelay {
    pub fn new(ticket: u64, tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            ticket,
            tx,
            last_bytes: 0,
            last_percent: 0.0,
            coalesced: 0,
        }
    }

    /// Clamp so relayed bytes and percent never go backwards.
    fn monotonic(&mut self, sample: ProgressSample) -> ProgressSample {
        self.last_bytes = self.last_bytes.max(sample.downloaded_bytes);
        let percent = sample.percent.map(|p| {
            self.last_percent = self.last_percent.max(p.min(MAX_INTERMEDIATE_PERCENT));
            self.last_percent
        });
        ProgressSample {
            downloaded_bytes: self.last_bytes,
            total_bytes: sample.total_bytes.map(|t| t.max(self.last_bytes)),
            percent,
        }
    }

    /// Non-blocking; the sample is dropped if the owner is behind.
    pub fn offer(&mut self, sample: ProgressSample) {
        let sample = self.monotonic(sample);
        let envelope = Envelope {
            ticket: self.ticket,
            message: WorkerMessage::Progress(sample),
        };
        if self.tx.try_send(envelope).is_err() {
            self.coalesced += 1;
            trace!(ticket = self.ticket, "[relay] coalesced progress sample");
        }
    }

    pub async fn stage(&mut self, stage: Stage) {
        self.deliver(WorkerMessage::Stage(stage)).await;
    }

    pub async fn resolved(self, result: Result<Resolution, DownloadError>) {
        self.deliver(WorkerMessage::Resolved(result)).await;
    }

    /// Terminal delivery. A success is preceded by a 100% sample.
    pub async fn finish(mut self, result: Result<DownloadOutcome, DownloadError>) {
        if let Ok(outcome) = &result {
            let bytes = self.last_bytes.max(outcome.bytes);
            self.last_bytes = bytes;
            self.deliver(WorkerMessage::Progress(ProgressSample {
                downloaded_bytes: bytes,
                total_bytes: Some(bytes),
                percent: Some(100.0),
            }))
            .await;
        }
        if self.coalesced > 0 {
            debug!(ticket = self.ticket, dropped = self.coalesced, "[relay] samples coalesced");
        }
        self.deliver(WorkerMessage::Finished(result)).await;
    }

    async fn deliver(&self, message: WorkerMessage) {
        let envelope = Envelope {
            ticket: self.ticket,
            message,
        };
        // Only fails when the session is gone, in which case nobody is listening
        if self.tx.send(envelope).await.is_err() {
            debug!(ticket = self.ticket, "[relay] receiver dropped");
        }
    }
}

/// Folds per-stream progress into job-level samples.
pub struct JobProgress {
    streams: usize,
    index: usize,
    finished_bytes: u64,
    /// Size estimates for streams not yet started
    pending_estimates: Vec<Option<u64>>,
}

impl JobProgress {
    pub fn new(estimates: Vec<Option<u64>>) -> Self {
        let streams = estimates.len().max(1);
        let pending_estimates = estimates.into_iter().skip(1).collect();
        Self {
            streams,
            index: 0,
            finished_bytes: 0,
            pending_estimates,
        }
    }

    pub fn stream_index(&self) -> usize {
        self.index
    }

    pub fn stream_count(&self) -> usize {
        self.streams
    }

    pub fn sample(&self, current: StreamProgress) -> ProgressSample {
        let downloaded_bytes = self.finished_bytes + current.downloaded;

        let remaining: Option<u64> = self.pending_estimates.iter().copied().sum();
        let total_bytes = current
            .total
            .zip(remaining)
            .map(|(cur, rest)| self.finished_bytes + cur + rest);

        let percent = match (total_bytes, current.total) {
            (Some(total), _) if total > 0 => Some(downloaded_bytes as f64 * 100.0 / total as f64),
            (_, Some(cur_total)) if cur_total > 0 => {
                let fraction = (current.downloaded as f64 / cur_total as f64).min(1.0);
                Some((self.index as f64 + fraction) / self.streams as f64 * 100.0)
            }
            _ => None,
        };

        ProgressSample {
            downloaded_bytes,
            total_bytes,
            percent: percent.map(|p| p.min(100.0)),
        }
    }

    /// Current stream is complete with `bytes` on disk.
    pub fn stream_done(&mut self, bytes: u64) {
        self.finished_bytes += bytes;
        if self.index + 1 < self.streams {
            self.index += 1;
            if !self.pending_estimates.is_empty() {
                self.pending_estimates.remove(0);
            }
        }
    }

    pub fn total_downloaded(&self) -> u64 {
        self.finished_bytes
    }
}
