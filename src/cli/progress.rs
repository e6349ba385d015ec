//! Terminal progress display for one download job.

use indicatif::{ProgressBar, ProgressStyle};
use video_downloader_lib::{ProgressSample, Stage};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} ETA: {eta} {msg}";
const PERCENT_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent}% ETA: {eta} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} {bytes_per_sec} {msg}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn percent_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(PERCENT_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn stage_message(stage: Stage) -> String {
    match stage {
        Stage::Downloading { of: 1, .. } => "Downloading...".to_string(),
        Stage::Downloading { stream, of } => format!("Downloading stream {}/{}...", stream, of),
        Stage::Merging => "Merging video and audio...".to_string(),
    }
}

/// Percent bars count in tenths of a percent
const PERCENT_SCALE: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarMode {
    Spinner,
    Percent,
    Bytes,
}

/// Spinner until progress is measurable. A byte bar once the total is known,
/// a percent bar while only the percentage is (merge jobs before the audio
/// size is reported).
pub struct JobBar {
    pb: ProgressBar,
    mode: BarMode,
}

impl JobBar {
    pub fn new() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message("Starting...");
        Self {
            pb,
            mode: BarMode::Spinner,
        }
    }

    pub fn stage(&self, stage: Stage) {
        self.pb.set_message(stage_message(stage));
    }

    pub fn update(&mut self, sample: &ProgressSample) {
        match (sample.total_bytes, sample.percent) {
            (Some(total), _) if total > 0 => {
                self.switch(BarMode::Bytes);
                self.pb.set_length(total);
                self.pb.set_position(sample.downloaded_bytes);
            }
            (_, Some(percent)) if self.mode != BarMode::Bytes => {
                self.switch(BarMode::Percent);
                let tenths = (percent.clamp(0.0, 100.0) * 10.0).round() as u64;
                self.pb.set_position(tenths);
            }
            _ if self.mode == BarMode::Spinner => self.pb.set_position(sample.downloaded_bytes),
            _ => {}
        }
    }

    fn switch(&mut self, mode: BarMode) {
        if self.mode == mode {
            return;
        }
        match mode {
            BarMode::Bytes => self.pb.set_style(bar_style()),
            BarMode::Percent => {
                self.pb.set_style(percent_style());
                self.pb.set_length(PERCENT_SCALE);
            }
            BarMode::Spinner => self.pb.set_style(spinner_style()),
        }
        self.mode = mode;
    }

    pub fn finish(&self, message: String) {
        self.pb.finish_with_message(message);
    }

    pub fn abandon(&self, message: String) {
        self.pb.abandon_with_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_messages() {
        assert_eq!(stage_message(Stage::Downloading { stream: 1, of: 1 }), "Downloading...");
        assert_eq!(
            stage_message(Stage::Downloading { stream: 2, of: 2 }),
            "Downloading stream 2/2..."
        );
        assert_eq!(stage_message(Stage::Merging), "Merging video and audio...");
    }

    #[test]
    fn test_bar_switches_to_sized_when_total_known() {
        let mut bar = JobBar::new();
        bar.update(&ProgressSample {
            downloaded_bytes: 10,
            total_bytes: None,
            percent: None,
        });
        assert_eq!(bar.mode, BarMode::Spinner);

        bar.update(&ProgressSample {
            downloaded_bytes: 50,
            total_bytes: Some(100),
            percent: Some(50.0),
        });
        assert_eq!(bar.mode, BarMode::Bytes);
        assert_eq!(bar.pb.length(), Some(100));
        assert_eq!(bar.pb.position(), 50);
        bar.finish("done".to_string());
    }

    #[test]
    fn test_merge_job_without_total_uses_percent_bar() {
        let mut bar = JobBar::new();
        bar.update(&ProgressSample {
            downloaded_bytes: 50,
            total_bytes: None,
            percent: Some(25.0),
        });
        assert_eq!(bar.mode, BarMode::Percent);
        assert_eq!(bar.pb.length(), Some(PERCENT_SCALE));
        assert_eq!(bar.pb.position(), 250);

        bar.update(&ProgressSample {
            downloaded_bytes: 120,
            total_bytes: None,
            percent: Some(62.5),
        });
        assert_eq!(bar.pb.position(), 625);

        // a known total takes over for good
        bar.update(&ProgressSample {
            downloaded_bytes: 900,
            total_bytes: Some(1000),
            percent: Some(90.0),
        });
        assert_eq!(bar.mode, BarMode::Bytes);
        assert_eq!(bar.pb.length(), Some(1000));
        bar.update(&ProgressSample {
            downloaded_bytes: 950,
            total_bytes: None,
            percent: Some(95.0),
        });
        assert_eq!(bar.mode, BarMode::Bytes);
        assert_eq!(bar.pb.position(), 900);
        bar.finish("done".to_string());
    }

    #[test]
    fn test_templates_are_valid() {
        assert!(ProgressStyle::default_bar().template(BAR_TEMPLATE).is_ok());
        assert!(ProgressStyle::default_bar().template(PERCENT_TEMPLATE).is_ok());
        assert!(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE).is_ok());
    }
}
