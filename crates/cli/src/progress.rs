//! Progress sink that reports through the log stream.
//!
//! Rendering a bar is out of scope for the core; operators follow the
//! periodic log lines instead, which also work over ssh and in CI logs.

use std::time::{Duration, Instant};

use engine::{ProgressSink, SpeedMeter};
use tracing::info;

/// Minimum spacing between progress log lines.
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Logs transfer progress with an EMA-smoothed rate.
#[derive(Debug)]
pub struct LogProgress {
    meter: SpeedMeter,
    last_report: Option<Instant>,
}

impl LogProgress {
    /// Creates a quiet sink; the first line appears after the interval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meter: SpeedMeter::new(),
            last_report: None,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogProgress {
    fn advance(&mut self, transferred: u64, total: u64) {
        let now = Instant::now();
        let rate = self.meter.update(transferred, now);

        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) >= REPORT_INTERVAL);
        if due {
            let percent = if total > 0 {
                transferred as f64 / total as f64 * 100.0
            } else {
                100.0
            };
            info!(
                transferred,
                total,
                percent = format_args!("{percent:.1}"),
                rate_kib_s = format_args!("{:.1}", rate / 1024.0),
                "transfer progress"
            );
            self.last_report = Some(now);
        }
    }

    fn file_done(&mut self, total: u64) {
        info!(bytes = total, "file complete");
        self.last_report = None;
        self.meter = SpeedMeter::new();
    }
}
