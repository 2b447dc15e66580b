/// Terminal rendering of download progress.
///
/// Consumes the event sequence produced by the transfer and drives an
/// `indicatif` bar; throttled log lines go to `tracing` for non-interactive
/// runs.
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

use playon_shared::models::DownloadEvent;

/// Minimum spacing between progress log lines.
const LOG_INTERVAL: Duration = Duration::from_secs(3);
/// Minimum percentage change between progress log lines.
const LOG_STEP_PERCENT: u8 = 5;

/// Percentage of `total` covered by `downloaded`, clamped to 100.
pub fn percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((downloaded.min(total) * 100) / total) as u8
}

/// Generate a simple text progress bar.
pub fn progress_bar(percent: u8) -> String {
    let filled = (percent.min(100) as usize) / 5; // 20 chars total
    let empty = 20_usize.saturating_sub(filled);
    format!("[{}{}]", "=".repeat(filled), " ".repeat(empty))
}

/// Decides when a progress log line is worth emitting.
#[derive(Debug)]
pub struct LogThrottle {
    last_at: Option<Instant>,
    last_percent: Option<u8>,
}

impl LogThrottle {
    pub fn new() -> Self {
        Self {
            last_at: None,
            last_percent: None,
        }
    }

    /// Whether to log `pct` at `now`: at least `LOG_INTERVAL` apart and
    /// `LOG_STEP_PERCENT` points of change, except the first and final lines.
    pub fn should_log(&mut self, pct: u8, now: Instant) -> bool {
        let due = match (self.last_at, self.last_percent) {
            (None, _) | (_, None) => true,
            (Some(at), Some(last)) => {
                (pct == 100 && last != 100)
                    || (now.duration_since(at) >= LOG_INTERVAL
                        && pct.saturating_sub(last) >= LOG_STEP_PERCENT)
            }
        };
        if due {
            self.last_at = Some(now);
            self.last_percent = Some(pct);
        }
        due
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style(known_length: bool) -> ProgressStyle {
    let template = if known_length {
        "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
    } else {
        "{spinner:.green} {msg} [{elapsed_precise}] {bytes} ({bytes_per_sec})"
    };
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Render events for one recording until the sender is dropped.
pub async fn render(title: String, mut rx: mpsc::UnboundedReceiver<DownloadEvent>) {
    let mut bar: Option<ProgressBar> = None;
    let mut throttle = LogThrottle::new();

    while let Some(event) = rx.recv().await {
        match event {
            DownloadEvent::Started { total } => {
                let pb = match total {
                    Some(total) => ProgressBar::new(total).with_style(bar_style(true)),
                    None => ProgressBar::new_spinner().with_style(bar_style(false)),
                };
                pb.set_message(title.clone());
                bar = Some(pb);
            }
            DownloadEvent::Advanced { downloaded, total } => {
                if let Some(pb) = &bar {
                    pb.set_position(downloaded);
                }
                if let Some(total) = total {
                    let pct = percent(downloaded, total);
                    if throttle.should_log(pct, Instant::now()) {
                        debug!("{} {} {}%", title, progress_bar(pct), pct);
                    }
                }
            }
            DownloadEvent::Finished { downloaded } => {
                if let Some(pb) = bar.take() {
                    pb.set_position(downloaded);
                    pb.finish_with_message(format!("{} done", title));
                }
            }
        }
    }

    // Sender dropped without a `Finished` event: the transfer failed.
    if let Some(pb) = bar.take() {
        pb.abandon_with_message(format!("{} failed", title));
    }
}
