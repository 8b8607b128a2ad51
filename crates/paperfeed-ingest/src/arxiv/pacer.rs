//! Pause handling between throttled fetches
//!
//! The controller never sleeps directly; it hands the governor's wait to a
//! [`Pacer`]. [`CountdownPacer`] blocks for the full duration and shows the
//! time left once per second. Tests inject a pacer that only records.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait for `wait` before the next fetch. Not cancellable.
    async fn pause(&self, wait: Duration);
}

/// Sleeps in one-second ticks and renders a `Time left : MM:SS` countdown
#[derive(Clone)]
pub struct CountdownPacer {
    bar: ProgressBar,
}

impl CountdownPacer {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// A countdown that sleeps without drawing anything
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:30.cyan/blue}]") {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl Default for CountdownPacer {
    fn default() -> Self {
        Self::new()
    }
}

/// `MM:SS` rendering of the time left
pub fn format_time_left(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[async_trait]
impl Pacer for CountdownPacer {
    async fn pause(&self, wait: Duration) {
        let total = wait.as_secs();
        info!(minutes = total / 60, "Fetching paused due to rate limiting");

        self.bar.reset();
        self.bar.set_length(total);
        for elapsed in 0..total {
            self.bar.set_position(elapsed);
            self.bar.set_message(format!("Time left : {}", format_time_left(total - elapsed)));
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.bar.set_position(total);
        self.bar.finish_and_clear();
    }
}
