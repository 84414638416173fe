//! Alert sink that records chimes in the log.
//!
//! Audio playback lives outside the controller; this sink marks each
//! alert in the structured log and counts them.

use std::sync::atomic::{AtomicU64, Ordering};

use kettle_common::hal::AlertSink;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogAlertSink {
    plays: AtomicU64,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts played so far.
    pub fn plays(&self) -> u64 {
        self.plays.load(Ordering::Relaxed)
    }
}

impl AlertSink for LogAlertSink {
    fn play_alert(&self) {
        let n = self.plays.fetch_add(1, Ordering::Relaxed) + 1;
        info!(count = n, "Alert chime");
    }
}
