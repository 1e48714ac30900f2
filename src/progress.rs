use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receives live queue progress, e.g. to drive a foreground notification.
///
/// Called from the scheduler on every claim and completion. Implementations
/// own any throttling.
pub trait ProgressSink: Send + Sync {
    fn on_active_count_changed(&self, active: usize, pending: usize);

    fn on_idle(&self);
}

/// Logs progress through `tracing`, at most once per throttle window.
#[derive(Debug)]
pub struct LogProgressSink {
    throttle: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogProgressSink {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last: Mutex::new(None),
        }
    }

    fn should_emit(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.throttle => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl ProgressSink for LogProgressSink {
    fn on_active_count_changed(&self, active: usize, pending: usize) {
        if self.should_emit() {
            tracing::info!(active, pending, "Downloading chapters");
        }
    }

    fn on_idle(&self) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = None;
        tracing::info!("Download queue idle");
    }
}
