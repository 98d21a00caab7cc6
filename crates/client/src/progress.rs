//! Synthetic progress for operations the service reports no progress for.
//!
//! A ticker raises the value by a fixed step per interval up to
//! [`PROGRESS_CAP`], then stops. Only a successful resolution releases the
//! value to [`PROGRESS_DONE`]; a failed one resets it to zero.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use rebuttal_common::config::ProgressProfile;

/// Highest value the ticker may reach before the operation resolves.
pub const PROGRESS_CAP: u8 = 90;
/// Value after a successful resolution.
pub const PROGRESS_DONE: u8 = 100;

/// One stage's displayed progress value.
#[derive(Debug, Default)]
pub struct SyntheticProgress {
    inner: Mutex<ProgressInner>,
}

#[derive(Debug, Default)]
struct ProgressInner {
    value: u8,
    running: bool,
    /// Incremented on every start and reset. Tickers and resolutions carry
    /// the run they belong to and are ignored once it is superseded.
    run: u64,
}

impl SyntheticProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u8 {
        self.lock().value
    }

    /// Stop any run in progress and return to zero.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.run += 1;
        inner.running = false;
        inner.value = 0;
    }

    fn begin(&self) -> u64 {
        let mut inner = self.lock();
        inner.run += 1;
        inner.running = true;
        inner.value = 0;
        inner.run
    }

    /// Advance by `step`. Returns whether further ticks can still move the value.
    fn tick(&self, run: u64, step: u8) -> bool {
        let mut inner = self.lock();
        if !inner.running || inner.run != run {
            return false;
        }
        inner.value = inner.value.saturating_add(step).min(PROGRESS_CAP);
        inner.value < PROGRESS_CAP
    }

    fn resolve(&self, run: u64, success: bool) {
        let mut inner = self.lock();
        if inner.run != run {
            return;
        }
        inner.running = false;
        inner.value = if success { PROGRESS_DONE } else { 0 };
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Starts tick loops with one stage's step and interval.
#[derive(Clone, Copy, Debug)]
pub struct ProgressEstimator {
    interval: Duration,
    step: u8,
}

impl ProgressEstimator {
    pub fn new(profile: ProgressProfile) -> Self {
        Self {
            interval: Duration::from_millis(profile.interval_ms),
            step: profile.step,
        }
    }

    /// Reset `progress` to zero and start ticking it. Must be called inside
    /// a tokio runtime.
    pub fn start(&self, progress: Arc<SyntheticProgress>) -> ProgressTicker {
        let run = progress.begin();
        let interval = self.interval;
        let step = self.step;

        let task = tokio::spawn({
            let progress = Arc::clone(&progress);
            async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if !progress.tick(run, step) {
                        break;
                    }
                }
            }
        });

        ProgressTicker {
            progress,
            run,
            task,
        }
    }
}

/// A running tick loop, bound to one operation. Dropping it stops the loop
/// without touching the value.
#[derive(Debug)]
pub struct ProgressTicker {
    progress: Arc<SyntheticProgress>,
    run: u64,
    task: JoinHandle<()>,
}

impl ProgressTicker {
    /// Stop ticking and release the value to 100.
    pub fn succeed(self) {
        self.task.abort();
        self.progress.resolve(self.run, true);
    }

    /// Stop ticking and reset the value to 0.
    pub fn fail(self) {
        self.task.abort();
        self.progress.resolve(self.run, false);
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
