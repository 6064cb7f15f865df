use crate::scheduler::{Fired, Scheduler, TimerHandle, TimerKind};

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 10;

/// Measures a solve from release to stop.
///
/// The repeating sample only feeds the live display. The recorded value is
/// always recomputed from the anchor at stop time.
#[derive(Debug)]
pub struct SolveTimer {
    sample_interval_ms: u64,
    started_at: Option<u64>,
    sample: Option<TimerHandle>,
    displayed_ms: u64,
}

impl SolveTimer {
    pub fn new(sample_interval_ms: u64) -> Self {
        Self {
            sample_interval_ms,
            started_at: None,
            sample: None,
            displayed_ms: 0,
        }
    }

    pub fn start(&mut self, scheduler: &mut Scheduler, at: u64) {
        self.cancel(scheduler);
        self.started_at = Some(at);
        self.displayed_ms = 0;
        self.sample = Some(scheduler.schedule_repeating(
            TimerKind::Sample,
            at,
            self.sample_interval_ms,
        ));
    }

    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Last value published for display
    pub fn displayed_ms(&self) -> u64 {
        self.displayed_ms
    }

    /// Refresh the displayed value. Returns `None` if the timer wasn't ours.
    pub fn on_fired(&mut self, fired: Fired, now: u64) -> Option<u64> {
        if Some(fired.handle) != self.sample {
            return None;
        }
        let started_at = self.started_at?;
        self.displayed_ms = now.saturating_sub(started_at);
        Some(self.displayed_ms)
    }

    /// Cancel sampling, then compute the final elapsed time from the anchor
    pub fn stop(&mut self, scheduler: &mut Scheduler, now: u64) -> Option<u64> {
        if let Some(sample) = self.sample.take() {
            scheduler.cancel(sample);
        }
        let started_at = self.started_at.take()?;
        self.displayed_ms = now.saturating_sub(started_at);
        Some(self.displayed_ms)
    }

    pub fn cancel(&mut self, scheduler: &mut Scheduler) {
        if let Some(sample) = self.sample.take() {
            scheduler.cancel(sample);
        }
        self.started_at = None;
    }
}

impl Default for SolveTimer {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL_MS)
    }
}
