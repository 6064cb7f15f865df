use rand::Rng;

use crate::scheduler::{Fired, Scheduler, TimerHandle, TimerKind};

pub const DEFAULT_STAGE_INTERVAL_MS: u64 = 600;
pub const DEFAULT_STAGE_COUNT: u8 = 5;
pub const DEFAULT_RELEASE_MIN_MS: u64 = 500;
pub const DEFAULT_RELEASE_MAX_MS: u64 = 1500;

/// Source of the unannounced pause between the last lit stage and release
pub trait ReleaseDelay {
    fn next_delay_ms(&mut self) -> u64;
}

/// Uniform delay in `[min_ms, max_ms)`
#[derive(Debug, Clone, Copy)]
pub struct RandomDelay {
    min_ms: u64,
    max_ms: u64,
}

impl RandomDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms: max_ms.max(min_ms + 1),
        }
    }
}

impl Default for RandomDelay {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_MIN_MS, DEFAULT_RELEASE_MAX_MS)
    }
}

impl ReleaseDelay for RandomDelay {
    fn next_delay_ms(&mut self) -> u64 {
        rand::thread_rng().gen_range(self.min_ms..self.max_ms)
    }
}

/// Always the same delay; used to make countdowns reproducible
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub u64);

impl ReleaseDelay for FixedDelay {
    fn next_delay_ms(&mut self) -> u64 {
        self.0
    }
}

/// Result of feeding a fired timer to the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// One more stage is lit
    Stage(u8),
    /// Every light went out at `at`
    Released { at: u64 },
    /// The timer did not belong to this countdown
    Ignored,
}

/// Race-start light sequence.
///
/// Stages light up one per interval. After the last one the repeating tick is
/// dropped and a single release is scheduled after a delay drawn from the
/// injected [`ReleaseDelay`].
#[derive(Debug)]
pub struct Countdown<D: ReleaseDelay> {
    delay: D,
    stage_interval_ms: u64,
    stage_count: u8,
    stage: u8,
    tick: Option<TimerHandle>,
    release: Option<TimerHandle>,
    last_stage_at: Option<u64>,
}

impl<D: ReleaseDelay> Countdown<D> {
    pub fn new(delay: D, stage_interval_ms: u64, stage_count: u8) -> Self {
        Self {
            delay,
            stage_interval_ms,
            stage_count: stage_count.max(1),
            stage: 0,
            tick: None,
            release: None,
            last_stage_at: None,
        }
    }

    /// The stage value reported once the lights go out
    pub fn release_stage(&self) -> u8 {
        self.stage_count.saturating_add(1)
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn stage_count(&self) -> u8 {
        self.stage_count
    }

    /// Timestamp of the most recent stage tick
    pub fn last_stage_at(&self) -> Option<u64> {
        self.last_stage_at
    }

    pub fn is_pending(&self) -> bool {
        self.tick.is_some() || self.release.is_some()
    }

    pub fn arm(&mut self, scheduler: &mut Scheduler, now: u64) {
        self.cancel(scheduler);
        self.tick = Some(scheduler.schedule_repeating(
            TimerKind::StageTick,
            now,
            self.stage_interval_ms,
        ));
    }

    pub fn on_fired(&mut self, scheduler: &mut Scheduler, fired: Fired) -> CountdownStep {
        if Some(fired.handle) == self.tick {
            self.stage += 1;
            self.last_stage_at = Some(fired.at);

            if self.stage >= self.stage_count {
                if let Some(tick) = self.tick.take() {
                    scheduler.cancel(tick);
                }
                let delay = self.delay.next_delay_ms();
                tracing::debug!(delay_ms = delay, "all stages lit, release scheduled");
                self.release = Some(scheduler.schedule_once(TimerKind::Release, fired.at, delay));
            }

            CountdownStep::Stage(self.stage)
        } else if Some(fired.handle) == self.release {
            self.release = None;
            self.stage = self.release_stage();
            CountdownStep::Released { at: fired.at }
        } else {
            CountdownStep::Ignored
        }
    }

    /// Drop any pending tick or release and go dark. Safe to call repeatedly.
    pub fn cancel(&mut self, scheduler: &mut Scheduler) {
        if let Some(tick) = self.tick.take() {
            scheduler.cancel(tick);
        }
        if let Some(release) = self.release.take() {
            scheduler.cancel(release);
        }
        self.stage = 0;
        self.last_stage_at = None;
    }
}
