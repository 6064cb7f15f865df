use crate::clock::Clock;
use crate::config::Config;
use crate::countdown::{Countdown, CountdownStep, ReleaseDelay};
use crate::scheduler::{Scheduler, TimerKind};
use crate::solve_timer::SolveTimer;

/// Where the timer is in its arm / run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Idle,
    Arming,
    Running,
}

/// Receives every completed solve with a non-zero time
pub trait SolveSink {
    fn submit(&mut self, elapsed_ms: u64);
}

impl<F: FnMut(u64)> SolveSink for F {
    fn submit(&mut self, elapsed_ms: u64) {
        self(elapsed_ms)
    }
}

/// What a stop request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Timer stopped; the solve went to the sink when `elapsed_ms > 0`
    Solved { elapsed_ms: u64 },
    /// False start: the countdown was abandoned and nothing was recorded
    Aborted,
    /// Already idle
    Ignored,
}

/// Timing knobs, usually taken from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub stage_interval_ms: u64,
    pub stage_count: u8,
    pub sample_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            stage_interval_ms: cfg.stage_interval_ms,
            stage_count: cfg.stage_count,
            sample_interval_ms: cfg.sample_interval_ms,
        }
    }
}

/// The single timer lifecycle: Idle -> Arming -> Running -> Idle.
///
/// Owns every scheduled timer. Time only moves when [`Session::advance`] is
/// called, which makes the whole machine single-threaded and deterministic
/// under a manual clock.
pub struct Session<C: Clock, D: ReleaseDelay> {
    clock: C,
    scheduler: Scheduler,
    countdown: Countdown<D>,
    timer: SolveTimer,
    phase: Phase,
    elapsed_ms: u64,
    arm_started_at: Option<u64>,
    sink: Box<dyn SolveSink>,
}

impl<C: Clock, D: ReleaseDelay> Session<C, D> {
    pub fn new(clock: C, delay: D, settings: SessionSettings, sink: Box<dyn SolveSink>) -> Self {
        Self {
            clock,
            scheduler: Scheduler::new(),
            countdown: Countdown::new(delay, settings.stage_interval_ms, settings.stage_count),
            timer: SolveTimer::new(settings.sample_interval_ms),
            phase: Phase::Idle,
            elapsed_ms: 0,
            arm_started_at: None,
            sink,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// 0 when dark, 1..=stage_count while lighting up, stage_count + 1 once released
    pub fn stage_index(&self) -> u8 {
        self.countdown.stage()
    }

    pub fn stage_count(&self) -> u8 {
        self.countdown.stage_count()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn arm_started_at(&self) -> Option<u64> {
        self.arm_started_at
    }

    pub fn run_started_at(&self) -> Option<u64> {
        self.timer.started_at()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Earliest pending timer, for sizing the event loop's wait
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Begin the countdown. No-op unless idle.
    pub fn request_start(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }

        let now = self.clock.now_ms();
        self.cancel_all();
        self.phase = Phase::Arming;
        self.elapsed_ms = 0;
        self.arm_started_at = Some(now);
        self.countdown.arm(&mut self.scheduler, now);
        tracing::debug!(at = now, "session arming");
        true
    }

    /// Stop a running solve, or abandon a countdown in progress
    pub fn request_stop(&mut self) -> StopOutcome {
        match self.phase {
            Phase::Idle => StopOutcome::Ignored,
            Phase::Arming => {
                self.cancel_all();
                self.phase = Phase::Idle;
                self.elapsed_ms = 0;
                tracing::debug!("countdown aborted");
                StopOutcome::Aborted
            }
            Phase::Running => {
                let now = self.clock.now_ms();
                // sampling must be gone before the solve leaves the session
                let elapsed_ms = self.timer.stop(&mut self.scheduler, now).unwrap_or(0);
                self.cancel_all();
                self.phase = Phase::Idle;
                self.elapsed_ms = elapsed_ms;
                tracing::info!(elapsed_ms, "solve finished");

                if elapsed_ms > 0 {
                    self.sink.submit(elapsed_ms);
                }
                StopOutcome::Solved { elapsed_ms }
            }
        }
    }

    /// The single toggle input: start when idle, stop when running, ignore while arming
    pub fn toggle(&mut self) -> bool {
        self.advance();
        match self.phase {
            Phase::Idle => self.request_start(),
            Phase::Running => !matches!(self.request_stop(), StopOutcome::Ignored),
            Phase::Arming => false,
        }
    }

    /// Fire every timer due by now. Returns true if anything visible changed.
    pub fn advance(&mut self) -> bool {
        let now = self.clock.now_ms();
        let mut changed = false;

        while let Some(fired) = self.scheduler.pop_due(now) {
            match fired.kind {
                TimerKind::StageTick | TimerKind::Release => {
                    match self.countdown.on_fired(&mut self.scheduler, fired) {
                        CountdownStep::Stage(stage) => {
                            tracing::debug!(stage, at = fired.at, "stage lit");
                            changed = true;
                        }
                        CountdownStep::Released { at } => {
                            self.phase = Phase::Running;
                            self.timer.start(&mut self.scheduler, at);
                            self.elapsed_ms = now.saturating_sub(at);
                            tracing::debug!(at, "lights out");
                            changed = true;
                        }
                        CountdownStep::Ignored => {}
                    }
                }
                TimerKind::Sample => {
                    if let Some(ms) = self.timer.on_fired(fired, now) {
                        self.elapsed_ms = ms;
                        changed = true;
                    }
                }
            }
        }

        changed
    }

    /// Single teardown path for every exit from Arming or Running
    fn cancel_all(&mut self) {
        self.countdown.cancel(&mut self.scheduler);
        self.timer.cancel(&mut self.scheduler);
        self.scheduler.cancel_all();
        self.arm_started_at = None;
    }
}
