use std::collections::BTreeMap;

/// Owned handle to a scheduled timer. Cancelling through a stale handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// What a timer is for, so the owner can dispatch without closures
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum TimerKind {
    StageTick,
    Release,
    Sample,
}

/// A timer that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub handle: TimerHandle,
    pub kind: TimerKind,
    /// The instant the timer was scheduled to fire, not when it was observed
    pub at: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TimerKind,
    deadline: u64,
    period: Option<u64>,
}

/// Single-threaded timer table driven by an external clock.
///
/// Nothing fires on its own: the owner calls [`Scheduler::pop_due`] with the
/// current time and handles one timer at a time, so a handler that cancels
/// other timers is guaranteed those never fire.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    timers: BTreeMap<TimerHandle, Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every `interval_ms`, first at `start + interval_ms`
    pub fn schedule_repeating(&mut self, kind: TimerKind, start: u64, interval_ms: u64) -> TimerHandle {
        let interval_ms = interval_ms.max(1);
        self.insert(Entry {
            kind,
            deadline: start.saturating_add(interval_ms),
            period: Some(interval_ms),
        })
    }

    /// Fire once at `start + delay_ms`
    pub fn schedule_once(&mut self, kind: TimerKind, start: u64, delay_ms: u64) -> TimerHandle {
        self.insert(Entry {
            kind,
            deadline: start.saturating_add(delay_ms),
            period: None,
        })
    }

    fn insert(&mut self, entry: Entry) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        tracing::trace!(?handle, kind = %entry.kind, deadline = entry.deadline, "timer scheduled");
        self.timers.insert(handle, entry);
        handle
    }

    /// Returns true if the timer was still pending
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.values().map(|e| e.deadline).min()
    }

    /// Take the earliest timer due at or before `now`.
    ///
    /// Ties go to the timer scheduled first. Repeating timers are re-armed one
    /// period after their previous deadline, so late polling never skips ticks.
    pub fn pop_due(&mut self, now: u64) -> Option<Fired> {
        let (&handle, &entry) = self
            .timers
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .min_by_key(|(h, e)| (e.deadline, **h))?;

        match entry.period {
            Some(period) => {
                if let Some(e) = self.timers.get_mut(&handle) {
                    e.deadline = e.deadline.saturating_add(period);
                }
            }
            None => {
                self.timers.remove(&handle);
            }
        }

        Some(Fired {
            handle,
            kind: entry.kind,
            at: entry.deadline,
        })
    }
}
