//! Fixed-interval scheduled tasks.
//!
//! Tasks are polled with the current time rather than driven by a runtime,
//! so late or skipped polls simply coalesce into one firing.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A fixed-period timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Instant,
}

impl IntervalTimer {
    /// First tick one period after `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_due: start + period,
        }
    }

    /// First tick at `start`.
    pub fn immediate(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_due: start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Returns true if the timer fired. Any number of missed periods fire
    /// once, and the next tick stays aligned to the original schedule.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        if self.period.is_zero() {
            self.next_due = now;
            return true;
        }
        let behind = now.duration_since(self.next_due).as_nanos();
        let missed = behind / self.period.as_nanos() + 1;
        let step = self.period.as_nanos().saturating_mul(missed);
        self.next_due += Duration::from_nanos(u64::try_from(step).unwrap_or(u64::MAX));
        true
    }
}

/// Periodic work owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    /// Drop expired reactions.
    PruneReactions,
    /// Emit a reaction at the cursor while the pointer is held.
    EmitReaction,
}

/// Set of scheduled tasks. Dropping the scheduler cancels everything.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    timers: BTreeMap<Task, IntervalTimer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task`, replacing any existing schedule for it.
    pub fn schedule(&mut self, task: Task, timer: IntervalTimer) {
        self.timers.insert(task, timer);
    }

    /// Cancel `task`. Returns true if it was scheduled.
    pub fn cancel(&mut self, task: Task) -> bool {
        self.timers.remove(&task).is_some()
    }

    pub fn is_scheduled(&self, task: Task) -> bool {
        self.timers.contains_key(&task)
    }

    /// Tasks due at `now`, in a stable order.
    pub fn due(&mut self, now: Instant) -> Vec<Task> {
        self.timers
            .iter_mut()
            .filter_map(|(task, timer)| timer.poll(now).then_some(*task))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_timer_fires_on_period() {
        let t0 = Instant::now();
        let mut timer = IntervalTimer::new(SECOND, t0);
        assert!(!timer.poll(t0 + Duration::from_millis(999)));
        assert!(timer.poll(t0 + SECOND));
        assert!(!timer.poll(t0 + Duration::from_millis(1500)));
        assert!(timer.poll(t0 + 2 * SECOND));
    }

    #[test]
    fn test_missed_ticks_coalesce() {
        let t0 = Instant::now();
        let mut timer = IntervalTimer::new(SECOND, t0);
        assert!(timer.poll(t0 + Duration::from_millis(3500)));
        assert!(!timer.poll(t0 + Duration::from_millis(3900)));
        assert_eq!(timer.next_due(), t0 + 4 * SECOND);
    }

    #[test]
    fn test_immediate_timer() {
        let t0 = Instant::now();
        let mut timer = IntervalTimer::immediate(Duration::from_millis(100), t0);
        assert!(timer.poll(t0));
        assert!(!timer.poll(t0 + Duration::from_millis(50)));
        assert!(timer.poll(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_scheduler_due_and_cancel() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Task::PruneReactions, IntervalTimer::new(SECOND, t0));
        scheduler.schedule(Task::EmitReaction, IntervalTimer::immediate(Duration::from_millis(100), t0));

        assert_eq!(scheduler.due(t0), vec![Task::EmitReaction]);
        assert_eq!(
            scheduler.due(t0 + SECOND),
            vec![Task::PruneReactions, Task::EmitReaction]
        );

        assert!(scheduler.cancel(Task::EmitReaction));
        assert!(!scheduler.is_scheduled(Task::EmitReaction));
        assert!(scheduler.due(t0 + 3 * SECOND).contains(&Task::PruneReactions));
        assert!(!scheduler.cancel(Task::EmitReaction));
    }
}
