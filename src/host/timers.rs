use std::time::{Duration, Instant};

use rquickjs::{Function, Persistent};

/// A single pending `setTimeout` callback.
#[derive(Debug)]
pub struct Timer {
    pub id: i32,
    pub deadline: Instant,
    pub callback: Persistent<Function<'static>>,
}

/// The pending timers of one runtime. Fires earliest deadline first, and in
/// scheduling order on ties.
#[derive(Debug, Default)]
pub struct TimerQueue {
    last_id: i32,
    timers: Vec<Timer>,
}

impl TimerQueue {
    /// Schedule `callback` to run after `delay`. Returns the timer's id, which is
    /// never 0.
    pub fn schedule(&mut self, callback: Persistent<Function<'static>>, delay: Duration) -> i32 {
        self.last_id = self.last_id.checked_add(1).unwrap_or(1);
        let deadline = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(far_future);

        self.timers.push(Timer {
            id: self.last_id,
            deadline,
            callback,
        });

        self.last_id
    }

    /// Cancel a timer. Returns the callback if the timer was still pending.
    pub fn cancel(&mut self, id: i32) -> Option<Persistent<Function<'static>>> {
        let index = self.timers.iter().position(|t| t.id == id)?;
        Some(self.timers.remove(index).callback)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    fn earliest(&self) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.deadline, t.id))
            .map(|(i, _)| i)
    }

    /// The deadline of the next timer to fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.earliest().map(|i| self.timers[i].deadline)
    }

    /// Remove and return the next timer, if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let index = self.earliest()?;
        if self.timers[index].deadline > now {
            return None;
        }

        Some(self.timers.remove(index))
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

fn far_future() -> Instant {
    // roughly thirty years out
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}
