//! Teaching timer state machine.
//!
//! A session's timers form an ordered log in which only the newest entry may
//! still be running. `Idle` means no running timer; `Running(teacher)` means
//! the newest timer is open. Starting while running closes the open timer at
//! the same instant before opening the next one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One contiguous teaching interval. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub teacher_id: Uuid,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub duration_seconds: i64,
}

impl Timer {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Close at `now`. Closing twice keeps the first duration.
    fn close(&mut self, now: i64) {
        if self.ended_at.is_some() {
            return;
        }
        let end = now.max(self.started_at);
        self.ended_at = Some(end);
        self.duration_seconds = (end - self.started_at) / 1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running(Uuid),
}

/// The timer log of one session.
#[derive(Debug, Clone, Default)]
pub struct TimerLog {
    timers: Vec<Timer>,
}

impl TimerLog {
    /// Rebuild from persisted timers. If storage holds more than one open
    /// timer, all but the newest are closed where the next one began.
    #[must_use]
    pub fn from_timers(mut timers: Vec<Timer>) -> Self {
        timers.sort_by_key(|t| t.started_at);
        let starts: Vec<i64> = timers.iter().map(|t| t.started_at).collect();
        let last = timers.len().saturating_sub(1);
        for (idx, timer) in timers.iter_mut().enumerate() {
            if idx < last {
                timer.close(starts[idx + 1]);
            }
        }
        Self { timers }
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        match self.running() {
            Some(timer) => TimerState::Running(timer.teacher_id),
            None => TimerState::Idle,
        }
    }

    #[must_use]
    pub fn running(&self) -> Option<&Timer> {
        self.timers.last().filter(|t| t.is_running())
    }

    #[must_use]
    pub fn timers(&self) -> &[Timer] {
        &self.timers
    }

    /// Start a timer for `teacher`. Returns the timer closed by this
    /// transition, if any, and the new running timer.
    pub fn start(&mut self, session_id: Uuid, teacher_id: Uuid, now: i64) -> (Option<Timer>, Timer) {
        let closed = self.stop(now);
        let timer = Timer {
            id: Uuid::new_v4(),
            session_id,
            teacher_id,
            started_at: now,
            ended_at: None,
            duration_seconds: 0,
        };
        self.timers.push(timer.clone());
        (closed, timer)
    }

    /// Close the running timer. `None` when already idle.
    pub fn stop(&mut self, now: i64) -> Option<Timer> {
        let timer = self.timers.last_mut().filter(|t| t.is_running())?;
        timer.close(now);
        Some(timer.clone())
    }

    /// Sum of closed durations taught by `teacher_id`.
    #[must_use]
    pub fn teaching_seconds(&self, teacher_id: Uuid) -> i64 {
        self.timers
            .iter()
            .filter(|t| t.teacher_id == teacher_id && !t.is_running())
            .map(|t| t.duration_seconds)
            .sum()
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.timers.iter().filter(|t| t.is_running()).count()
    }
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
