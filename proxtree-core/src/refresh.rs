//! Refresh coordinator
//!
//! Decides, at each poll, whether the periodic refresh may run. Three gates
//! apply in order:
//! - explicitly paused: nothing happens
//! - a drag mutation is in flight: the due tick is dropped, not queued
//! - the pointer is over the tree (or left less than the debounce ago): the
//!   due tick is deferred and fires once the pointer has been gone long
//!   enough
//!
//! The coordinator holds no timer of its own. Callers pass `now` and ask
//! [`RefreshCoordinator::next_wakeup`] when to poll again.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::gesture::GestureState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    GestureActive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickDecision {
    Fire,
    Skipped(SkipReason),
    Deferred,
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hover {
    Outside,
    Inside,
    Leaving { since: Instant },
}

#[derive(Clone, Debug)]
pub struct RefreshCoordinator {
    interval: Duration,
    debounce: Duration,
    paused: bool,
    hover: Hover,
    /// `None` means due right away.
    next_due: Option<Instant>,
    /// A tick came due while the hover gate was closed.
    pending: bool,
}

impl RefreshCoordinator {
    pub fn new(interval: Duration, debounce: Duration) -> Self {
        Self {
            interval,
            debounce,
            paused: false,
            hover: Hover::Outside,
            next_due: None,
            pending: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn pause(&mut self) {
        if !self.paused {
            debug!("auto refresh paused");
        }
        self.paused = true;
    }

    /// Resume, optionally with a new interval. The next poll fires.
    pub fn resume(&mut self, interval: Option<Duration>) {
        if let Some(interval) = interval {
            self.interval = interval;
        }
        self.paused = false;
        self.next_due = None;
        debug!(interval_ms = self.interval.as_millis() as u64, "auto refresh resumed");
    }

    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.next_due = Some(now + interval);
    }

    /// Ask for a refresh at the next poll, still subject to every gate.
    pub fn request(&mut self) {
        self.next_due = None;
    }

    pub fn pointer_entered(&mut self) {
        self.hover = Hover::Inside;
    }

    pub fn pointer_left(&mut self, now: Instant) {
        if self.hover == Hover::Inside {
            self.hover = Hover::Leaving { since: now };
        }
    }

    pub fn is_hovering(&self) -> bool {
        self.hover != Hover::Outside
    }

    fn hover_blocks(&mut self, now: Instant) -> bool {
        match self.hover {
            Hover::Outside => false,
            Hover::Inside => true,
            Hover::Leaving { since } => {
                if now.saturating_duration_since(since) >= self.debounce {
                    self.hover = Hover::Outside;
                    false
                } else {
                    true
                }
            }
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.pending || self.next_due.is_none_or(|due| now >= due)
    }

    pub fn poll(&mut self, now: Instant, gesture: &GestureState) -> TickDecision {
        if self.paused || !self.is_due(now) {
            return TickDecision::Idle;
        }
        if gesture.is_mutating() {
            self.pending = false;
            self.next_due = Some(now + self.interval);
            trace!("refresh tick dropped, drag in progress");
            return TickDecision::Skipped(SkipReason::GestureActive);
        }
        if self.hover_blocks(now) {
            self.pending = true;
            trace!("refresh tick deferred, pointer over tree");
            return TickDecision::Deferred;
        }
        self.pending = false;
        self.next_due = Some(now + self.interval);
        TickDecision::Fire
    }

    /// When the caller should poll next. `None` means only an external event
    /// (resume, pointer movement) can make a tick due.
    pub fn next_wakeup(&self, now: Instant) -> Option<Instant> {
        if self.paused {
            return None;
        }
        if self.pending {
            return match self.hover {
                Hover::Inside => None,
                Hover::Leaving { since } => Some(since + self.debounce),
                Hover::Outside => Some(now),
            };
        }
        Some(self.next_due.unwrap_or(now))
    }
}
