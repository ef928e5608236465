use crate::error::Result;
use crate::handle::{Handle, handle_kind};
use crate::reactor::handle::{HandleData, TimerState, callback};
use crate::runtime::Loop;

handle_kind!(
    /// Kind marker of [`Timer`].
    TimerKind => Timer
);

/// Calls back after a timeout, optionally repeating.
pub type Timer = Handle<TimerKind>;

impl Handle<TimerKind> {
    pub fn new(event_loop: &Loop) -> Result<Self> {
        Self::init(event_loop, HandleData::Timer(TimerState::default()))
    }

    /// Starts the timer: `cb` runs `timeout` ms from now and then every
    /// `repeat` ms if `repeat` is non-zero.
    ///
    /// Starting an active timer restarts it with the new callback and
    /// timeouts. Fails with `EINVAL` on a closing handle.
    pub fn start(&self, cb: impl FnMut() + 'static, timeout: u64, repeat: u64) -> Result<()> {
        self.reactor()
            .timer_start(self.key(), callback(cb), timeout, repeat)
    }

    pub fn stop(&self) {
        self.reactor().timer_stop(self.key());
    }

    /// Restarts a repeating timer with its repeat interval as the timeout.
    /// Does nothing for a timer without repeat, and fails with `EINVAL` if
    /// the timer was never started.
    pub fn again(&self) -> Result<()> {
        self.reactor().timer_again(self.key())
    }

    /// Sets the repeat interval. Takes effect the next time the timer fires
    /// or is restarted.
    pub fn set_repeat(&self, repeat: u64) {
        self.reactor().timer_set_repeat(self.key(), repeat);
    }

    pub fn repeat(&self) -> u64 {
        self.reactor().timer_repeat(self.key())
    }

    /// Milliseconds until the timer fires, relative to the loop time. Zero for
    /// an inactive or overdue timer.
    pub fn due_in(&self) -> u64 {
        self.reactor().timer_due_in(self.key())
    }
}
