use crate::error::Result;
use crate::handle::{Handle, handle_kind};
use crate::reactor::handle::{HandleData, SignalState, signal_callback};
use crate::runtime::Loop;

handle_kind!(
    /// Kind marker of [`Signal`].
    SignalKind => Signal
);

/// Delivers a process signal to a callback on the loop thread.
///
/// The callback receives the signal number. While a signal is watched by any
/// loop, its default disposition is replaced; it is restored once the last
/// watcher stops.
pub type Signal = Handle<SignalKind>;

impl Handle<SignalKind> {
    pub fn new(event_loop: &Loop) -> Result<Self> {
        Self::init(event_loop, HandleData::Signal(SignalState::default()))
    }

    /// Watches `signum` until stopped. Restarting with another signal stops
    /// watching the previous one.
    ///
    /// Fails with `EINVAL` for signals that cannot be caught.
    pub fn start(&self, signum: i32, cb: impl FnMut(i32) + 'static) -> Result<()> {
        self.reactor()
            .signal_start(self.key(), signum, signal_callback(cb), false)
    }

    /// Like [`start`](Self::start), but the handle stops itself right before
    /// the first delivery.
    pub fn start_oneshot(&self, signum: i32, cb: impl FnMut(i32) + 'static) -> Result<()> {
        self.reactor()
            .signal_start(self.key(), signum, signal_callback(cb), true)
    }

    pub fn stop(&self) {
        self.reactor().signal_stop(self.key());
    }

    /// The signal last passed to `start`, or `0`.
    pub fn signum(&self) -> i32 {
        self.reactor().signal_signum(self.key())
    }
}
