//! The event loop that drives handles and completes requests.
//!
//! A [`Loop`] is a thin owner of the native reactor. It runs the reactor,
//! exposes its clock and backend descriptor, and closes it on drop. Handles
//! and requests keep their own reference to the reactor, so they stay valid
//! even if they outlive the `Loop` value that created them.

use crate::builder::LoopConfig;
use crate::error::{EINVAL, EPERM, Error, Result};
use crate::reactor::core::{Reactor, RunMode};
use crate::reactor::handle::HandleInfo;

use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// Shared reference to a native loop.
///
/// This is what [`Loop::raw`] hands out and what [`Loop::from_raw`] wraps.
/// Wrapping a `RawLoop` never takes ownership: the loop is closed only by
/// the `Loop` that created it.
#[derive(Clone)]
pub struct RawLoop(pub(crate) Rc<Reactor>);

impl RawLoop {
    /// Whether two references point at the same native loop.
    pub fn ptr_eq(&self, other: &RawLoop) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RawLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawLoop")
            .field(&Rc::as_ptr(&self.0))
            .finish()
    }
}

/// Single-threaded event loop.
///
/// Owned loops are created with [`Loop::new`], [`Loop::with_config`] or a
/// [`LoopBuilder`](crate::LoopBuilder), and close their native loop when
/// dropped. Borrowed loops come from [`Loop::from_raw`] and leave the native
/// loop alone.
///
/// # Example
/// ```no_run
/// use runa_io::{Loop, RunMode, Timer};
///
/// let event_loop = Loop::new()?;
/// let timer = Timer::new(&event_loop)?;
/// timer.start(|| println!("tick"), 10, 0)?;
///
/// event_loop.run(RunMode::Default)?;
/// # Ok::<(), runa_io::Error>(())
/// ```
pub struct Loop {
    reactor: Rc<Reactor>,
    owner: bool,
}

impl Loop {
    /// Creates an owned loop configured from the environment.
    pub fn new() -> Result<Self> {
        Self::with_config(LoopConfig::from_env())
    }

    /// Creates an owned loop with an explicit configuration.
    pub fn with_config(config: LoopConfig) -> Result<Self> {
        let reactor = Reactor::new(config)?;
        log::debug!("loop created (fd {})", reactor.backend_fd());

        Ok(Self {
            reactor: Rc::new(reactor),
            owner: true,
        })
    }

    /// Wraps an existing native loop without taking ownership.
    ///
    /// Fails with [`Error::InvalidArgument`] for `None` and with `EINVAL`
    /// if the native loop has already been closed.
    pub fn from_raw(raw: Option<RawLoop>) -> Result<Self> {
        let RawLoop(reactor) = raw.ok_or(Error::InvalidArgument("native loop is missing"))?;
        if reactor.is_closed() {
            return Err(Error::from_status(EINVAL));
        }

        Ok(Self {
            reactor,
            owner: false,
        })
    }

    /// The native loop behind this wrapper.
    pub fn raw(&self) -> RawLoop {
        RawLoop(self.reactor.clone())
    }

    /// Whether this wrapper closes the native loop when dropped.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn config(&self) -> &LoopConfig {
        self.reactor.config()
    }

    /// Runs the loop in the given mode.
    ///
    /// Returns `true` if something still keeps the loop alive: an active
    /// referenced handle, a pending request or a closing handle.
    ///
    /// Fails with `EBUSY` when called from inside a callback of this loop
    /// and with `EINVAL` once the loop is closed.
    pub fn run(&self, mode: RunMode) -> Result<bool> {
        self.reactor.run(mode)
    }

    /// Makes the current [`run`](Self::run) return after this iteration.
    pub fn stop(&self) {
        self.reactor.stop();
    }

    /// Closes the native loop.
    ///
    /// Any handle still open is closed and the loop runs once more so close
    /// callbacks and in-flight requests can finish. If the loop is still busy
    /// afterwards the close fails with `EBUSY`. Closing twice is a no-op.
    ///
    /// Borrowed loops cannot be closed and fail with `EPERM`.
    pub fn close(&self) -> Result<()> {
        if !self.owner {
            return Err(Error::from_status(EPERM));
        }
        self.reactor.close()
    }

    pub fn is_closed(&self) -> bool {
        self.reactor.is_closed()
    }

    /// Whether running the loop would do anything.
    pub fn is_alive(&self) -> bool {
        !self.reactor.is_closed() && self.reactor.alive()
    }

    /// Cached loop time in milliseconds, refreshed at the start of every
    /// iteration.
    pub fn now(&self) -> u64 {
        self.reactor.now()
    }

    /// Refreshes the cached loop time.
    pub fn update_time(&self) {
        self.reactor.update_time();
    }

    /// High resolution time in nanoseconds since the loop was created.
    pub fn hrtime(&self) -> u64 {
        self.reactor.hrtime()
    }

    /// Descriptor that becomes readable when the loop has work to do.
    pub fn backend_fd(&self) -> RawFd {
        self.reactor.backend_fd()
    }

    /// How long the next poll would block, in milliseconds. `-1` means
    /// indefinitely.
    pub fn backend_timeout(&self) -> i32 {
        self.reactor.backend_timeout()
    }

    /// Calls `f` with a snapshot of every handle attached to the loop,
    /// including handles that are closing.
    pub fn walk(&self, mut f: impl FnMut(&HandleInfo)) {
        for info in self.reactor.walk() {
            f(&info);
        }
    }

    pub(crate) fn reactor(&self) -> &Rc<Reactor> {
        &self.reactor
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }

        if let Err(err) = self.reactor.close() {
            log::error!("failed to close loop: {err}");
        }
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("owner", &self.owner)
            .field("closed", &self.reactor.is_closed())
            .field("alive", &self.reactor.alive())
            .finish()
    }
}
