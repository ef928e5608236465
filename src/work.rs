//! Work offloaded to the loop's thread pool.

use crate::error::{EBUSY, EINVAL, Error, Result};
use crate::reactor::core::Reactor;
use crate::runtime::Loop;
use crate::utils::slab::Key;

use std::cell::Cell;
use std::rc::Rc;

/// A reusable work request.
///
/// [`queue`](Work::queue) runs a closure on the pool and then an after
/// callback on the loop thread with the outcome: `0`, `ECANCELED` if the
/// work was cancelled before it started, or `EIO` if it panicked. One
/// submission may be in flight at a time.
///
/// # Example
/// ```no_run
/// use runa_io::{Loop, RunMode, Work};
///
/// let event_loop = Loop::new()?;
/// let work = Work::new(&event_loop);
/// work.queue(|| { /* blocking job */ }, |status| assert_eq!(status, 0))?;
///
/// event_loop.run(RunMode::Default)?;
/// # Ok::<(), runa_io::Error>(())
/// ```
pub struct Work {
    reactor: Rc<Reactor>,
    current: Rc<Cell<Option<Key>>>,
}

impl Work {
    pub fn new(event_loop: &Loop) -> Self {
        Self {
            reactor: event_loop.reactor().clone(),
            current: Rc::new(Cell::new(None)),
        }
    }

    /// Queues `work` on the pool. `after` runs on the loop thread once the
    /// work finished or was cancelled.
    ///
    /// Fails with `EBUSY` while a previous submission is in flight, and with
    /// `EINVAL` if the loop is closed.
    pub fn queue<W, A>(&self, work: W, after: A) -> Result<()>
    where
        W: FnOnce() + Send + 'static,
        A: FnOnce(i32) + 'static,
    {
        if self.current.get().is_some() {
            return Err(Error::from_status(EBUSY));
        }

        let current = self.current.clone();
        let key = self.reactor.submit(work, move |outcome: std::result::Result<(), i32>| {
            current.set(None);
            after(outcome.err().unwrap_or(0));
        })?;

        self.current.set(Some(key));
        Ok(())
    }

    /// Cancels the queued work if no worker picked it up yet.
    ///
    /// Fails with `EBUSY` once the work is running and with `EINVAL` if
    /// nothing is queued.
    pub fn cancel(&self) -> Result<()> {
        let key = self
            .current
            .get()
            .ok_or_else(|| Error::from_status(EINVAL))?;
        self.reactor.cancel(key)
    }

    /// Whether a submission is waiting for its after callback.
    pub fn is_pending(&self) -> bool {
        self.current
            .get()
            .is_some_and(|key| self.reactor.is_pending(key))
    }
}
