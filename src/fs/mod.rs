//! Filesystem requests.
//!
//! Every request is submitted on the loop thread, runs its blocking syscalls
//! on the loop's thread pool, and delivers its result to a callback on the
//! loop thread during a later iteration. Results follow the status-code
//! convention: non-negative on success, a negative errno on failure.
//!
//! - [`FsStat`]: `stat`, `lstat`, `fstat` and `statfs`
//! - [`FsRead`]: whole-file streaming reads and single reads
//! - [`FsWrite`]: whole-file writes, appends and single writes
//! - [`FsOp`]: one-shot operations that consume their request
//! - [`FsDir`]: directory creation, removal and listing
//!
//! A request object runs one operation at a time; submitting while one is
//! pending fails with `EBUSY`. Submissions fail synchronously, without a
//! callback, for paths containing a NUL byte and on a closed loop.
//!
//! # Example
//! ```no_run
//! use runa_io::fs::FsStat;
//! use runa_io::{Loop, RunMode};
//!
//! let event_loop = Loop::new()?;
//! let request = FsStat::new(&event_loop);
//! request.stat("/etc/hosts", |result, stat| {
//!     if let Some(stat) = stat {
//!         println!("{} bytes", stat.size);
//!     } else {
//!         println!("stat failed: {}", runa_io::error::err_name(result as i32));
//!     }
//! })?;
//!
//! event_loop.run(RunMode::Default)?;
//! # Ok::<(), runa_io::Error>(())
//! ```

mod dir;
mod op;
mod read;
mod stat;
mod sys;
mod write;

pub use dir::{DirEntry, DirHandle, DirentType, FsDir};
pub use op::{COPYFILE_EXCL, FsCompletion, FsKind, FsOp};
pub use read::FsRead;
pub use stat::{FsStat, Stat, StatFs, Timespec};
pub use write::FsWrite;

use crate::error::{EBUSY, Error, Result};
use crate::reactor::core::Reactor;
use crate::runtime::Loop;

use std::cell::Cell;
use std::rc::Rc;

/// Marks a request as in flight until dropped.
pub(crate) struct Busy(Rc<Cell<bool>>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// State shared by all request types: the loop and the in-flight flag.
pub(crate) struct FsRequest {
    reactor: Rc<Reactor>,
    busy: Rc<Cell<bool>>,
}

impl FsRequest {
    pub(crate) fn new(event_loop: &Loop) -> Self {
        Self {
            reactor: event_loop.reactor().clone(),
            busy: Rc::new(Cell::new(false)),
        }
    }

    pub(crate) fn reactor(&self) -> &Rc<Reactor> {
        &self.reactor
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.get()
    }

    pub(crate) fn acquire(&self) -> Result<Busy> {
        self.reactor.ensure_open()?;
        if self.busy.replace(true) {
            return Err(Error::from_status(EBUSY));
        }
        Ok(Busy(self.busy.clone()))
    }

    /// Runs `work` on the pool and `after` with its output. The request is
    /// free again by the time `after` runs.
    pub(crate) fn submit<T, W, A>(&self, work: W, after: A) -> Result<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        A: FnOnce(std::result::Result<T, isize>) + 'static,
    {
        let busy = self.acquire()?;
        self.submit_as(busy, work, after)
    }

    pub(crate) fn submit_as<T, W, A>(&self, busy: Busy, work: W, after: A) -> Result<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        A: FnOnce(std::result::Result<T, isize>) + 'static,
    {
        self.reactor.submit(work, move |outcome| {
            drop(busy);
            after(outcome.map_err(|code| code as isize))
        })?;
        Ok(())
    }
}

/// Folds a job outcome into a single status.
pub(crate) fn status(outcome: std::result::Result<isize, isize>) -> isize {
    outcome.unwrap_or_else(|code| code)
}
