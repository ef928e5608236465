//! OS threads with an explicit create / join / detach lifecycle.

use crate::error::{EBUSY, EINVAL, Error, Result};

use std::thread::{self, JoinHandle};

/// Options for [`Thread::create_with`].
#[derive(Debug, Clone, Default)]
pub struct ThreadOptions {
    pub name: Option<String>,
    pub stack_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Joined,
    Detached,
}

/// An OS thread that is created once and then either joined or detached.
///
/// A thread dropped while still attached is detached with a warning.
#[derive(Debug)]
pub struct Thread {
    handle: Option<JoinHandle<()>>,
    state: State,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Thread {
    pub fn new() -> Self {
        Self {
            handle: None,
            state: State::Idle,
        }
    }

    /// Starts the thread running `cb`. Fails with `EBUSY` if this thread was
    /// already created.
    pub fn create(&mut self, cb: impl FnOnce() + Send + 'static) -> Result<()> {
        self.create_with(ThreadOptions::default(), cb)
    }

    pub fn create_with(
        &mut self,
        options: ThreadOptions,
        cb: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        if self.state != State::Idle {
            return Err(Error::from_status(EBUSY));
        }

        let mut builder = thread::Builder::new();
        if let Some(name) = options.name {
            builder = builder.name(name);
        }
        if let Some(size) = options.stack_size {
            builder = builder.stack_size(size);
        }

        self.handle = Some(builder.spawn(cb)?);
        self.state = State::Running;
        Ok(())
    }

    /// Waits for the thread to finish.
    ///
    /// Fails with `EINVAL` if the thread is not attached, and with
    /// [`Error::ThreadPanicked`] if it ended by panicking.
    pub fn join(&mut self) -> Result<()> {
        let handle = self.take_attached()?;
        self.state = State::Joined;

        handle.join().map_err(|_| Error::ThreadPanicked)
    }

    /// Lets the thread run on its own. Fails with `EINVAL` if it is not
    /// attached.
    pub fn detach(&mut self) -> Result<()> {
        self.take_attached()?;
        self.state = State::Detached;
        Ok(())
    }

    /// Whether the thread was created and has not been joined or detached.
    pub fn is_attached(&self) -> bool {
        self.state == State::Running
    }

    /// Whether the attached thread is still executing its callback.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn take_attached(&mut self) -> Result<JoinHandle<()>> {
        match (self.state, self.handle.take()) {
            (State::Running, Some(handle)) => Ok(handle),
            _ => Err(Error::from_status(EINVAL)),
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            log::warn!("thread dropped without join or detach; detaching");
        }
    }
}
