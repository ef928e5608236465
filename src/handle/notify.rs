//! Cross-thread wake-ups.

use crate::error::Result;
use crate::handle::{Handle, handle_kind};
use crate::reactor::event::WakePipe;
use crate::reactor::handle::{AsyncState, HandleData, callback};
use crate::runtime::Loop;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

handle_kind!(
    /// Kind marker of [`Async`].
    AsyncKind => Async
);

/// Runs a callback on the loop thread when woken from any thread.
///
/// The handle is active from construction and keeps the loop alive until it
/// is closed or unreferenced. Several sends before the loop gets around to
/// the handle are coalesced into one callback.
///
/// # Example
/// ```no_run
/// use runa_io::{Async, Loop, RunMode};
///
/// let event_loop = Loop::new()?;
/// let notify = std::rc::Rc::new(std::cell::RefCell::new(None::<Async>));
/// let slot = notify.clone();
/// *notify.borrow_mut() = Some(Async::new(&event_loop, move || {
///     if let Some(handle) = slot.borrow().as_ref() {
///         handle.close();
///     }
/// })?);
///
/// let sender = notify.borrow().as_ref().map(Async::sender).unwrap();
/// std::thread::spawn(move || sender.send());
/// event_loop.run(RunMode::Default)?;
/// # Ok::<(), runa_io::Error>(())
/// ```
pub type Async = Handle<AsyncKind>;

impl Handle<AsyncKind> {
    pub fn new(event_loop: &Loop, cb: impl FnMut() + 'static) -> Result<Self> {
        Self::init(
            event_loop,
            HandleData::Async(AsyncState {
                cb: callback(cb),
                pending: Arc::new(AtomicBool::new(false)),
                closed: Arc::new(AtomicBool::new(false)),
            }),
        )
    }

    /// Wakes the loop from its own thread.
    pub fn send(&self) {
        self.sender().send();
    }

    /// A `Send + Sync` way to wake this handle from other threads.
    pub fn sender(&self) -> AsyncSender {
        let (pending, closed) = self
            .reactor()
            .async_flags(self.key())
            .unwrap_or_else(|| {
                (
                    Arc::new(AtomicBool::new(false)),
                    Arc::new(AtomicBool::new(true)),
                )
            });

        AsyncSender {
            pending,
            closed,
            wake: self.reactor().wake_pipe(),
        }
    }
}

/// Thread-safe sending side of an [`Async`] handle.
#[derive(Clone)]
pub struct AsyncSender {
    pending: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    wake: Arc<WakePipe>,
}

impl AsyncSender {
    /// Schedules the handle's callback. Ignored once the handle is closing.
    pub fn send(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        if !self.pending.swap(true, Ordering::AcqRel) {
            self.wake.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for AsyncSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSender")
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}
