//! Loop-attached handles.
//!
//! Every handle is a [`Handle<K>`] where `K` names its kind. The generic part
//! covers what all handles share: activity, referencing and closing. Each
//! kind adds its own operations in its module.
//!
//! A handle is registered with its loop on construction and unregistered by
//! the loop once its close completes. Dropping a handle that was not closed
//! closes it without a callback.

mod hooks;
mod notify;
mod signal;
mod timer;

pub use hooks::{Check, CheckKind, Idle, IdleKind, Prepare, PrepareKind};
pub use notify::{Async, AsyncKind, AsyncSender};
pub use signal::{Signal, SignalKind};
pub use timer::{Timer, TimerKind};

use crate::error::Result;
use crate::reactor::core::Reactor;
use crate::reactor::handle::{HandleData, HandleType};
use crate::runtime::{Loop, RawLoop};
use crate::utils::slab::Key;

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

mod sealed {
    pub trait Sealed {}
}

/// Marker for a handle kind. Implemented by the `*Kind` types of this crate
/// only.
pub trait HandleKind: sealed::Sealed + 'static {
    const TYPE: HandleType;
}

/// A handle of kind `K` attached to a loop.
pub struct Handle<K: HandleKind> {
    reactor: Rc<Reactor>,
    key: Key,
    _kind: PhantomData<K>,
}

impl<K: HandleKind> Handle<K> {
    pub(crate) fn init(event_loop: &Loop, data: HandleData) -> Result<Self> {
        let reactor = event_loop.reactor().clone();
        let key = reactor.register(K::TYPE, data)?;

        Ok(Self {
            reactor,
            key,
            _kind: PhantomData,
        })
    }

    pub(crate) fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub(crate) fn key(&self) -> Key {
        self.key
    }

    pub fn kind(&self) -> HandleType {
        K::TYPE
    }

    /// Whether the handle is started.
    pub fn is_active(&self) -> bool {
        self.reactor.is_active(self.key)
    }

    /// Whether the handle is closing or already closed.
    pub fn is_closing(&self) -> bool {
        self.reactor.is_closing(self.key)
    }

    /// Closes the handle. Later calls are ignored.
    pub fn close(&self) {
        self.reactor.close_handle(self.key, None);
    }

    /// Closes the handle and calls `cb` once the loop has released it.
    ///
    /// Only the first close of a handle registers its callback; closing a
    /// handle that is already closing does nothing.
    pub fn close_with(&self, cb: impl FnOnce() + 'static) {
        self.reactor.close_handle(self.key, Some(Box::new(cb)));
    }

    /// Lets the handle keep the loop alive while active (the default).
    pub fn ref_(&self) {
        self.reactor.set_ref(self.key, true);
    }

    /// Stops the handle from keeping the loop alive.
    pub fn unref(&self) {
        self.reactor.set_ref(self.key, false);
    }

    pub fn has_ref(&self) -> bool {
        self.reactor.has_ref(self.key)
    }

    /// The loop this handle is attached to.
    pub fn raw_loop(&self) -> RawLoop {
        RawLoop(self.reactor.clone())
    }
}

impl<K: HandleKind> Drop for Handle<K> {
    fn drop(&mut self) {
        if !self.reactor.is_closing(self.key) {
            self.reactor.close_handle(self.key, None);
        }
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &K::TYPE)
            .field("active", &self.is_active())
            .field("closing", &self.is_closing())
            .field("referenced", &self.has_ref())
            .finish()
    }
}

macro_rules! handle_kind {
    ($(#[$meta:meta])* $kind:ident => $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub enum $kind {}

        impl crate::handle::sealed::Sealed for $kind {}

        impl crate::handle::HandleKind for $kind {
            const TYPE: crate::reactor::handle::HandleType = crate::reactor::handle::HandleType::$ty;
        }
    };
}

pub(crate) use handle_kind;
